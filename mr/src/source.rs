use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use async_trait::async_trait;

use crate::error::{Error, Result};
use crate::record::WorkUnit;

/// Largest input file a map worker will be sent.
pub const MAX_WORK_UNIT_BYTES: u64 = 20 * 1024 * 1024;

/// Resolves a work-unit index to its bytes. The coordinator calls this once
/// per dispatched unit.
#[async_trait]
pub trait WorkUnitSource: Send + Sync {
    async fn load(&self, index: usize) -> Result<WorkUnit>;
}

#[async_trait]
impl<S> WorkUnitSource for Arc<S>
where
    S: WorkUnitSource + ?Sized,
{
    async fn load(&self, index: usize) -> Result<WorkUnit> {
        (**self).load(index).await
    }
}

/// Reads unit `i` from `<dir>/<i>.txt`.
#[derive(Debug, Clone)]
pub struct DirectorySource {
    dir: PathBuf,
}

impl DirectorySource {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        DirectorySource { dir: dir.into() }
    }

    pub fn path_of(&self, index: usize) -> PathBuf {
        self.dir.join(format!("{index}.txt"))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[async_trait]
impl WorkUnitSource for DirectorySource {
    async fn load(&self, index: usize) -> Result<WorkUnit> {
        let path = self.path_of(index);
        let read_error = |source| Error::WorkUnitRead {
            path: path.clone(),
            source,
        };

        let size = tokio::fs::metadata(&path).await.map_err(read_error)?.len();
        if size > MAX_WORK_UNIT_BYTES {
            return Err(Error::WorkUnitTooLarge {
                path,
                size,
                limit: MAX_WORK_UNIT_BYTES,
            });
        }
        let bytes = tokio::fs::read(&path).await.map_err(read_error)?;
        Ok(WorkUnit::new(bytes))
    }
}

/// Work units held in memory, indexed by position.
#[derive(Debug, Clone, Default)]
pub struct InMemorySource {
    units: Vec<WorkUnit>,
}

impl InMemorySource {
    pub fn new(units: Vec<WorkUnit>) -> Self {
        InMemorySource { units }
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }
}

impl<S: AsRef<str>> FromIterator<S> for InMemorySource {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        InMemorySource::new(
            iter.into_iter()
                .map(|text| WorkUnit::from(text.as_ref()))
                .collect(),
        )
    }
}

#[async_trait]
impl WorkUnitSource for InMemorySource {
    async fn load(&self, index: usize) -> Result<WorkUnit> {
        self.units
            .get(index)
            .cloned()
            .ok_or(Error::WorkUnitMissing {
                index,
                len: self.units.len(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_directory_source_reads_indexed_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("0.txt"), "zero").unwrap();
        std::fs::write(dir.path().join("1.txt"), "one one").unwrap();

        let source = DirectorySource::new(dir.path());
        assert_eq!(source.load(0).await.unwrap(), WorkUnit::from("zero"));
        assert_eq!(source.load(1).await.unwrap(), WorkUnit::from("one one"));
    }

    #[tokio::test]
    async fn test_directory_source_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let source = DirectorySource::new(dir.path());
        match source.load(3).await {
            Err(Error::WorkUnitRead { path, .. }) => assert!(path.ends_with("3.txt")),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_directory_source_rejects_oversized_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = std::fs::File::create(dir.path().join("0.txt")).unwrap();
        file.set_len(MAX_WORK_UNIT_BYTES + 1).unwrap();
        std::fs::write(dir.path().join("1.txt"), vec![b'a'; 64]).unwrap();

        let source = DirectorySource::new(dir.path());
        match source.load(0).await {
            Err(Error::WorkUnitTooLarge { path, size, limit }) => {
                assert!(path.ends_with("0.txt"));
                assert_eq!(size, MAX_WORK_UNIT_BYTES + 1);
                assert_eq!(limit, MAX_WORK_UNIT_BYTES);
            }
            other => panic!("unexpected: {other:?}"),
        }
        assert_eq!(source.load(1).await.unwrap().len(), 64);
    }

    #[tokio::test]
    async fn test_in_memory_source() {
        let source: InMemorySource = ["a", "b"].into_iter().collect();
        assert_eq!(source.len(), 2);
        assert_eq!(source.load(1).await.unwrap(), WorkUnit::from("b"));
        assert!(matches!(
            source.load(2).await,
            Err(Error::WorkUnitMissing { index: 2, len: 2 })
        ));
    }
}
