//! The pluggable map and reduce functions of a job.
//!
//! Workers never look the functions up themselves: a [`JobFunctions`] value is
//! resolved once at startup, usually from a [`TaskKind`], and handed to each
//! worker.

use std::{fmt, str::FromStr, sync::Arc};

use anyhow::Context;

use crate::record::{Key, KeyValue, MapTaskOutput, WorkUnit};

pub type MapFn = Arc<dyn Fn(&WorkUnit) -> anyhow::Result<MapTaskOutput> + Send + Sync>;
pub type ReduceFn = Arc<dyn Fn(&Key, &[i32]) -> KeyValue + Send + Sync>;

#[derive(Clone)]
pub struct JobFunctions {
    map: MapFn,
    reduce: ReduceFn,
}

impl JobFunctions {
    pub fn new<M, R>(map: M, reduce: R) -> Self
    where
        M: Fn(&WorkUnit) -> anyhow::Result<MapTaskOutput> + Send + Sync + 'static,
        R: Fn(&Key, &[i32]) -> KeyValue + Send + Sync + 'static,
    {
        JobFunctions {
            map: Arc::new(map),
            reduce: Arc::new(reduce),
        }
    }

    pub fn map(&self, unit: &WorkUnit) -> anyhow::Result<MapTaskOutput> {
        (self.map)(unit)
    }

    pub fn reduce(&self, key: &Key, values: &[i32]) -> KeyValue {
        (self.reduce)(key, values)
    }
}

impl fmt::Debug for JobFunctions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobFunctions").finish_non_exhaustive()
    }
}

/// The built-in jobs, selected by their integer identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    /// `(word, 1)` per word.
    WordCount = 1,
    /// `(length of word, 1)` per word.
    WordLength = 2,
    /// `(first character of word, 1)` per word.
    FirstLetter = 3,
}

impl TaskKind {
    pub fn functions(self) -> JobFunctions {
        match self {
            TaskKind::WordCount => JobFunctions::new(word_count, sum),
            TaskKind::WordLength => JobFunctions::new(word_length, sum),
            TaskKind::FirstLetter => JobFunctions::new(first_letter, sum),
        }
    }
}

impl TryFrom<u32> for TaskKind {
    type Error = String;

    fn try_from(id: u32) -> Result<Self, Self::Error> {
        match id {
            1 => Ok(TaskKind::WordCount),
            2 => Ok(TaskKind::WordLength),
            3 => Ok(TaskKind::FirstLetter),
            other => Err(format!("unknown task {other}, expected 1, 2 or 3")),
        }
    }
}

impl FromStr for TaskKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let id: u32 = s
            .trim()
            .parse()
            .map_err(|_| format!("task must be an integer, got {s:?}"))?;
        TaskKind::try_from(id)
    }
}

fn words(unit: &WorkUnit) -> anyhow::Result<std::str::SplitWhitespace<'_>> {
    let text = std::str::from_utf8(unit.as_bytes()).context("work unit is not valid UTF-8")?;
    Ok(text.split_whitespace())
}

pub fn word_count(unit: &WorkUnit) -> anyhow::Result<MapTaskOutput> {
    Ok(words(unit)?.map(|word| KeyValue::new(word, 1)).collect())
}

pub fn word_length(unit: &WorkUnit) -> anyhow::Result<MapTaskOutput> {
    Ok(words(unit)?
        .map(|word| KeyValue::new(word.chars().count().to_string().as_str(), 1))
        .collect())
}

pub fn first_letter(unit: &WorkUnit) -> anyhow::Result<MapTaskOutput> {
    Ok(words(unit)?
        .filter_map(|word| word.chars().next())
        .map(|c| KeyValue::new(c.to_string().as_str(), 1))
        .collect())
}

/// Adds up the values, clamping at the `i32` bounds rather than wrapping.
pub fn sum(key: &Key, values: &[i32]) -> KeyValue {
    let total = values.iter().fold(0i32, |acc, v| acc.saturating_add(*v));
    KeyValue::new(key.clone(), total)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pairs(output: MapTaskOutput) -> Vec<(String, i32)> {
        output
            .into_iter()
            .map(|kv| (kv.key().to_string(), kv.value()))
            .collect()
    }

    #[test]
    fn test_task_kind_parse() {
        assert_eq!("1".parse::<TaskKind>().unwrap(), TaskKind::WordCount);
        assert_eq!("2".parse::<TaskKind>().unwrap(), TaskKind::WordLength);
        assert_eq!("3".parse::<TaskKind>().unwrap(), TaskKind::FirstLetter);
        assert!("0".parse::<TaskKind>().is_err());
        assert!("4".parse::<TaskKind>().is_err());
        assert!("wc".parse::<TaskKind>().is_err());
    }

    #[test]
    fn test_word_count() {
        let out = word_count(&WorkUnit::from("a b\n a")).unwrap();
        assert_eq!(
            pairs(out),
            vec![("a".into(), 1), ("b".into(), 1), ("a".into(), 1)]
        );
    }

    #[test]
    fn test_word_length_and_first_letter() {
        let unit = WorkUnit::from("hello to you");
        assert_eq!(
            pairs(word_length(&unit).unwrap()),
            vec![("5".into(), 1), ("2".into(), 1), ("3".into(), 1)]
        );
        assert_eq!(
            pairs(first_letter(&unit).unwrap()),
            vec![("h".into(), 1), ("t".into(), 1), ("y".into(), 1)]
        );
    }

    #[test]
    fn test_map_rejects_invalid_utf8() {
        assert!(word_count(&WorkUnit::new(vec![0xff, 0xfe])).is_err());
    }

    #[test]
    fn test_sum() {
        let kv = sum(&Key::new("a"), &[1, 2, 3]);
        assert_eq!(kv, KeyValue::new("a", 6));
        assert_eq!(sum(&Key::new("e"), &[]).value(), 0);
    }

    #[test]
    fn test_sum_saturates() {
        let key = Key::new("big");
        assert_eq!(sum(&key, &[i32::MAX, 1, 1]).value(), i32::MAX);
        assert_eq!(sum(&key, &[i32::MIN, -1]).value(), i32::MIN);
        assert_eq!(sum(&key, &[i32::MAX, 1, -1]).value(), i32::MAX - 1);
    }

    #[test]
    fn test_functions_dispatch() {
        let functions = TaskKind::WordCount.functions();
        let out = functions.map(&WorkUnit::from("x x")).unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(functions.reduce(&Key::new("x"), &[1, 1]).value(), 2);
    }
}
