//! Running ranks.
//!
//! [`run_rank`] executes whatever role a transport's rank has in the topology.
//! [`run_local`] runs a whole job inside one process, one tokio task per rank,
//! and tears everything down as soon as one rank fails.

use std::{
    ffi::OsString,
    io,
    panic::AssertUnwindSafe,
    path::{Path, PathBuf},
    sync::Arc,
};

use futures::FutureExt;
use tokio::{fs::File, task::JoinSet};
use tracing::{error, info};

use crate::coordinator::{Coordinator, JobReport};
use crate::error::{Error, Result};
use crate::map_worker::{MapWorker, MapWorkerReport};
use crate::reduce_worker::ReduceWorker;
use crate::source::WorkUnitSource;
use crate::task::JobFunctions;
use crate::topology::{Role, Topology};
use crate::transport::{LocalTransport, Transport};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RankOutcome {
    Coordinator(JobReport),
    MapWorker(MapWorkerReport),
    ReduceWorker { results: usize },
}

/// Everything a rank needs besides its transport.
#[derive(Debug, Clone)]
pub struct Job {
    pub topology: Topology,
    pub functions: JobFunctions,
    pub file_count: usize,
    pub output: PathBuf,
}

/// The file the coordinator writes into before the run has succeeded.
pub fn staging_path(output: &Path) -> PathBuf {
    let mut name = output
        .file_name()
        .map(OsString::from)
        .unwrap_or_default();
    name.push(".partial");
    output.with_file_name(name)
}

/// Removes whatever an earlier run left at `output`, so a failed run never
/// leaves old results behind under the final name.
pub async fn clear_output(output: &Path) -> Result<()> {
    match tokio::fs::remove_file(output).await {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(Error::Output(e)),
        _ => Ok(()),
    }
}

pub async fn run_rank<T, S>(transport: T, job: &Job, source: S) -> Result<RankOutcome>
where
    T: Transport,
    S: WorkUnitSource,
{
    let rank = transport.rank();
    let role = job.topology.role_of(rank)?;
    info!(%rank, %role, "starting");

    match role {
        Role::Coordinator => {
            let coordinator = Coordinator::new(transport, job.topology, source, job.file_count);
            run_coordinator(coordinator, &job.output)
                .await
                .map(RankOutcome::Coordinator)
        }
        Role::MapWorker(id) => MapWorker::new(id, transport, job.topology, job.functions.clone())
            .run()
            .await
            .map(RankOutcome::MapWorker),
        Role::ReduceWorker(id) => ReduceWorker::new(id, transport, job.functions.clone())
            .run()
            .await
            .map(|results| RankOutcome::ReduceWorker { results }),
    }
}

/// The output only appears under its final name once every reduce worker has
/// been drained.
async fn run_coordinator<T, S>(coordinator: Coordinator<T, S>, output: &Path) -> Result<JobReport>
where
    T: Transport,
    S: WorkUnitSource,
{
    clear_output(output).await?;
    let staging = staging_path(output);
    let file = File::create(&staging).await.map_err(Error::Output)?;

    match coordinator.run(file).await {
        Ok(report) => {
            tokio::fs::rename(&staging, output)
                .await
                .map_err(Error::Output)?;
            Ok(report)
        }
        Err(e) => {
            let _ = tokio::fs::remove_file(&staging).await;
            Err(e)
        }
    }
}

/// Runs every rank of the job in this process over [`LocalTransport`].
pub async fn run_local<S>(job: Job, source: S) -> Result<JobReport>
where
    S: WorkUnitSource + 'static,
{
    clear_output(&job.output).await?;
    let job = Arc::new(job);
    let source = Arc::new(source);
    let mut tasks = JoinSet::new();

    for transport in LocalTransport::cluster(job.topology.world_size()) {
        let rank = transport.rank();
        let job = Arc::clone(&job);
        let source = Arc::clone(&source);
        tasks.spawn(async move {
            let outcome = AssertUnwindSafe(run_rank(transport, &job, source))
                .catch_unwind()
                .await
                .unwrap_or_else(|_| Err(Error::Aborted(format!("rank {rank} panicked"))));
            (rank, outcome)
        });
    }

    let mut report = None;
    while let Some(joined) = tasks.join_next().await {
        let failure = match joined {
            Ok((_, Ok(RankOutcome::Coordinator(done)))) => {
                report = Some(done);
                continue;
            }
            Ok((_, Ok(_))) => continue,
            Ok((rank, Err(e))) => {
                error!(%rank, "rank failed: {e}");
                e
            }
            Err(e) => Error::Aborted(format!("a rank task died: {e}")),
        };

        tasks.abort_all();
        while tasks.join_next().await.is_some() {}
        let _ = tokio::fs::remove_file(staging_path(&job.output)).await;
        return Err(failure);
    }

    report.ok_or_else(|| Error::Aborted("coordinator produced no report".into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_staging_path() {
        assert_eq!(
            staging_path(Path::new("/tmp/out.txt")),
            PathBuf::from("/tmp/out.txt.partial")
        );
        assert_eq!(staging_path(Path::new("out")), PathBuf::from("out.partial"));
    }

    #[tokio::test]
    async fn test_clear_output() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("out.txt");

        clear_output(&output).await.unwrap();
        std::fs::write(&output, "old 1\n").unwrap();
        clear_output(&output).await.unwrap();
        assert!(!output.exists());
    }
}
