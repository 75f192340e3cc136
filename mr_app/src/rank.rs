//! Runs a single rank of a job; start one process per rank.
//!
//! `MR_RANK=<rank> mapreduce-rank <input_dir> <file_count> <map_workers> <reduce_workers> <output> <task>`
//!
//! Every process must get the same positional arguments. Peer addresses come
//! from `MR_PEERS`, or from `MR_HOST`/`MR_BASE_PORT`.

use anyhow::{Context, Result};
use clap::Parser;
use dotenvy::dotenv;
use mr::{
    config::{ClusterConfig, JobConfig},
    runtime::{run_rank, Job, RankOutcome},
    transport::TcpTransport,
};
use tracing::info;

mod init;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    dotenv().ok();
    init::tracing();
    let config = JobConfig::parse();

    let topology = config.topology()?;
    let cluster = ClusterConfig::from_env(topology.world_size())?;
    let transport = TcpTransport::bind(cluster.rank, cluster.peers)
        .await
        .with_context(|| format!("rank {} could not start listening", cluster.rank))?;

    let job = Job {
        topology,
        functions: config.functions(),
        file_count: config.file_count,
        output: config.output.clone(),
    };
    match run_rank(transport, &job, config.source()).await? {
        RankOutcome::Coordinator(report) => info!(
            output = %config.output.display(),
            dispatched = report.dispatched,
            results = report.results,
            "wrote results"
        ),
        RankOutcome::MapWorker(report) => {
            info!(units = report.units, records = report.records, "map worker done")
        }
        RankOutcome::ReduceWorker { results } => info!(results, "reduce worker done"),
    }
    Ok(())
}
