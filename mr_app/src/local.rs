//! Runs every rank of a job inside this process.
//!
//! `mapreduce <input_dir> <file_count> <map_workers> <reduce_workers> <output> <task>`

use anyhow::Result;
use clap::Parser;
use dotenvy::dotenv;
use mr::{
    config::JobConfig,
    runtime::{run_local, Job},
};
use tracing::info;

mod init;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    init::tracing();
    let config = JobConfig::parse();

    let job = Job {
        topology: config.topology()?,
        functions: config.functions(),
        file_count: config.file_count,
        output: config.output.clone(),
    };
    let report = run_local(job, config.source()).await?;

    info!(
        output = %config.output.display(),
        results = report.results,
        "wrote results"
    );
    Ok(())
}
