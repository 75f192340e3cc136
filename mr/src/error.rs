use std::path::PathBuf;

use thiserror::Error;

use crate::transport::Rank;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Every failure in this crate is fatal to the rank that observes it. Nothing
/// is retried.
#[derive(Error, Debug)]
pub enum Error {
    #[error("failed to read work unit {}: {source}", .path.display())]
    WorkUnitRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("work unit {} is {size} bytes, over the {limit} byte limit", .path.display())]
    WorkUnitTooLarge {
        path: PathBuf,
        size: u64,
        limit: u64,
    },

    #[error("work unit {index} is out of range for a source of {len}")]
    WorkUnitMissing { index: usize, len: usize },

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("protocol violation: {0}")]
    Protocol(String),

    #[error("invalid topology: {0}")]
    Topology(String),

    #[error("map function failed: {0:#}")]
    MapFunction(anyhow::Error),

    #[error("failed to write output: {0}")]
    Output(#[source] std::io::Error),

    #[error("invalid cluster configuration: {0}")]
    Config(String),

    #[error("job aborted: {0}")]
    Aborted(String),
}

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("inbox of rank {0} is closed")]
    Closed(Rank),

    #[error("no route to rank {0}")]
    UnknownRank(Rank),

    #[error("could not connect to rank {rank} at {addr}: {source}")]
    Connect {
        rank: Rank,
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("link i/o failed: {0}")]
    Io(#[from] std::io::Error),
}
