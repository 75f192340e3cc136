//! Job and cluster configuration.
//!
//! [`JobConfig`] is the command line shared by both binaries: six positional
//! arguments and nothing else. [`ClusterConfig`] is only needed when each rank
//! runs in its own process, and comes from the environment the launcher sets
//! up for every process.

use std::path::PathBuf;

use clap::Parser;

use crate::error::{Error, Result};
use crate::source::DirectorySource;
use crate::task::{JobFunctions, TaskKind};
use crate::topology::Topology;
use crate::transport::Rank;

pub const RANK_VAR: &str = "MR_RANK";
pub const PEERS_VAR: &str = "MR_PEERS";
pub const HOST_VAR: &str = "MR_HOST";
pub const BASE_PORT_VAR: &str = "MR_BASE_PORT";

const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_BASE_PORT: u16 = 50051;

#[derive(Parser, Debug, Clone, PartialEq, Eq)]
#[command(version, about = "Map-reduce over explicit message passing")]
pub struct JobConfig {
    /// Directory holding the inputs `0.txt`, `1.txt`, ...
    pub input_dir: PathBuf,
    /// Number of input files to process.
    pub file_count: usize,
    /// Number of map worker ranks.
    pub map_workers: usize,
    /// Number of reduce worker ranks.
    pub reduce_workers: usize,
    /// Where the `<key> <value>` lines are written.
    pub output: PathBuf,
    /// Which map/reduce pair to run: 1 word count, 2 word length,
    /// 3 first letter.
    pub task: TaskKind,
}

impl JobConfig {
    pub fn topology(&self) -> Result<Topology> {
        Topology::new(self.map_workers, self.reduce_workers)
    }

    pub fn source(&self) -> DirectorySource {
        DirectorySource::new(&self.input_dir)
    }

    pub fn functions(&self) -> JobFunctions {
        self.task.functions()
    }
}

/// Identity and peer addresses of one rank in a multi-process run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterConfig {
    pub rank: Rank,
    /// One address per rank, indexed by rank.
    pub peers: Vec<String>,
}

impl ClusterConfig {
    pub fn from_env(world_size: usize) -> Result<Self> {
        Self::from_lookup(world_size, |name| std::env::var(name).ok())
    }

    /// `MR_RANK` is required. Peers come from `MR_PEERS` when set, otherwise
    /// rank `r` is at `MR_HOST:(MR_BASE_PORT + r)`.
    pub fn from_lookup<F>(world_size: usize, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let rank = lookup(RANK_VAR)
            .ok_or_else(|| Error::Config(format!("{RANK_VAR} is not set")))?;
        let rank: u32 = rank
            .trim()
            .parse()
            .map_err(|_| Error::Config(format!("{RANK_VAR}={rank:?} is not a rank")))?;
        if rank as usize >= world_size {
            return Err(Error::Config(format!(
                "{RANK_VAR}={rank} is outside a world of {world_size}"
            )));
        }

        let peers = match lookup(PEERS_VAR) {
            Some(list) => {
                let peers: Vec<String> = list
                    .split(',')
                    .map(|addr| addr.trim().to_string())
                    .filter(|addr| !addr.is_empty())
                    .collect();
                if peers.len() != world_size {
                    return Err(Error::Config(format!(
                        "{PEERS_VAR} lists {} addresses for a world of {world_size}",
                        peers.len()
                    )));
                }
                peers
            }
            None => {
                let host = lookup(HOST_VAR).unwrap_or_else(|| DEFAULT_HOST.to_string());
                let base_port = match lookup(BASE_PORT_VAR) {
                    Some(port) => port.trim().parse::<u16>().map_err(|_| {
                        Error::Config(format!("{BASE_PORT_VAR}={port:?} is not a port"))
                    })?,
                    None => DEFAULT_BASE_PORT,
                };
                (0..world_size)
                    .map(|r| {
                        u16::try_from(r)
                            .ok()
                            .and_then(|r| base_port.checked_add(r))
                            .map(|port| format!("{host}:{port}"))
                            .ok_or_else(|| {
                                Error::Config(format!("no port left for rank {r} above {base_port}"))
                            })
                    })
                    .collect::<Result<_>>()?
            }
        };

        Ok(ClusterConfig {
            rank: Rank(rank),
            peers,
        })
    }
}
