//! Map-reduce over explicit, tagged point-to-point messages.
//!
//! A job runs on a fixed set of ranks: one [`coordinator`], a pool of
//! [`map_worker`]s and a pool of [`reduce_worker`]s. The coordinator hands out
//! input files one at a time, map workers route every record to the reduce
//! worker that owns its key (see [`partition`]), and reduce workers send their
//! results back once the coordinator has shut the map side down. All of it
//! goes through a [`transport::Transport`].

pub mod config;
pub mod coordinator;
pub mod error;
pub mod map_worker;
pub mod partition;
pub mod record;
pub mod reduce_worker;
pub mod runtime;
pub mod source;
pub mod task;
pub mod topology;
pub mod transport;

pub use error::{Error, Result, TransportError};
