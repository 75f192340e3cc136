//! The fixed layout of ranks in a job.
//!
//! Rank 0 is the coordinator, ranks `1..=M` are map workers and ranks
//! `M+1..=M+R` are reduce workers. A rank's [`Role`] is worked out once at
//! startup and passed around from then on.

use std::fmt;

use crate::error::{Error, Result};
use crate::transport::Rank;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Topology {
    map_workers: usize,
    reduce_workers: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Coordinator,
    MapWorker(usize),
    ReduceWorker(usize),
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Coordinator => write!(f, "coordinator"),
            Role::MapWorker(id) => write!(f, "map worker {id}"),
            Role::ReduceWorker(id) => write!(f, "reduce worker {id}"),
        }
    }
}

impl Topology {
    pub fn new(map_workers: usize, reduce_workers: usize) -> Result<Self> {
        if map_workers == 0 {
            return Err(Error::Topology("at least one map worker is required".into()));
        }
        if reduce_workers == 0 {
            return Err(Error::Topology(
                "at least one reduce worker is required".into(),
            ));
        }
        if u32::try_from(1 + map_workers + reduce_workers).is_err() {
            return Err(Error::Topology("too many workers".into()));
        }
        Ok(Topology {
            map_workers,
            reduce_workers,
        })
    }

    pub fn map_workers(&self) -> usize {
        self.map_workers
    }

    pub fn reduce_workers(&self) -> usize {
        self.reduce_workers
    }

    pub fn world_size(&self) -> usize {
        1 + self.map_workers + self.reduce_workers
    }

    pub fn role_of(&self, rank: Rank) -> Result<Role> {
        let r = rank.index();
        if r == 0 {
            Ok(Role::Coordinator)
        } else if r <= self.map_workers {
            Ok(Role::MapWorker(r - 1))
        } else if r < self.world_size() {
            Ok(Role::ReduceWorker(r - 1 - self.map_workers))
        } else {
            Err(Error::Topology(format!(
                "rank {rank} is outside a world of {}",
                self.world_size()
            )))
        }
    }

    pub fn rank_of(&self, role: Role) -> Rank {
        let index = match role {
            Role::Coordinator => 0,
            Role::MapWorker(id) => 1 + id,
            Role::ReduceWorker(id) => 1 + self.map_workers + id,
        };
        Rank(index as u32)
    }

    /// Rank of the reduce worker owning partition `index`.
    pub fn reduce_rank(&self, index: usize) -> Rank {
        self.rank_of(Role::ReduceWorker(index))
    }

    pub fn map_worker_ranks(&self) -> impl Iterator<Item = Rank> + '_ {
        (0..self.map_workers).map(|id| self.rank_of(Role::MapWorker(id)))
    }

    pub fn reduce_worker_ranks(&self) -> impl Iterator<Item = Rank> + '_ {
        (0..self.reduce_workers).map(|id| self.rank_of(Role::ReduceWorker(id)))
    }

    pub fn roles(&self) -> impl Iterator<Item = (Rank, Role)> + '_ {
        (0..self.world_size()).filter_map(|r| {
            let rank = Rank(r as u32);
            self.role_of(rank).ok().map(|role| (rank, role))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topology_rejects_empty_pools() {
        assert!(Topology::new(0, 2).is_err());
        assert!(Topology::new(2, 0).is_err());
    }

    #[test]
    fn test_topology_roles() {
        let topology = Topology::new(2, 3).unwrap();
        assert_eq!(topology.world_size(), 6);
        assert_eq!(topology.role_of(Rank(0)).unwrap(), Role::Coordinator);
        assert_eq!(topology.role_of(Rank(1)).unwrap(), Role::MapWorker(0));
        assert_eq!(topology.role_of(Rank(2)).unwrap(), Role::MapWorker(1));
        assert_eq!(topology.role_of(Rank(3)).unwrap(), Role::ReduceWorker(0));
        assert_eq!(topology.role_of(Rank(5)).unwrap(), Role::ReduceWorker(2));
        assert!(topology.role_of(Rank(6)).is_err());
    }

    #[test]
    fn test_topology_rank_round_trip() {
        let topology = Topology::new(3, 2).unwrap();
        for (rank, role) in topology.roles() {
            assert_eq!(topology.rank_of(role), rank);
        }
        assert_eq!(
            topology.map_worker_ranks().collect::<Vec<_>>(),
            vec![Rank(1), Rank(2), Rank(3)]
        );
        assert_eq!(
            topology.reduce_worker_ranks().collect::<Vec<_>>(),
            vec![Rank(4), Rank(5)]
        );
        assert_eq!(topology.reduce_rank(1), Rank(5));
    }
}
