use futures::future::try_join_all;
use tokio::io::{AsyncWrite, AsyncWriteExt, BufWriter};
use tracing::{debug, info, instrument};

use crate::error::{Error, Result};
use crate::record::WorkUnit;
use crate::source::WorkUnitSource;
use crate::topology::{Role, Topology};
use crate::transport::{Filter, Payload, Rank, Tag, TagFilter, Transport};

/// Where the coordinator is in the job. Phases only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Phase {
    DispatchingMap,
    AwaitingMapDone,
    TerminatingMap,
    TerminatingReduce,
    Collecting,
    Done,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JobReport {
    /// Work units sent to map workers.
    pub dispatched: usize,
    /// Completion notices received from map workers.
    pub completed: usize,
    /// Result records written to the output.
    pub results: usize,
}

/// Rank 0. Hands out work units on demand, tears the workers down in two
/// rounds and writes whatever the reduce workers send back.
pub struct Coordinator<T, S> {
    transport: T,
    topology: Topology,
    source: S,
    file_count: usize,
    phase: Phase,
    // Units not yet dispatched.
    remaining: usize,
    // Whether each map worker currently holds a unit.
    outstanding: Vec<bool>,
    report: JobReport,
}

impl<T, S> Coordinator<T, S>
where
    T: Transport,
    S: WorkUnitSource,
{
    pub fn new(transport: T, topology: Topology, source: S, file_count: usize) -> Self {
        Coordinator {
            transport,
            topology,
            source,
            file_count,
            phase: Phase::DispatchingMap,
            remaining: file_count,
            outstanding: vec![false; topology.map_workers()],
            report: JobReport::default(),
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn report(&self) -> JobReport {
        self.report
    }

    /// Drives the whole job and writes results to `out`.
    #[instrument(skip_all, fields(files = self.file_count))]
    pub async fn run<W>(mut self, out: W) -> Result<JobReport>
    where
        W: AsyncWrite + Unpin + Send,
    {
        self.dispatch().await?;
        self.terminate_map_workers().await?;
        self.terminate_reduce_workers().await?;
        self.collect_and_persist(out).await?;
        info!(
            dispatched = self.report.dispatched,
            completed = self.report.completed,
            results = self.report.results,
            "job finished"
        );
        Ok(self.report)
    }

    /// Keeps every map worker busy with one unit at a time until all
    /// `file_count` units have been reported done.
    pub async fn dispatch(&mut self) -> Result<()> {
        self.enter(Phase::DispatchingMap);

        let mut initial = Vec::new();
        for id in 0..self.topology.map_workers() {
            if self.remaining == 0 {
                break;
            }
            let unit = self.next_unit().await?;
            initial.push((self.topology.rank_of(Role::MapWorker(id)), unit));
            self.outstanding[id] = true;
        }
        self.report.dispatched += initial.len();
        try_join_all(
            initial
                .into_iter()
                .map(|(rank, unit)| self.transport.send_data(rank, Payload::WorkUnit(unit))),
        )
        .await?;

        self.enter(Phase::AwaitingMapDone);
        while self.report.completed < self.file_count {
            let envelope = self
                .transport
                .recv(Filter::any().with_tag(TagFilter::Data))
                .await?;
            let id = match (self.topology.role_of(envelope.source)?, &envelope.payload) {
                (Role::MapWorker(id), Payload::Signal) => id,
                (role, payload) => {
                    return Err(Error::Protocol(format!(
                        "expected a completion notice from a map worker, got {payload:?} from {role}"
                    )))
                }
            };
            if !self.outstanding[id] {
                return Err(Error::Protocol(format!(
                    "map worker {id} reported completion with no unit outstanding"
                )));
            }
            self.outstanding[id] = false;
            self.report.completed += 1;

            if self.remaining > 0 {
                let unit = self.next_unit().await?;
                self.transport
                    .send_data(envelope.source, Payload::WorkUnit(unit))
                    .await?;
                self.outstanding[id] = true;
                self.report.dispatched += 1;
            }
        }
        Ok(())
    }

    pub async fn terminate_map_workers(&mut self) -> Result<()> {
        self.enter(Phase::TerminatingMap);
        let ranks: Vec<Rank> = self.topology.map_worker_ranks().collect();
        self.terminate(&ranks).await
    }

    /// Only safe once every map worker is gone: after that no record can
    /// still be on its way to a reduce worker.
    pub async fn terminate_reduce_workers(&mut self) -> Result<()> {
        if self.phase < Phase::TerminatingMap {
            return Err(Error::Protocol(
                "reduce workers terminated before map workers".into(),
            ));
        }
        self.enter(Phase::TerminatingReduce);
        let ranks: Vec<Rank> = self.topology.reduce_worker_ranks().collect();
        self.terminate(&ranks).await
    }

    /// Writes `<key> <value>` lines in arrival order until every reduce
    /// worker has sent its sentinel.
    pub async fn collect_and_persist<W>(&mut self, out: W) -> Result<usize>
    where
        W: AsyncWrite + Unpin + Send,
    {
        self.enter(Phase::Collecting);
        let mut out = BufWriter::new(out);
        let mut finished = vec![false; self.topology.reduce_workers()];
        let mut open = finished.len();

        while open > 0 {
            let envelope = self.transport.recv(Filter::any()).await?;
            let id = match self.topology.role_of(envelope.source)? {
                Role::ReduceWorker(id) if !finished[id] => id,
                role => {
                    return Err(Error::Protocol(format!(
                        "unexpected message from {role} while collecting results"
                    )))
                }
            };

            match (envelope.tag, envelope.payload) {
                (Tag::Terminate, Payload::Signal) => {
                    finished[id] = true;
                    open -= 1;
                }
                (Tag::Sender(_), Payload::Record(kv)) => {
                    let line = format!("{} {}\n", kv.key(), kv.value());
                    out.write_all(line.as_bytes()).await.map_err(Error::Output)?;
                    self.report.results += 1;
                }
                (tag, payload) => {
                    return Err(Error::Protocol(format!(
                        "reduce worker {id} sent {payload:?} tagged {tag:?}"
                    )))
                }
            }
        }

        out.flush().await.map_err(Error::Output)?;
        self.enter(Phase::Done);
        Ok(self.report.results)
    }

    /// Sends the termination tag to every rank in `ranks`, then waits for
    /// each of them to echo it.
    async fn terminate(&mut self, ranks: &[Rank]) -> Result<()> {
        try_join_all(
            ranks
                .iter()
                .map(|&rank| self.transport.send(rank, Tag::Terminate, Payload::Signal)),
        )
        .await?;

        for &rank in ranks {
            self.transport
                .recv(Filter::from_rank(rank).with_tag(TagFilter::Terminate))
                .await?;
            debug!(%rank, "termination acknowledged");
        }
        Ok(())
    }

    /// Units go out from the highest index down.
    async fn next_unit(&mut self) -> Result<WorkUnit> {
        let index = self.remaining - 1;
        let unit = self.source.load(index).await?;
        self.remaining -= 1;
        debug!(index, bytes = unit.len(), "dispatching work unit");
        Ok(unit)
    }

    fn enter(&mut self, phase: Phase) {
        if self.phase != phase {
            info!(from = ?self.phase, to = ?phase, "coordinator phase");
        }
        self.phase = phase;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::KeyValue;
    use crate::source::InMemorySource;
    use crate::transport::LocalTransport;

    fn cluster(map: usize, reduce: usize) -> (Topology, Vec<LocalTransport>) {
        let topology = Topology::new(map, reduce).unwrap();
        (topology, LocalTransport::cluster(topology.world_size()))
    }

    #[tokio::test]
    async fn test_coordinator_new() {
        let (topology, mut ranks) = cluster(2, 1);
        let source: InMemorySource = ["x", "y", "z"].into_iter().collect();
        let coordinator = Coordinator::new(ranks.remove(0), topology, source, 3);

        assert_eq!(coordinator.phase(), Phase::DispatchingMap);
        assert_eq!(coordinator.report(), JobReport::default());
        assert_eq!(coordinator.outstanding, vec![false, false]);
    }

    #[tokio::test]
    async fn test_dispatch_is_on_demand() {
        let (topology, mut ranks) = cluster(2, 1);
        let _reduce = ranks.pop().unwrap();
        let mut m1 = ranks.pop().unwrap();
        let mut m0 = ranks.pop().unwrap();
        let source: InMemorySource = ["u0", "u1", "u2"].into_iter().collect();
        let mut coordinator = Coordinator::new(ranks.pop().unwrap(), topology, source, 3);

        let workers = async move {
            let from_coord = Filter::from_rank(Rank::COORDINATOR);
            // Highest index first, one per worker.
            let first0 = m0.recv(from_coord).await.unwrap().payload;
            let first1 = m1.recv(from_coord).await.unwrap().payload;
            assert_eq!(first0, Payload::WorkUnit(WorkUnit::from("u2")));
            assert_eq!(first1, Payload::WorkUnit(WorkUnit::from("u1")));

            // Only the worker that finished gets the last unit.
            m1.send_data(Rank::COORDINATOR, Payload::Signal).await.unwrap();
            let next = m1.recv(from_coord).await.unwrap().payload;
            assert_eq!(next, Payload::WorkUnit(WorkUnit::from("u0")));
            m0.send_data(Rank::COORDINATOR, Payload::Signal).await.unwrap();
            m1.send_data(Rank::COORDINATOR, Payload::Signal).await.unwrap();
            (m0, m1)
        };

        let (done, _workers) = tokio::join!(coordinator.dispatch(), workers);
        done.unwrap();
        assert_eq!(coordinator.phase(), Phase::AwaitingMapDone);
        assert_eq!(coordinator.report().dispatched, 3);
        assert_eq!(coordinator.report().completed, 3);
        assert_eq!(coordinator.outstanding, vec![false, false]);
    }

    #[tokio::test]
    async fn test_completion_without_outstanding_unit_is_rejected() {
        let (topology, mut ranks) = cluster(2, 1);
        let _reduce = ranks.pop().unwrap();
        let m1 = ranks.pop().unwrap();
        let _m0 = ranks.pop().unwrap();
        let source: InMemorySource = ["only"].into_iter().collect();
        let mut coordinator = Coordinator::new(ranks.pop().unwrap(), topology, source, 1);

        // Rank 2 never received a unit.
        m1.send_data(Rank::COORDINATOR, Payload::Signal).await.unwrap();
        let err = coordinator.dispatch().await.unwrap_err();
        assert!(matches!(err, Error::Protocol(_)));
    }

    #[tokio::test]
    async fn test_reduce_termination_requires_map_termination() {
        let (topology, mut ranks) = cluster(1, 1);
        let mut coordinator =
            Coordinator::new(ranks.remove(0), topology, InMemorySource::default(), 0);
        assert!(coordinator.terminate_reduce_workers().await.is_err());
    }

    #[tokio::test]
    async fn test_collect_writes_arrival_order() {
        let (topology, mut ranks) = cluster(1, 2);
        let r1 = ranks.pop().unwrap();
        let r0 = ranks.pop().unwrap();
        let _m0 = ranks.pop().unwrap();
        let mut coordinator =
            Coordinator::new(ranks.pop().unwrap(), topology, InMemorySource::default(), 0);

        r1.send_data(Rank::COORDINATOR, Payload::Record(KeyValue::new("z", 1)))
            .await
            .unwrap();
        r0.send_data(Rank::COORDINATOR, Payload::Record(KeyValue::new("a", 2)))
            .await
            .unwrap();
        r1.send(Rank::COORDINATOR, Tag::Terminate, Payload::Signal)
            .await
            .unwrap();
        r0.send_data(Rank::COORDINATOR, Payload::Record(KeyValue::new("m", 3)))
            .await
            .unwrap();
        r0.send(Rank::COORDINATOR, Tag::Terminate, Payload::Signal)
            .await
            .unwrap();

        let mut out = Vec::new();
        let written = coordinator.collect_and_persist(&mut out).await.unwrap();
        assert_eq!(written, 3);
        assert_eq!(String::from_utf8(out).unwrap(), "z 1\na 2\nm 3\n");
        assert_eq!(coordinator.phase(), Phase::Done);
    }
}
