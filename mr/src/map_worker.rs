use std::fmt;

use tracing::{debug, instrument, trace};

use crate::error::{Error, Result};
use crate::partition::partition;
use crate::record::{KeyValue, WorkUnit};
use crate::task::JobFunctions;
use crate::topology::Topology;
use crate::transport::{Filter, Payload, Rank, Tag, Transport};

/// Pulls work units from the coordinator and shuffles the map output to the
/// reduce workers, one acknowledged record at a time.
pub struct MapWorker<T> {
    id: usize,
    transport: T,
    topology: Topology,
    functions: JobFunctions,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MapWorkerReport {
    pub units: usize,
    pub records: usize,
}

impl<T> fmt::Display for MapWorker<T>
where
    T: Transport,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MapWorker {{ id: {}, rank: {} }}", self.id, self.transport.rank())
    }
}

impl<T> MapWorker<T>
where
    T: Transport,
{
    pub fn new(id: usize, transport: T, topology: Topology, functions: JobFunctions) -> Self {
        MapWorker {
            id,
            transport,
            topology,
            functions,
        }
    }

    /// Runs until the coordinator sends the termination tag, which is echoed
    /// back before returning.
    #[instrument(skip(self), fields(rank = %self.transport.rank()))]
    pub async fn run(mut self) -> Result<MapWorkerReport> {
        let mut report = MapWorkerReport::default();

        loop {
            let envelope = self
                .transport
                .recv(Filter::from_rank(Rank::COORDINATOR))
                .await?;
            if envelope.is_terminate() {
                break;
            }
            let unit = match envelope.payload {
                Payload::WorkUnit(unit) => unit,
                other => {
                    return Err(Error::Protocol(format!(
                        "map worker {} expected a work unit, got {other:?}",
                        self.id
                    )))
                }
            };

            report.records += self.do_map(&unit).await?;
            report.units += 1;
            self.transport
                .send_data(Rank::COORDINATOR, Payload::Signal)
                .await?;
        }

        self.transport
            .send(Rank::COORDINATOR, Tag::Terminate, Payload::Signal)
            .await?;
        debug!(units = report.units, records = report.records, "map worker stopped");
        Ok(report)
    }

    /// Maps one unit and flushes every record; returns how many were sent.
    async fn do_map(&mut self, unit: &WorkUnit) -> Result<usize> {
        let output = self.functions.map(unit).map_err(Error::MapFunction)?;
        debug!(bytes = unit.len(), records = output.len(), "mapped work unit");

        let sent = output.len();
        for record in output {
            self.shuffle(record).await?;
        }
        Ok(sent)
    }

    /// Sends one record to its owner and waits for that owner's ack.
    async fn shuffle(&mut self, record: KeyValue) -> Result<()> {
        let owner = partition(record.key(), self.topology.reduce_workers());
        let dest = self.topology.reduce_rank(owner);
        trace!(key = %record.key(), %dest, "shuffling");

        self.transport
            .send_data(dest, Payload::Record(record))
            .await?;
        let ack = self.transport.recv(Filter::from_rank(dest)).await?;
        match (ack.tag, ack.payload) {
            (Tag::Sender(_), Payload::Signal) => Ok(()),
            (tag, payload) => Err(Error::Protocol(format!(
                "map worker {} expected an ack from {dest}, got {payload:?} tagged {tag:?}",
                self.id
            ))),
        }
    }
}
