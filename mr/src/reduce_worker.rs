use std::collections::HashMap;

use tracing::{debug, instrument, trace};

use crate::error::{Error, Result};
use crate::record::Key;
use crate::task::JobFunctions;
use crate::transport::{Filter, Payload, Rank, Tag, Transport};

/// Values received so far, grouped by key. Each list is in arrival order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Accumulator {
    values: HashMap<Key, Vec<i32>>,
}

impl Accumulator {
    pub fn push(&mut self, key: Key, value: i32) {
        self.values.entry(key).or_default().push(value);
    }

    pub fn values(&self, key: &Key) -> Option<&[i32]> {
        self.values.get(key).map(Vec::as_slice)
    }

    pub fn keys(&self) -> impl Iterator<Item = &Key> {
        self.values.keys()
    }

    /// Number of distinct keys.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Number of values across all keys.
    pub fn record_count(&self) -> usize {
        self.values.values().map(Vec::len).sum()
    }
}

impl IntoIterator for Accumulator {
    type Item = (Key, Vec<i32>);
    type IntoIter = std::collections::hash_map::IntoIter<Key, Vec<i32>>;

    fn into_iter(self) -> Self::IntoIter {
        self.values.into_iter()
    }
}

/// Collects every record routed to it until termination, then reduces each
/// key once and streams the results to the coordinator.
pub struct ReduceWorker<T> {
    id: usize,
    transport: T,
    functions: JobFunctions,
}

impl<T> ReduceWorker<T>
where
    T: Transport,
{
    pub fn new(id: usize, transport: T, functions: JobFunctions) -> Self {
        ReduceWorker {
            id,
            transport,
            functions,
        }
    }

    #[instrument(skip(self), fields(rank = %self.transport.rank()))]
    pub async fn run(mut self) -> Result<usize> {
        let accumulator = self.accumulate().await?;
        self.acknowledge_termination().await?;
        self.report(accumulator).await
    }

    /// Receives records from any map worker until the termination tag shows
    /// up. Each record is acknowledged before it is stored.
    pub async fn accumulate(&mut self) -> Result<Accumulator> {
        let mut accumulator = Accumulator::default();

        loop {
            let envelope = self.transport.recv(Filter::any()).await?;
            if envelope.is_terminate() {
                break;
            }
            let record = match envelope.payload {
                Payload::Record(record) => record,
                other => {
                    return Err(Error::Protocol(format!(
                        "reduce worker {} expected a record from {}, got {other:?}",
                        self.id, envelope.source
                    )))
                }
            };

            self.transport
                .send_data(envelope.source, Payload::Signal)
                .await?;
            trace!(key = %record.key(), from = %envelope.source, "accumulated");
            accumulator.push(record.key().clone(), record.value());
        }

        debug!(
            keys = accumulator.len(),
            records = accumulator.record_count(),
            "shuffle finished"
        );
        Ok(accumulator)
    }

    pub async fn acknowledge_termination(&self) -> Result<()> {
        self.transport
            .send(Rank::COORDINATOR, Tag::Terminate, Payload::Signal)
            .await
    }

    /// Reduces every key and sends the results, then the end-of-results
    /// sentinel. Returns the number of results sent.
    pub async fn report(&self, accumulator: Accumulator) -> Result<usize> {
        let mut sent = 0;
        for (key, values) in accumulator {
            let result = self.functions.reduce(&key, &values);
            self.transport
                .send_data(Rank::COORDINATOR, Payload::Record(result))
                .await?;
            sent += 1;
        }

        self.transport
            .send(Rank::COORDINATOR, Tag::Terminate, Payload::Signal)
            .await?;
        debug!(results = sent, "reduce worker stopped");
        Ok(sent)
    }
}
