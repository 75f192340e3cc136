use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::{Envelope, Filter, Inbound, Mailbox, Payload, Rank, Tag, Transport};
use crate::error::{Result, TransportError};

/// In-process transport: every rank gets an unbounded inbox and a handle to
/// everyone else's.
///
/// ```
/// use mr::transport::{Filter, LocalTransport, Payload, Rank, Transport};
///
/// #[tokio::main]
/// async fn main() -> mr::Result<()> {
///     let mut ranks = LocalTransport::cluster(2);
///     let mut one = ranks.pop().unwrap();
///     let zero = ranks.pop().unwrap();
///
///     zero.send_data(Rank(1), Payload::Signal).await?;
///     let envelope = one.recv(Filter::from_rank(Rank(0))).await?;
///     assert_eq!(envelope.payload, Payload::Signal);
///     Ok(())
/// }
/// ```
pub struct LocalTransport {
    rank: Rank,
    peers: Arc<Vec<mpsc::UnboundedSender<Inbound>>>,
    mailbox: Mailbox,
}

impl LocalTransport {
    /// Builds `world_size` connected endpoints; element `i` is rank `i`.
    pub fn cluster(world_size: usize) -> Vec<LocalTransport> {
        let (senders, receivers): (Vec<_>, Vec<_>) =
            (0..world_size).map(|_| mpsc::unbounded_channel()).unzip();
        let peers = Arc::new(senders);

        receivers
            .into_iter()
            .enumerate()
            .map(|(i, inbox)| {
                let rank = Rank(i as u32);
                LocalTransport {
                    rank,
                    peers: Arc::clone(&peers),
                    mailbox: Mailbox::new(rank, inbox),
                }
            })
            .collect()
    }
}

#[async_trait]
impl Transport for LocalTransport {
    fn rank(&self) -> Rank {
        self.rank
    }

    async fn send(&self, dest: Rank, tag: Tag, payload: Payload) -> Result<()> {
        let peer = self
            .peers
            .get(dest.index())
            .ok_or(TransportError::UnknownRank(dest))?;
        let envelope = Envelope {
            source: self.rank,
            tag,
            payload,
        };
        peer.send(Ok(envelope))
            .map_err(|_| TransportError::Closed(dest))?;
        Ok(())
    }

    async fn recv(&mut self, filter: Filter) -> Result<Envelope> {
        self.mailbox.recv(filter).await
    }
}
