use std::{
    collections::{hash_map::Entry, HashMap},
    io,
    net::SocketAddr,
    pin::Pin,
};

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tarpc::{
    serde_transport::{self, tcp},
    tokio_serde::formats::Json,
};
use tokio::{
    net::TcpStream,
    sync::{mpsc, Mutex},
    time::{sleep, Duration},
};
use tracing::{debug, warn};

use super::{Envelope, Filter, Inbound, Mailbox, Payload, Rank, Tag, Transport};
use crate::error::{Result, TransportError};

type Link = Pin<Box<serde_transport::Transport<TcpStream, Envelope, Envelope, Json<Envelope, Envelope>>>>;

// Peers start in any order, so a refused connection is retried for a while
// before it counts as a failure.
const CONNECT_ATTEMPTS: u32 = 100;
const CONNECT_BACKOFF: Duration = Duration::from_millis(100);

/// One rank per process. Each rank listens on its own address; outbound links
/// are opened on first use and kept for the rest of the run, one per
/// destination, which is what keeps every link FIFO.
pub struct TcpTransport {
    rank: Rank,
    peers: Vec<String>,
    local_addr: SocketAddr,
    links: Mutex<HashMap<Rank, Link>>,
    mailbox: Mailbox,
}

impl TcpTransport {
    /// Starts listening on `peers[rank]`. `peers` holds one address per rank.
    pub async fn bind(rank: Rank, peers: Vec<String>) -> Result<Self> {
        let addr = peers
            .get(rank.index())
            .ok_or(TransportError::UnknownRank(rank))?;

        let mut listener = tcp::listen(addr.as_str(), Json::<Envelope, Envelope>::default)
            .await
            .map_err(TransportError::Io)?;
        listener.config_mut().max_frame_length(usize::MAX);
        let local_addr = listener.local_addr();
        debug!(%rank, %local_addr, "listening");

        let (inbox_tx, inbox_rx) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            let mut incoming = Box::pin(listener);
            while let Some(conn) = incoming.next().await {
                match conn {
                    Ok(link) => {
                        tokio::spawn(forward(rank, Box::pin(link), inbox_tx.clone()));
                    }
                    Err(e) => warn!(%rank, "accept failed: {e}"),
                }
            }
        });

        Ok(TcpTransport {
            rank,
            peers,
            local_addr,
            links: Mutex::new(HashMap::new()),
            mailbox: Mailbox::new(rank, inbox_rx),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Replaces the address used to reach `rank`. Only affects links that
    /// have not been opened yet.
    pub fn set_peer_addr(&mut self, rank: Rank, addr: SocketAddr) -> Result<()> {
        let slot = self
            .peers
            .get_mut(rank.index())
            .ok_or(TransportError::UnknownRank(rank))?;
        *slot = addr.to_string();
        Ok(())
    }

    async fn connect(&self, dest: Rank) -> Result<Link> {
        let addr = self
            .peers
            .get(dest.index())
            .ok_or(TransportError::UnknownRank(dest))?;

        let mut attempt = 1;
        loop {
            let mut connect = tcp::connect(addr.as_str(), Json::<Envelope, Envelope>::default);
            connect.config_mut().max_frame_length(usize::MAX);
            match connect.await {
                Ok(link) => {
                    debug!(rank = %self.rank, %dest, %addr, attempt, "connected");
                    return Ok(Box::pin(link));
                }
                Err(e)
                    if attempt < CONNECT_ATTEMPTS
                        && e.kind() == io::ErrorKind::ConnectionRefused =>
                {
                    attempt += 1;
                    sleep(CONNECT_BACKOFF).await;
                }
                Err(source) => {
                    return Err(TransportError::Connect {
                        rank: dest,
                        addr: addr.clone(),
                        source,
                    }
                    .into())
                }
            }
        }
    }
}

/// Pumps one inbound connection into the owner's inbox until the peer hangs
/// up.
async fn forward(owner: Rank, mut link: Link, inbox: mpsc::UnboundedSender<Inbound>) {
    while let Some(frame) = link.next().await {
        let failed = frame.is_err();
        let item = frame.map_err(|e| TransportError::Io(e).into());
        if inbox.send(item).is_err() || failed {
            break;
        }
    }
    debug!(rank = %owner, "inbound link closed");
}

#[async_trait]
impl Transport for TcpTransport {
    fn rank(&self) -> Rank {
        self.rank
    }

    async fn send(&self, dest: Rank, tag: Tag, payload: Payload) -> Result<()> {
        let envelope = Envelope {
            source: self.rank,
            tag,
            payload,
        };

        let mut links = self.links.lock().await;
        let link = match links.entry(dest) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => entry.insert(self.connect(dest).await?),
        };
        link.send(envelope).await.map_err(TransportError::Io)?;
        Ok(())
    }

    async fn recv(&mut self, filter: Filter) -> Result<Envelope> {
        self.mailbox.recv(filter).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{KeyValue, WorkUnit};

    async fn pair() -> (TcpTransport, TcpTransport) {
        let peers = vec!["127.0.0.1:0".to_string(), "127.0.0.1:0".to_string()];
        let mut zero = TcpTransport::bind(Rank(0), peers.clone()).await.unwrap();
        let mut one = TcpTransport::bind(Rank(1), peers).await.unwrap();
        let (a0, a1) = (zero.local_addr(), one.local_addr());
        for t in [&mut zero, &mut one] {
            t.set_peer_addr(Rank(0), a0).unwrap();
            t.set_peer_addr(Rank(1), a1).unwrap();
        }
        (zero, one)
    }

    #[tokio::test]
    async fn test_tcp_round_trip_in_order() {
        let (mut zero, mut one) = pair().await;

        zero.send_data(Rank(1), Payload::WorkUnit(WorkUnit::from("a b a")))
            .await
            .unwrap();
        for i in 0..3 {
            zero.send_data(Rank(1), Payload::Record(KeyValue::new("k", i)))
                .await
                .unwrap();
        }
        zero.send(Rank(1), Tag::Terminate, Payload::Signal)
            .await
            .unwrap();

        let first = one.recv(Filter::from_rank(Rank(0))).await.unwrap();
        assert_eq!(first.tag, Tag::Sender(Rank(0)));
        assert_eq!(first.payload, Payload::WorkUnit(WorkUnit::from("a b a")));
        for i in 0..3 {
            let next = one.recv(Filter::any()).await.unwrap();
            assert_eq!(next.payload, Payload::Record(KeyValue::new("k", i)));
        }
        let last = one.recv(Filter::any()).await.unwrap();
        assert!(last.is_terminate());

        one.send_data(Rank(0), Payload::Signal).await.unwrap();
        let ack = zero.recv(Filter::from_rank(Rank(1))).await.unwrap();
        assert_eq!(ack.tag, Tag::Sender(Rank(1)));
    }

    #[tokio::test]
    async fn test_tcp_unknown_rank() {
        let (zero, _one) = pair().await;
        let err = zero.send_data(Rank(9), Payload::Signal).await.unwrap_err();
        assert!(matches!(
            err,
            crate::Error::Transport(TransportError::UnknownRank(Rank(9)))
        ));
    }
}
