//! Tagged point-to-point messaging between ranks.
//!
//! Every role in the job talks to its peers only through a [`Transport`]:
//! `send` hands a message to the link and returns without waiting for the
//! receiver, `recv` blocks until a message matching a [`Filter`] arrives.
//! Messages from one sender to one receiver arrive in the order they were
//! sent. Nothing is promised across different senders.
//!
//! Two implementations are provided:
//! - [`LocalTransport`]: every rank in one process, linked by tokio channels.
//! - [`TcpTransport`]: one rank per process, linked by JSON-framed TCP
//!   streams.

use async_trait::async_trait;

use crate::error::Result;

mod local;
mod mailbox;
mod message;
mod tcp;

pub use local::LocalTransport;
pub use mailbox::{Inbound, Mailbox};
pub use message::{Envelope, Filter, Payload, Rank, Source, Tag, TagFilter};
pub use tcp::TcpTransport;

#[async_trait]
pub trait Transport: Send + Sync {
    /// The rank this endpoint belongs to.
    fn rank(&self) -> Rank;

    /// Queues `payload` for `dest`. Does not wait for the receiver.
    async fn send(&self, dest: Rank, tag: Tag, payload: Payload) -> Result<()>;

    /// Waits for the next message matching `filter`.
    async fn recv(&mut self, filter: Filter) -> Result<Envelope>;

    /// Sends data tagged with this rank.
    async fn send_data(&self, dest: Rank, payload: Payload) -> Result<()> {
        let tag = Tag::Sender(self.rank());
        self.send(dest, tag, payload).await
    }
}
