use std::collections::VecDeque;

use tokio::sync::mpsc;
use tracing::trace;

use super::{Envelope, Filter, Rank};
use crate::error::{Result, TransportError};

/// What a link hands to a rank's inbox. Links report their own failures here
/// so the next receive surfaces them.
pub type Inbound = Result<Envelope>;

/// A rank's inbox plus the queue of messages that arrived before anyone asked
/// for them.
///
/// A receive first scans the parked messages in arrival order, then pulls from
/// the inbox, parking everything that doesn't match. Per-sender order is
/// preserved because parking never reorders.
pub struct Mailbox {
    owner: Rank,
    inbox: mpsc::UnboundedReceiver<Inbound>,
    parked: VecDeque<Envelope>,
}

impl Mailbox {
    pub fn new(owner: Rank, inbox: mpsc::UnboundedReceiver<Inbound>) -> Self {
        Mailbox {
            owner,
            inbox,
            parked: VecDeque::new(),
        }
    }

    pub async fn recv(&mut self, filter: Filter) -> Result<Envelope> {
        if let Some(pos) = self.parked.iter().position(|e| filter.matches(e)) {
            if let Some(envelope) = self.parked.remove(pos) {
                return Ok(envelope);
            }
        }

        loop {
            match self.inbox.recv().await {
                Some(Ok(envelope)) if filter.matches(&envelope) => return Ok(envelope),
                Some(Ok(envelope)) => {
                    trace!(rank = %self.owner, from = %envelope.source, "parking unmatched message");
                    self.parked.push_back(envelope);
                }
                Some(Err(e)) => return Err(e),
                None => return Err(TransportError::Closed(self.owner).into()),
            }
        }
    }

    pub fn parked(&self) -> usize {
        self.parked.len()
    }
}
