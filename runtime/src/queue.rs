//! The height-aware inbound queue. Many producers push wire messages as
//! they arrive off the network; a single consumer pulls messages for
//! the height it currently cares about and silently discards anything
//! else, bounded by a per-call timeout.

use std::time::Duration;
use tallychain_common::{Block, Height, PubKey, Round};
use tallychain_engine::{PrecommitMsg, PrevoteMsg};
use tokio::sync::mpsc;
use tokio::time::Instant;

/// A proposal as it arrives off the wire, before the runtime has
/// checked its signer against the round's expected proposer. Carries
/// `proposer` explicitly since [`tallychain_engine::ProposalMsg`] does
/// not — the wire message is signed by its sender, but the engine only
/// ever sees round+block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProposalEnvelope {
    pub height: Height,
    pub round: Round,
    pub block: Block,
    pub proposer: PubKey,
}

/// The three wire message kinds the queue carries, each tagged with
/// the height it belongs to so [`HeightAwareQueue::get`] can filter
/// without unpacking each variant's inner fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundMessage {
    Proposal(ProposalEnvelope),
    Prevote(PrevoteMsg),
    Precommit(PrecommitMsg),
}

impl InboundMessage {
    pub fn height(&self) -> Height {
        match self {
            InboundMessage::Proposal(p) => p.height,
            InboundMessage::Prevote(p) => p.height,
            InboundMessage::Precommit(p) => p.height,
        }
    }
}

/// What a single [`HeightAwareQueue::get`] call produced: either the
/// next message for the height asked about, or nothing within the
/// timeout — a sentinel, since this call never blocks indefinitely.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueItem {
    Message(InboundMessage),
    Empty,
}

/// A cloneable producer handle. Any number of tasks (one per peer
/// connection, typically) can hold one and push concurrently; only the
/// [`HeightAwareQueue`] itself is consumed, and only by a single task.
#[derive(Clone)]
pub struct QueueHandle {
    sender: mpsc::UnboundedSender<InboundMessage>,
}

impl QueueHandle {
    /// Enqueues a message. Never blocks, never fails observably: if the
    /// consumer has already shut down there is nothing useful to do
    /// with the error, so it is logged and dropped.
    pub fn push(&self, message: InboundMessage) {
        if self.sender.send(message).is_err() {
            log::debug!("dropped inbound message: consumer has shut down");
        }
    }
}

pub struct HeightAwareQueue {
    receiver: mpsc::UnboundedReceiver<InboundMessage>,
    discarded: u64,
}

impl HeightAwareQueue {
    pub fn new() -> (QueueHandle, Self) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (QueueHandle { sender }, HeightAwareQueue { receiver, discarded: 0 })
    }

    /// Waits up to `timeout` for the next message belonging to
    /// `current_height`, discarding (and counting) anything for a
    /// different height along the way. A message for a *past* height
    /// is just as stale as one for a future height here — this queue
    /// has no notion of "buffer for later".
    pub async fn get(&mut self, current_height: Height, timeout: Duration) -> QueueItem {
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return QueueItem::Empty;
            }
            match tokio::time::timeout(remaining, self.receiver.recv()).await {
                Ok(Some(message)) => {
                    if message.height() == current_height {
                        return QueueItem::Message(message);
                    }
                    self.discarded += 1;
                    log::debug!(
                        "discarding message for height {} while waiting on height {}",
                        message.height(),
                        current_height
                    );
                }
                Ok(None) => return QueueItem::Empty,
                Err(_) => return QueueItem::Empty,
            }
        }
    }

    pub fn discarded_count(&self) -> u64 {
        self.discarded
    }
}
