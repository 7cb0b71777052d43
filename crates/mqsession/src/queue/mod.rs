//! Delivery queues.
//!
//! A session owns two [`Queue`]s and picks one per event at routing time:
//!
//! - [`TemporaryQueue`]: bounded, in-memory, best-effort. Drops under
//!   pressure and loses its contents on close.
//! - [`PersistentQueue`]: durable, backed by a [`Bucket`](crate::persistence::Bucket).
//!   Records stay until acknowledged and survive restarts unless the
//!   session is clean.

mod persistent;
mod temporary;

pub use persistent::PersistentQueue;
pub use temporary::TemporaryQueue;

use std::sync::Arc;

use mqsession_core::{Event, Message};
use thiserror::Error;

use crate::persistence::PersistenceError;

/// Queue errors.
#[derive(Error, Debug)]
pub enum QueueError {
    #[error("queue {0} is closed")]
    Closed(String),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}

/// A message handed out by a queue for delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    /// Queue-local sequence number, or the session's ack id once the
    /// session has tagged the delivery.
    pub id: u64,
    pub message: Message,
}

/// Common interface of the best-effort and durable queues.
pub trait Queue: Send + Sync {
    /// Enqueue an event. Completion of the event is the queue's
    /// responsibility only when this returns `Ok`.
    fn push(&self, event: Arc<Event>) -> Result<(), QueueError>;

    /// Take the next message to deliver, if any is available.
    fn pop(&self) -> Result<Option<Delivery>, QueueError>;

    /// Release the message popped with sequence `seq`.
    fn ack(&self, _seq: u64) -> Result<(), QueueError> {
        Ok(())
    }

    /// Make every popped but unacknowledged message available again.
    fn requeue(&self) {}

    /// Number of messages waiting to be popped.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Close the queue. `clean` discards any retained contents.
    /// Closing twice is a no-op.
    fn close(&self, clean: bool);
}
