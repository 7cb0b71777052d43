//! Messages and the events that carry them through the broker.
//!
//! A [`Message`] is plain serializable data: it is what gets persisted in
//! durable queues and stored as a will. An [`Event`] wraps a message with a
//! one-shot [`Completion`] that fires once the broker is done with it,
//! whether it was delivered, durably queued or dropped.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::qos::QoS;

/// An application message.
///
/// Stored with bincode in durable queues, so fields are never skipped on
/// serialization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Concrete topic name (never contains wildcards).
    pub topic: String,
    /// Message payload.
    #[serde(default)]
    pub payload: Bytes,
    /// Delivery class requested by the publisher.
    #[serde(default)]
    pub qos: QoS,
    /// Retain flag as published.
    #[serde(default)]
    pub retain: bool,
}

impl Message {
    pub fn new(topic: impl Into<String>, payload: impl Into<Bytes>, qos: QoS) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
            qos,
            retain: false,
        }
    }

    pub fn with_retain(mut self, retain: bool) -> Self {
        self.retain = retain;
        self
    }
}

type Callback = Box<dyn FnOnce() + Send + 'static>;

/// One-shot completion handle.
///
/// The callback runs at most once no matter how many times
/// [`Completion::complete`] is called or from how many threads.
pub struct Completion {
    callback: Mutex<Option<Callback>>,
    completed: AtomicBool,
}

impl Completion {
    pub fn new<F>(callback: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            callback: Mutex::new(Some(Box::new(callback))),
            completed: AtomicBool::new(false),
        }
    }

    /// A completion with nothing to notify.
    pub fn noop() -> Self {
        Self {
            callback: Mutex::new(None),
            completed: AtomicBool::new(false),
        }
    }

    /// Fire the completion. Returns `true` only for the call that fired it.
    pub fn complete(&self) -> bool {
        if self.completed.swap(true, Ordering::AcqRel) {
            return false;
        }
        // Take the callback out before running it so the lock is not held
        // across user code.
        let callback = self.callback.lock().take();
        if let Some(callback) = callback {
            callback();
        }
        true
    }

    #[inline]
    pub fn is_complete(&self) -> bool {
        self.completed.load(Ordering::Acquire)
    }
}

impl fmt::Debug for Completion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Completion")
            .field("completed", &self.is_complete())
            .finish()
    }
}

/// An inbound publish travelling towards one or more sessions.
#[derive(Debug)]
pub struct Event {
    message: Message,
    completion: Completion,
}

impl Event {
    /// Create an event whose completion runs `on_done`.
    pub fn new<F>(message: Message, on_done: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            message,
            completion: Completion::new(on_done),
        }
    }

    #[inline]
    pub fn topic(&self) -> &str {
        &self.message.topic
    }

    #[inline]
    pub fn qos(&self) -> QoS {
        self.message.qos
    }

    #[inline]
    pub fn message(&self) -> &Message {
        &self.message
    }

    /// Mark the event as fully handled. Only the first call has an effect.
    pub fn done(&self) {
        self.completion.complete();
    }

    #[inline]
    pub fn is_done(&self) -> bool {
        self.completion.is_complete()
    }

    /// Split the event into `n` independent copies, one per receiver.
    ///
    /// The original completes once every copy has completed or been
    /// dropped. With `n == 0` it completes immediately.
    pub fn split(self: Arc<Self>, n: usize) -> Vec<Arc<Event>> {
        let guard = Arc::new(CompleteOnDrop(self));
        (0..n)
            .map(|_| {
                let guard = Arc::clone(&guard);
                let message = guard.0.message.clone();
                Arc::new(Event::new(message, move || drop(guard)))
            })
            .collect()
    }
}

impl From<Message> for Event {
    fn from(message: Message) -> Self {
        Self {
            message,
            completion: Completion::noop(),
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "topic={} qos={} retain={} payload={}B",
            self.message.topic,
            self.message.qos as u8,
            self.message.retain,
            self.message.payload.len()
        )
    }
}

struct CompleteOnDrop(Arc<Event>);

impl Drop for CompleteOnDrop {
    fn drop(&mut self) {
        self.0.done();
    }
}
