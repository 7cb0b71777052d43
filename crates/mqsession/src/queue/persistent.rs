//! Durable queue for guaranteed delivery.
//!
//! Records are written to the session's bucket before the event is
//! completed, and deleted only when the delivery is acknowledged. Opening a
//! queue over a bucket that already holds records makes them available for
//! redelivery in their original order.

use std::collections::{BTreeSet, VecDeque};
use std::sync::Arc;

use mqsession_core::{Event, Message};
use parking_lot::Mutex;

use super::{Delivery, Queue, QueueError};
use crate::persistence::{Bucket, PersistenceError};

struct State {
    next_seq: u64,
    /// Stored and not yet handed out.
    pending: VecDeque<u64>,
    /// Handed out and awaiting acknowledgement.
    inflight: BTreeSet<u64>,
    closed: bool,
}

/// Guaranteed-delivery queue backed by a [`Bucket`].
pub struct PersistentQueue {
    bucket: Bucket,
    max_inflight: usize,
    state: Mutex<State>,
}

impl PersistentQueue {
    /// Open the queue over `bucket`, reloading any stored records.
    ///
    /// At most `max_inflight` messages are handed out without an ack; `pop`
    /// returns `None` while that window is full.
    pub fn open(bucket: Bucket, max_inflight: usize) -> Result<Self, PersistenceError> {
        let pending: VecDeque<u64> = bucket.sequences()?.into();
        let next_seq = pending.back().map_or(1, |last| last + 1);

        if !pending.is_empty() {
            log::info!(
                "[{}] reloaded {} stored qos1 messages",
                bucket.name(),
                pending.len()
            );
        }

        Ok(Self {
            bucket,
            max_inflight: max_inflight.max(1),
            state: Mutex::new(State {
                next_seq,
                pending,
                inflight: BTreeSet::new(),
                closed: false,
            }),
        })
    }

    fn closed_error(&self) -> QueueError {
        QueueError::Closed(self.bucket.name().to_string())
    }

    /// Number of popped messages awaiting acknowledgement.
    pub fn inflight(&self) -> usize {
        self.state.lock().inflight.len()
    }
}

impl Queue for PersistentQueue {
    fn push(&self, event: Arc<Event>) -> Result<(), QueueError> {
        {
            let mut state = self.state.lock();
            if state.closed {
                return Err(self.closed_error());
            }

            let seq = state.next_seq;
            self.bucket.put(seq, event.message())?;
            state.next_seq += 1;
            state.pending.push_back(seq);
        }

        // Durably queued counts as handled for the publisher.
        event.done();
        Ok(())
    }

    fn pop(&self) -> Result<Option<Delivery>, QueueError> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(self.closed_error());
        }

        while state.inflight.len() < self.max_inflight {
            let Some(seq) = state.pending.pop_front() else {
                return Ok(None);
            };

            match self.bucket.get::<Message>(seq) {
                Ok(Some(message)) => {
                    state.inflight.insert(seq);
                    return Ok(Some(Delivery { id: seq, message }));
                }
                Ok(None) => {
                    log::warn!("[{}] qos1 record {} vanished, skipping", self.bucket.name(), seq);
                }
                Err(e) => {
                    state.pending.push_front(seq);
                    return Err(e.into());
                }
            }
        }

        Ok(None)
    }

    fn ack(&self, seq: u64) -> Result<(), QueueError> {
        let mut state = self.state.lock();
        if !state.inflight.remove(&seq) {
            // Acked after a requeue moved it back.
            state.pending.retain(|s| *s != seq);
        }
        self.bucket.delete(seq)?;
        Ok(())
    }

    fn requeue(&self) {
        let mut state = self.state.lock();
        let inflight = std::mem::take(&mut state.inflight);
        for seq in inflight.into_iter().rev() {
            state.pending.push_front(seq);
        }
    }

    fn len(&self) -> usize {
        self.state.lock().pending.len()
    }

    fn close(&self, clean: bool) {
        let mut state = self.state.lock();
        if state.closed {
            return;
        }
        state.closed = true;
        state.pending.clear();
        state.inflight.clear();

        if clean {
            match self.bucket.clear() {
                Ok(n) if n > 0 => {
                    log::debug!("[{}] discarded {} stored qos1 messages", self.bucket.name(), n)
                }
                Ok(_) => {}
                Err(e) => log::error!("[{}] failed to clear qos1 queue: {}", self.bucket.name(), e),
            }
        } else if let Err(e) = self.bucket.sync() {
            log::error!("[{}] failed to flush qos1 queue: {}", self.bucket.name(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use mqsession_core::QoS;
    use tempfile::tempdir;

    use super::*;
    use crate::persistence::Store;

    fn event(topic: &str, done: &Arc<AtomicUsize>) -> Arc<Event> {
        let done = Arc::clone(done);
        Arc::new(Event::new(
            Message::new(topic, topic.as_bytes().to_vec(), QoS::AtLeastOnce),
            move || {
                done.fetch_add(1, Ordering::SeqCst);
            },
        ))
    }

    #[test]
    fn test_push_completes_after_write() {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path()).unwrap();
        let queue = PersistentQueue::open(store.bucket("c1").unwrap(), 10).unwrap();
        let done = Arc::new(AtomicUsize::new(0));

        queue.push(event("a", &done)).unwrap();
        assert_eq!(done.load(Ordering::SeqCst), 1);
        assert_eq!(queue.len(), 1);
        assert_eq!(store.bucket("c1").unwrap().sequences().unwrap(), vec![1]);
    }

    #[test]
    fn test_pop_and_ack() {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path()).unwrap();
        let queue = PersistentQueue::open(store.bucket("c1").unwrap(), 10).unwrap();
        let done = Arc::new(AtomicUsize::new(0));

        queue.push(event("a", &done)).unwrap();
        queue.push(event("b", &done)).unwrap();

        let first = queue.pop().unwrap().unwrap();
        assert_eq!(first.message.topic, "a");
        assert_eq!(first.message.payload.as_ref(), b"a");
        assert_eq!(queue.inflight(), 1);

        queue.ack(first.id).unwrap();
        queue.ack(first.id).unwrap();
        assert_eq!(queue.inflight(), 0);
        assert_eq!(store.bucket("c1").unwrap().sequences().unwrap(), vec![2]);
    }

    #[test]
    fn test_inflight_window() {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path()).unwrap();
        let queue = PersistentQueue::open(store.bucket("c1").unwrap(), 2).unwrap();
        let done = Arc::new(AtomicUsize::new(0));

        for topic in ["a", "b", "c"] {
            queue.push(event(topic, &done)).unwrap();
        }

        let a = queue.pop().unwrap().unwrap();
        let _b = queue.pop().unwrap().unwrap();
        assert!(queue.pop().unwrap().is_none());

        queue.ack(a.id).unwrap();
        assert_eq!(queue.pop().unwrap().unwrap().message.topic, "c");
    }

    #[test]
    fn test_requeue_redelivers_in_order() {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path()).unwrap();
        let queue = PersistentQueue::open(store.bucket("c1").unwrap(), 10).unwrap();
        let done = Arc::new(AtomicUsize::new(0));

        for topic in ["a", "b", "c"] {
            queue.push(event(topic, &done)).unwrap();
        }
        queue.pop().unwrap();
        queue.pop().unwrap();

        queue.requeue();
        let topics: Vec<_> = std::iter::from_fn(|| queue.pop().unwrap())
            .map(|d| d.message.topic)
            .collect();
        assert_eq!(topics, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_ack_after_requeue_drops_pending_entry() {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path()).unwrap();
        let queue = PersistentQueue::open(store.bucket("c1").unwrap(), 10).unwrap();
        let done = Arc::new(AtomicUsize::new(0));

        queue.push(event("a", &done)).unwrap();
        queue.push(event("b", &done)).unwrap();
        let a = queue.pop().unwrap().unwrap();
        queue.requeue();
        assert_eq!(queue.len(), 2);

        // Late ack for a record no longer in flight.
        queue.ack(a.id).unwrap();
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.inflight(), 0);
        assert_eq!(queue.pop().unwrap().unwrap().message.topic, "b");
        assert_eq!(store.bucket("c1").unwrap().sequences().unwrap(), vec![2]);
    }

    #[test]
    fn test_reopen_retains_unacked() {
        let dir = tempdir().unwrap();
        let done = Arc::new(AtomicUsize::new(0));
        {
            let store = Store::open(dir.path()).unwrap();
            let queue = PersistentQueue::open(store.bucket("c1").unwrap(), 10).unwrap();
            queue.push(event("a", &done)).unwrap();
            queue.push(event("b", &done)).unwrap();
            let a = queue.pop().unwrap().unwrap();
            queue.ack(a.id).unwrap();
            queue.pop().unwrap().unwrap(); // "b" popped but never acked
            queue.close(false);
        }

        let store = Store::open(dir.path()).unwrap();
        let queue = PersistentQueue::open(store.bucket("c1").unwrap(), 10).unwrap();
        assert_eq!(queue.len(), 1);
        let b = queue.pop().unwrap().unwrap();
        assert_eq!(b.message.topic, "b");

        queue.push(event("c", &done)).unwrap();
        let c = queue.pop().unwrap().unwrap();
        assert!(c.id > b.id);
    }

    #[test]
    fn test_clean_close_discards_records() {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path()).unwrap();
        let queue = PersistentQueue::open(store.bucket("c1").unwrap(), 10).unwrap();
        let done = Arc::new(AtomicUsize::new(0));

        queue.push(event("a", &done)).unwrap();
        queue.close(true);
        queue.close(true);

        assert!(store.bucket("c1").unwrap().sequences().unwrap().is_empty());
        assert!(matches!(queue.push(event("b", &done)), Err(QueueError::Closed(_))));
        assert!(matches!(queue.pop(), Err(QueueError::Closed(_))));
    }
}
