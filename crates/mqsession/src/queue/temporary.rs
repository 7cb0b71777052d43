//! Bounded in-memory queue for best-effort delivery.

use std::sync::Arc;

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use mqsession_core::{Counter, Event};
use parking_lot::RwLock;

use super::{Delivery, Queue, QueueError};

/// Best-effort queue. Never blocks a producer: when full, the new event is
/// dropped and completed.
pub struct TemporaryQueue {
    name: String,
    tx: Sender<Arc<Event>>,
    rx: Receiver<Arc<Event>>,
    seq: Counter,
    /// Held for read while pushing so close cannot interleave with a send.
    closed: RwLock<bool>,
}

impl TemporaryQueue {
    pub fn new(name: impl Into<String>, capacity: usize) -> Self {
        let (tx, rx) = bounded(capacity.max(1));
        Self {
            name: name.into(),
            tx,
            rx,
            seq: Counter::new(),
            closed: RwLock::new(false),
        }
    }
}

impl Queue for TemporaryQueue {
    fn push(&self, event: Arc<Event>) -> Result<(), QueueError> {
        let closed = self.closed.read();
        if *closed {
            return Err(QueueError::Closed(self.name.clone()));
        }

        match self.tx.try_send(event) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(event)) => {
                log::debug!("[{}] qos0 queue full, dropping message: {}", self.name, event);
                event.done();
                Ok(())
            }
            // Both ends live in self, so the channel cannot disconnect.
            Err(TrySendError::Disconnected(_)) => Err(QueueError::Closed(self.name.clone())),
        }
    }

    fn pop(&self) -> Result<Option<Delivery>, QueueError> {
        let Ok(event) = self.rx.try_recv() else {
            return Ok(None);
        };
        event.done();
        Ok(Some(Delivery {
            id: self.seq.next_id(),
            message: event.message().clone(),
        }))
    }

    fn len(&self) -> usize {
        self.rx.len()
    }

    fn close(&self, _clean: bool) {
        let mut closed = self.closed.write();
        if *closed {
            return;
        }
        *closed = true;

        let mut dropped = 0;
        for event in self.rx.try_iter() {
            event.done();
            dropped += 1;
        }
        if dropped > 0 {
            log::debug!("[{}] qos0 queue closed, {} messages dropped", self.name, dropped);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use mqsession_core::{Message, QoS};

    use super::*;

    fn event(topic: &str, done: &Arc<AtomicUsize>) -> Arc<Event> {
        let done = Arc::clone(done);
        Arc::new(Event::new(
            Message::new(topic, "payload", QoS::AtMostOnce),
            move || {
                done.fetch_add(1, Ordering::SeqCst);
            },
        ))
    }

    #[test]
    fn test_fifo_and_completion_on_pop() {
        let done = Arc::new(AtomicUsize::new(0));
        let queue = TemporaryQueue::new("c1", 4);

        queue.push(event("a", &done)).unwrap();
        queue.push(event("b", &done)).unwrap();
        assert_eq!(queue.len(), 2);
        assert_eq!(done.load(Ordering::SeqCst), 0);

        let first = queue.pop().unwrap().unwrap();
        let second = queue.pop().unwrap().unwrap();
        assert_eq!(first.message.topic, "a");
        assert_eq!(second.message.topic, "b");
        assert!(second.id > first.id);
        assert_eq!(done.load(Ordering::SeqCst), 2);
        assert!(queue.pop().unwrap().is_none());
    }

    #[test]
    fn test_full_queue_drops_and_completes() {
        let done = Arc::new(AtomicUsize::new(0));
        let queue = TemporaryQueue::new("c1", 1);

        queue.push(event("kept", &done)).unwrap();
        queue.push(event("dropped", &done)).unwrap();

        assert_eq!(queue.len(), 1);
        assert_eq!(done.load(Ordering::SeqCst), 1);
        assert_eq!(queue.pop().unwrap().unwrap().message.topic, "kept");
    }

    #[test]
    fn test_close_drains_and_rejects() {
        let done = Arc::new(AtomicUsize::new(0));
        let queue = TemporaryQueue::new("c1", 8);
        queue.push(event("a", &done)).unwrap();
        queue.push(event("b", &done)).unwrap();

        queue.close(false);
        queue.close(true);
        assert_eq!(done.load(Ordering::SeqCst), 2);
        assert!(queue.is_empty());

        let late = event("late", &done);
        assert!(matches!(
            queue.push(Arc::clone(&late)),
            Err(QueueError::Closed(_))
        ));
        // A rejected event is left for the caller to complete.
        assert!(!late.is_done());
    }
}
