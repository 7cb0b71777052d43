//! Topic exchange: which sessions are interested in which filters.
//!
//! Sessions register through [`Exchange::bind`]/[`Exchange::unbind`] while
//! holding their own lock, so implementations must never call back into a
//! session while holding theirs.

use std::sync::Arc;

use ahash::AHashMap;
use mqsession_core::{topic_matches_filter, Event};
use parking_lot::RwLock;

use crate::session::Session;

/// Process-wide filter → session registry.
///
/// Both operations are idempotent. `unbind` only removes the binding if it
/// belongs to that exact session, not merely to a session with the same id.
pub trait Exchange: Send + Sync {
    fn bind(&self, filter: &str, session: Arc<Session>);
    fn unbind(&self, filter: &str, session: &Session);
}

/// filter -> client id -> session
type Bindings = AHashMap<String, AHashMap<String, Arc<Session>>>;

/// In-memory [`Exchange`] with publish fan-out.
#[derive(Default)]
pub struct MemoryExchange {
    bindings: RwLock<Bindings>,
}

impl MemoryExchange {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sessions with at least one filter matching `topic`, each once.
    pub fn sessions_for(&self, topic: &str) -> Vec<Arc<Session>> {
        let bindings = self.bindings.read();
        let mut matched: AHashMap<&str, &Arc<Session>> = AHashMap::new();
        for (filter, sessions) in bindings.iter() {
            if topic_matches_filter(topic, filter) {
                for (id, session) in sessions {
                    matched.entry(id.as_str()).or_insert(session);
                }
            }
        }
        matched.into_values().map(Arc::clone).collect()
    }

    /// Fan `event` out to every interested session.
    ///
    /// Each session receives its own copy and arbitrates QoS through its
    /// own subscriptions. The original event completes once every copy has.
    /// Returns the number of sessions the event was routed to.
    pub fn route(&self, event: Arc<Event>) -> usize {
        let sessions = self.sessions_for(event.topic());
        let copies = event.split(sessions.len());

        for (session, copy) in sessions.iter().zip(copies) {
            if let Err(e) = session.push(Arc::clone(&copy)) {
                log::warn!(
                    "[{}] failed to push message on {}: {}",
                    session.id(),
                    copy.topic(),
                    e
                );
                copy.done();
            }
        }
        sessions.len()
    }

    /// Number of bound filters.
    pub fn len(&self) -> usize {
        self.bindings.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.read().is_empty()
    }

    /// Whether `session_id` is bound to exactly `filter`.
    pub fn is_bound(&self, filter: &str, session_id: &str) -> bool {
        self.bindings
            .read()
            .get(filter)
            .is_some_and(|sessions| sessions.contains_key(session_id))
    }
}

impl Exchange for MemoryExchange {
    fn bind(&self, filter: &str, session: Arc<Session>) {
        self.bindings
            .write()
            .entry(filter.to_string())
            .or_default()
            .insert(session.id().to_string(), session);
    }

    fn unbind(&self, filter: &str, session: &Session) {
        let mut bindings = self.bindings.write();
        let Some(sessions) = bindings.get_mut(filter) else {
            return;
        };

        // A replaced session must not unbind its successor under the same id.
        if sessions
            .get(session.id())
            .is_some_and(|bound| std::ptr::eq(Arc::as_ptr(bound), session))
        {
            sessions.remove(session.id());
            if sessions.is_empty() {
                bindings.remove(filter);
            }
        }
    }
}
