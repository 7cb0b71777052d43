//! Client sessions.
//!
//! A [`Session`] is one client's durable state across connections: its
//! subscriptions, its will message, a best-effort queue, a durable queue and
//! the ack cache for guaranteed deliveries in flight.
//!
//! # Locking
//!
//! One reader/writer lock guards [`Info`] and the subscription trie.
//! `will`, `match_qos`, `acknowledge` and `next_qos1` take it for read;
//! everything that changes subscriptions, the will or queue routing takes it
//! for write. Subscription changes update the trie, the exchange and `Info`
//! inside one critical section, so the three never drift apart.
//!
//! `requeue_inflight` also takes the write lock: `next_qos1` pops and records
//! the ack id under the read lock, and a requeue must not land in between.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use mqsession_core::{validate_topic_filter, Counter, Event, Message, QoS, Trie};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::auth::{Action, Authorize};
use crate::cache::Cache;
use crate::error::Result;
use crate::exchange::Exchange;
use crate::manager::Manager;
use crate::persistence::SessionStore;
use crate::queue::{Delivery, PersistentQueue, Queue, QueueError, TemporaryQueue};

/// Persisted identity of a session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Info {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    #[serde(rename = "will", default, skip_serializing_if = "Option::is_none")]
    pub will: Option<Message>,
    #[serde(rename = "subs", default, skip_serializing_if = "HashMap::is_empty")]
    pub subscriptions: HashMap<String, QoS>,
    /// Not persisted: a clean session has no durable record at all.
    #[serde(skip)]
    pub clean_session: bool,
}

impl Info {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    pub fn with_will(mut self, will: Message) -> Self {
        self.will = Some(will);
        self
    }

    pub fn with_clean_session(mut self, clean_session: bool) -> Self {
        self.clean_session = clean_session;
        self
    }
}

impl fmt::Display for Info {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let json = serde_json::to_string(self).map_err(|_| fmt::Error)?;
        f.write_str(&json)
    }
}

/// A topic filter and the QoS requested for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    pub topic: String,
    pub qos: QoS,
}

impl Subscription {
    pub fn new(topic: impl Into<String>, qos: QoS) -> Self {
        Self {
            topic: topic.into(),
            qos,
        }
    }
}

struct State {
    info: Info,
    subs: Trie,
}

/// Session of a client.
pub struct Session {
    id: String,
    state: RwLock<State>,
    /// Best-effort queue.
    qos0: Box<dyn Queue>,
    /// Guaranteed-delivery queue.
    qos1: Box<dyn Queue>,
    cnt: Counter,
    cache: Cache,
    store: SessionStore,
    exchange: Arc<dyn Exchange>,
}

impl Session {
    /// Build a session and persist its record.
    ///
    /// Subscriptions already present in `info` are recorded but not yet
    /// registered; see [`Session::restore_subscriptions`].
    pub(crate) fn new(info: Info, manager: &Manager) -> Result<Arc<Self>> {
        let config = manager.config();
        let id = info.id.clone();

        let bucket = manager.store().bucket(&id).map_err(|e| {
            log::error!("[{}] failed to create queue bucket: {}", id, e);
            e
        })?;
        let qos1 = PersistentQueue::open(bucket, config.session.max_inflight_qos1_messages)
            .map_err(|e| {
                log::error!("[{}] failed to open qos1 queue: {}", id, e);
                e
            })?;
        let qos0 = TemporaryQueue::new(id.clone(), config.session.max_inflight_qos0_messages);

        let cnt = Counter::new();
        let cache = Cache::new(cnt.next_id());

        let session = Self {
            id,
            state: RwLock::new(State {
                info,
                subs: Trie::new(),
            }),
            qos0: Box::new(qos0),
            qos1: Box::new(qos1),
            cnt,
            cache,
            store: manager.session_store(),
            exchange: manager.exchange(),
        };

        log::debug!(
            "[{}] session created, ack ids start after {}",
            session.id,
            session.cache.offset()
        );
        session.persist(&session.state.read().info);
        Ok(Arc::new(session))
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Snapshot of the session's info.
    pub fn info(&self) -> Info {
        self.state.read().info.clone()
    }

    pub fn is_clean(&self) -> bool {
        self.state.read().info.clean_session
    }

    /// Close both queues. Clean sessions discard their durable contents.
    pub fn close(&self) {
        log::info!("[{}] session is closing", self.id);

        let clean = self.is_clean();
        self.qos0.close(clean);
        self.qos1.close(clean);

        log::info!("[{}] session has closed", self.id);
    }

    /// Replace the will message and clean-session flag.
    pub fn update(&self, info: Info) {
        let mut state = self.state.write();
        state.info.will = info.will;
        state.info.clean_session = info.clean_session;

        self.persist(&state.info);
    }

    /// Route an inbound event to exactly one queue, or drop it.
    pub fn push(&self, event: Arc<Event>) -> std::result::Result<(), QueueError> {
        let state = self.state.write();

        // Best-effort traffic never consults subscriptions.
        if !event.qos().is_guaranteed() {
            return self.qos0.push(event);
        }

        // MQTT-3.3.5-1: deliver at the maximum QoS of all matching subscriptions
        match state.subs.max_qos(event.topic()) {
            None => {
                log::warn!(
                    "[{}] message ignored since no subscription matched: {}",
                    self.id,
                    event
                );
                event.done();
                Ok(())
            }
            Some(qos) if qos.is_guaranteed() => self.qos1.push(event),
            Some(_) => self.qos0.push(event),
        }
    }

    /// Add subscriptions, then re-check every held subscription against
    /// `authorize`.
    ///
    /// Filters that fail validation are skipped. Topics the predicate
    /// rejects are removed from the trie, the exchange and the session
    /// info. An empty batch is a no-op and does not re-check anything.
    pub fn subscribe(self: &Arc<Self>, subs: &[Subscription], authorize: Option<Authorize<'_>>) {
        if subs.is_empty() {
            return;
        }

        let mut guard = self.state.write();
        let State { info, subs: trie } = &mut *guard;

        for sub in subs {
            if let Err(e) = validate_topic_filter(&sub.topic) {
                log::warn!("[{}] subscription rejected: {}", self.id, e);
                continue;
            }
            info.subscriptions.insert(sub.topic.clone(), sub.qos);
        }

        for (topic, qos) in &info.subscriptions {
            trie.set(topic, *qos);
            self.exchange.bind(topic, Arc::clone(self));
        }

        if let Some(authorize) = authorize {
            let denied: Vec<String> = info
                .subscriptions
                .keys()
                .filter(|topic| !authorize(Action::Subscribe, topic.as_str()))
                .cloned()
                .collect();

            for topic in denied {
                log::warn!("[{}] topic not permitted to subscribe: {}", self.id, topic);
                trie.empty(&topic);
                self.exchange.unbind(&topic, self);
                info.subscriptions.remove(&topic);
            }
        }

        self.persist(info);
    }

    /// Remove subscriptions. Unknown topics are ignored.
    pub fn unsubscribe<S: AsRef<str>>(&self, topics: &[S]) {
        if topics.is_empty() {
            return;
        }

        let mut guard = self.state.write();
        let State { info, subs: trie } = &mut *guard;

        for topic in topics {
            let topic = topic.as_ref();
            trie.empty(topic);
            self.exchange.unbind(topic, self);
            info.subscriptions.remove(topic);
        }

        self.persist(info);
    }

    /// Register subscriptions loaded from persistence with the trie and
    /// the exchange.
    pub(crate) fn restore_subscriptions(self: &Arc<Self>) {
        let mut guard = self.state.write();
        let State { info, subs: trie } = &mut *guard;

        for (topic, qos) in &info.subscriptions {
            trie.set(topic, *qos);
            self.exchange.bind(topic, Arc::clone(self));
        }
    }

    /// Drop every exchange binding, leaving subscriptions recorded.
    pub(crate) fn unbind_all(&self) {
        let state = self.state.read();
        for topic in state.info.subscriptions.keys() {
            self.exchange.unbind(topic, self);
        }
    }

    pub fn will(&self) -> Option<Message> {
        self.state.read().info.will.clone()
    }

    pub fn clean_will(&self) {
        let mut state = self.state.write();
        state.info.will = None;
        self.persist(&state.info);
    }

    /// Maximum QoS among subscriptions matching `topic`, `None` if none match.
    pub fn match_qos(&self, topic: &str) -> Option<QoS> {
        self.state.read().subs.max_qos(topic)
    }

    /// Acknowledge guaranteed delivery `id`.
    ///
    /// Unknown ids are logged and otherwise ignored.
    pub fn acknowledge(&self, id: u64) {
        let _state = self.state.read();

        match self.cache.delete(id) {
            Ok(seq) => {
                if let Err(e) = self.qos1.ack(seq) {
                    log::error!(
                        "[{}] failed to release acknowledged message {}: {}",
                        self.id,
                        id,
                        e
                    );
                }
            }
            Err(e) => log::warn!("[{}] failed to acknowledge: {}", self.id, e),
        }
    }

    /// Next best-effort message to send to the client.
    pub fn next_qos0(&self) -> std::result::Result<Option<Delivery>, QueueError> {
        self.qos0.pop()
    }

    /// Next guaranteed message to send to the client, tagged with the id the
    /// client must acknowledge.
    pub fn next_qos1(&self) -> std::result::Result<Option<Delivery>, QueueError> {
        let _state = self.state.read();

        let Some(queued) = self.qos1.pop()? else {
            return Ok(None);
        };

        let id = self.cnt.next_id();
        if let Err(e) = self.cache.store(id, queued.id) {
            // Counter ids always exceed the cache offset.
            log::error!("[{}] failed to track delivery: {}", self.id, e);
        }
        Ok(Some(Delivery {
            id,
            message: queued.message,
        }))
    }

    /// Number of guaranteed deliveries awaiting acknowledgement.
    pub fn inflight(&self) -> usize {
        self.cache.len()
    }

    /// Forget in-flight deliveries and make them available for redelivery,
    /// e.g. after the client's connection dropped.
    pub fn requeue_inflight(&self) {
        let _state = self.state.write();
        let n = self.cache.clear();
        self.qos1.requeue();
        if n > 0 {
            log::debug!("[{}] requeued {} unacknowledged messages", self.id, n);
        }
    }

    /// Write the session record, or delete it for a clean session.
    ///
    /// Failures are logged; the in-memory state stays authoritative.
    fn persist(&self, info: &Info) {
        if info.clean_session {
            if let Err(e) = self.store.remove(&self.id) {
                log::error!("[{}] failed to delete session: {}", self.id, e);
            }
            return;
        }

        if let Err(e) = self.store.save(&self.id, info) {
            log::error!("[{}] failed to persist session: {}", self.id, e);
        }
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("inflight", &self.cache.len())
            .finish_non_exhaustive()
    }
}
