//! Session manager.
//!
//! Owns every live [`Session`], the persistence store and the exchange
//! sessions register with. On open it reloads all non-clean sessions from
//! disk so they keep receiving guaranteed messages while their clients are
//! away.

use std::sync::Arc;

use ahash::AHashMap;
use parking_lot::RwLock;

use crate::config::Config;
use crate::error::Result;
use crate::exchange::Exchange;
use crate::persistence::{SessionStore, Store};
use crate::session::{Info, Session};

/// Owner of all sessions.
pub struct Manager {
    config: Arc<Config>,
    store: Store,
    sessions_bucket: SessionStore,
    exchange: Arc<dyn Exchange>,
    sessions: RwLock<AHashMap<String, Arc<Session>>>,
}

impl Manager {
    /// Open the store at `config.persistence.path` and restore persisted
    /// sessions.
    pub fn open(config: Config, exchange: Arc<dyn Exchange>) -> Result<Self> {
        config.validate()?;
        let store = Store::open(&config.persistence.path)?;
        let sessions_bucket = store.sessions();

        let manager = Self {
            config: Arc::new(config),
            store,
            sessions_bucket,
            exchange,
            sessions: RwLock::new(AHashMap::new()),
        };
        manager.restore()?;
        Ok(manager)
    }

    fn restore(&self) -> Result<()> {
        let infos = self.sessions_bucket.load_all()?;
        let mut sessions = self.sessions.write();

        for info in infos {
            let id = info.id.clone();
            let session = Session::new(info, self)?;
            session.restore_subscriptions();
            sessions.insert(id, session);
        }

        if !sessions.is_empty() {
            log::info!("Restored {} persistent sessions", sessions.len());
        }
        Ok(())
    }

    pub(crate) fn config(&self) -> &Config {
        &self.config
    }

    pub(crate) fn store(&self) -> &Store {
        &self.store
    }

    pub(crate) fn session_store(&self) -> SessionStore {
        self.sessions_bucket.clone()
    }

    pub(crate) fn exchange(&self) -> Arc<dyn Exchange> {
        Arc::clone(&self.exchange)
    }

    /// Attach a connecting client to its session.
    ///
    /// A non-clean connect resumes the existing session, taking the new will
    /// and clean flag. A clean connect discards any previous state and starts
    /// a fresh session.
    pub fn connect(&self, info: Info) -> Result<Arc<Session>> {
        let mut sessions = self.sessions.write();

        if let Some(existing) = sessions.get(&info.id) {
            if !info.clean_session {
                log::debug!("[{}] resuming session", info.id);
                existing.update(info);
                return Ok(Arc::clone(existing));
            }

            // Clean start: switch the old session to clean so its record and
            // queue contents are deleted, then replace it.
            log::debug!("[{}] discarding previous session", info.id);
            let old = Arc::clone(existing);
            old.update(Info {
                will: None,
                ..info.clone()
            });
            old.unbind_all();
            old.close();
            sessions.remove(&info.id);
        }

        let id = info.id.clone();
        let session = Session::new(info, self)?;
        sessions.insert(id, Arc::clone(&session));
        Ok(session)
    }

    /// Detach a client from its session.
    ///
    /// Clean sessions are closed and forgotten. Non-clean sessions stay
    /// registered; their unacknowledged deliveries are requeued for the next
    /// connection.
    ///
    /// Runs under the registry write lock, like `connect`, so the session
    /// checked is the session removed.
    pub fn disconnect(&self, id: &str) {
        let mut sessions = self.sessions.write();
        let Some(session) = sessions.get(id) else {
            return;
        };

        if !session.is_clean() {
            session.requeue_inflight();
            return;
        }

        if let Some(session) = sessions.remove(id) {
            log::debug!("[{}] dropping clean session", id);
            session.unbind_all();
            session.close();
        }
    }

    pub fn get(&self, id: &str) -> Option<Arc<Session>> {
        self.sessions.read().get(id).cloned()
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }

    /// Close every session and flush the store.
    pub fn close(&self) {
        let sessions: Vec<_> = self.sessions.write().drain().map(|(_, s)| s).collect();
        for session in &sessions {
            session.unbind_all();
            session.close();
        }

        if let Err(e) = self.store.sync() {
            log::error!("Failed to sync persistence on close: {}", e);
        }
        log::info!("Session manager closed ({} sessions)", sessions.len());
    }
}
