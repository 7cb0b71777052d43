//! Session record storage.
//!
//! One record per non-clean session, keyed by client id, holding the
//! JSON-encoded [`Info`]. Clean sessions never have a record.

use fjall::Keyspace;

use super::PersistenceError;
use crate::session::Info;

/// Key-value access to persisted session records.
#[derive(Clone)]
pub struct SessionStore {
    keyspace: Keyspace,
}

impl SessionStore {
    pub(super) fn new(keyspace: Keyspace) -> Self {
        Self { keyspace }
    }

    /// Upsert the record for `id`.
    pub fn save(&self, id: &str, info: &Info) -> Result<(), PersistenceError> {
        let value =
            serde_json::to_vec(info).map_err(|e| PersistenceError::Serialize(e.to_string()))?;

        self.keyspace
            .insert(id, value)
            .map_err(|e| PersistenceError::Write(e.to_string()))
    }

    /// Delete the record for `id`. Deleting a missing record is a no-op.
    pub fn remove(&self, id: &str) -> Result<(), PersistenceError> {
        self.keyspace
            .remove(id)
            .map_err(|e| PersistenceError::Write(e.to_string()))
    }

    pub fn get(&self, id: &str) -> Result<Option<Info>, PersistenceError> {
        let Some(value) = self
            .keyspace
            .get(id)
            .map_err(|e| PersistenceError::Read(e.to_string()))?
        else {
            return Ok(None);
        };

        serde_json::from_slice(&value)
            .map(Some)
            .map_err(|e| PersistenceError::Deserialize(e.to_string()))
    }

    /// Load every persisted session.
    ///
    /// Records that cannot be decoded are logged and skipped. The record key
    /// is authoritative for the session id.
    pub fn load_all(&self) -> Result<Vec<Info>, PersistenceError> {
        // Collect all keys first (Guard consumes self on key()/value())
        let keys: Vec<_> = self
            .keyspace
            .iter()
            .filter_map(|kv| kv.key().ok())
            .collect();

        let mut sessions = Vec::with_capacity(keys.len());
        for key_bytes in keys {
            let id = String::from_utf8_lossy(&key_bytes).into_owned();

            let mut info = match self.get(&id) {
                Ok(Some(info)) => info,
                Ok(None) => continue, // Key was deleted between iter and get
                Err(e) => {
                    log::warn!("Failed to load session {}: {}", id, e);
                    continue;
                }
            };

            info.id = id;
            info.clean_session = false;
            sessions.push(info);
        }

        log::info!("Loaded {} sessions from disk", sessions.len());
        Ok(sessions)
    }

    /// Number of persisted sessions.
    pub fn len(&self) -> usize {
        self.keyspace.len().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
