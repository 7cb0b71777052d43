//! Persistence layer for session records and durable queues.
//!
//! Everything lives in one fjall database with two keyspaces:
//!
//! ```text
//! session   <client id>                 -> JSON session Info
//! queue     <client id> 0x00 <u64 BE>   -> bincode Message
//! ```
//!
//! Each session's durable queue is a [`Bucket`]: a key prefix inside the
//! `queue` keyspace that no other session shares. Big-endian sequence
//! numbers keep records of one bucket in push order.

mod session;

pub use session::SessionStore;

use std::path::Path;

use fjall::{Database, Keyspace, KeyspaceCreateOptions, PersistMode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

const SESSION_KEYSPACE: &str = "session";
const QUEUE_KEYSPACE: &str = "queue";

/// Errors that can occur during persistence operations.
#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("failed to open persistence database: {0}")]
    Open(String),

    #[error("failed to open keyspace: {0}")]
    Keyspace(String),

    #[error("invalid bucket name '{0}'")]
    InvalidBucket(String),

    #[error("serialization error: {0}")]
    Serialize(String),

    #[error("deserialization error: {0}")]
    Deserialize(String),

    #[error("write error: {0}")]
    Write(String),

    #[error("read error: {0}")]
    Read(String),

    #[error("sync error: {0}")]
    Sync(String),
}

/// Handle to the on-disk database.
#[derive(Clone)]
pub struct Store {
    db: Database,
    sessions: Keyspace,
    queues: Keyspace,
}

impl Store {
    /// Open or create a database at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, PersistenceError> {
        let db = Database::builder(path)
            .open()
            .map_err(|e| PersistenceError::Open(e.to_string()))?;

        let sessions = db
            .keyspace(SESSION_KEYSPACE, KeyspaceCreateOptions::default)
            .map_err(|e| PersistenceError::Keyspace(e.to_string()))?;
        let queues = db
            .keyspace(QUEUE_KEYSPACE, KeyspaceCreateOptions::default)
            .map_err(|e| PersistenceError::Keyspace(e.to_string()))?;

        log::info!("Persistence layer opened successfully");
        Ok(Self {
            db,
            sessions,
            queues,
        })
    }

    /// Key-value access to persisted session records.
    pub fn sessions(&self) -> SessionStore {
        SessionStore::new(self.sessions.clone())
    }

    /// Open the durable queue bucket owned by `name`.
    pub fn bucket(&self, name: &str) -> Result<Bucket, PersistenceError> {
        if name.is_empty() || name.contains('\0') {
            return Err(PersistenceError::InvalidBucket(name.to_string()));
        }

        let mut prefix = Vec::with_capacity(name.len() + 1);
        prefix.extend_from_slice(name.as_bytes());
        prefix.push(0);

        Ok(Bucket {
            db: self.db.clone(),
            keyspace: self.queues.clone(),
            name: name.to_string(),
            prefix,
        })
    }

    /// Flush all pending writes to disk.
    pub fn sync(&self) -> Result<(), PersistenceError> {
        sync(&self.db)
    }
}

fn sync(db: &Database) -> Result<(), PersistenceError> {
    db.persist(PersistMode::SyncAll)
        .map_err(|e| PersistenceError::Sync(e.to_string()))
}

/// A sequence-keyed record store exclusively owned by one session.
#[derive(Clone)]
pub struct Bucket {
    db: Database,
    keyspace: Keyspace,
    name: String,
    prefix: Vec<u8>,
}

impl Bucket {
    pub fn name(&self) -> &str {
        &self.name
    }

    fn key(&self, seq: u64) -> Vec<u8> {
        let mut key = Vec::with_capacity(self.prefix.len() + 8);
        key.extend_from_slice(&self.prefix);
        key.extend_from_slice(&seq.to_be_bytes());
        key
    }

    /// Store `value` under `seq`, replacing any previous record.
    pub fn put<T: Serialize>(&self, seq: u64, value: &T) -> Result<(), PersistenceError> {
        let value =
            bincode::serialize(value).map_err(|e| PersistenceError::Serialize(e.to_string()))?;

        self.keyspace
            .insert(self.key(seq), value)
            .map_err(|e| PersistenceError::Write(e.to_string()))
    }

    pub fn get<T: DeserializeOwned>(&self, seq: u64) -> Result<Option<T>, PersistenceError> {
        let Some(value) = self
            .keyspace
            .get(self.key(seq))
            .map_err(|e| PersistenceError::Read(e.to_string()))?
        else {
            return Ok(None);
        };

        bincode::deserialize(&value)
            .map(Some)
            .map_err(|e| PersistenceError::Deserialize(e.to_string()))
    }

    /// Remove the record at `seq`. Removing a missing record is a no-op.
    pub fn delete(&self, seq: u64) -> Result<(), PersistenceError> {
        self.keyspace
            .remove(self.key(seq))
            .map_err(|e| PersistenceError::Write(e.to_string()))
    }

    /// Sequence numbers of all stored records, ascending.
    pub fn sequences(&self) -> Result<Vec<u64>, PersistenceError> {
        let mut seqs = Vec::new();
        for kv in self.keyspace.prefix(&self.prefix) {
            let key = kv.key().map_err(|e| PersistenceError::Read(e.to_string()))?;
            let Ok(raw) = <[u8; 8]>::try_from(&key[self.prefix.len()..]) else {
                log::warn!("Skipping malformed queue key in bucket {}", self.name);
                continue;
            };
            seqs.push(u64::from_be_bytes(raw));
        }
        seqs.sort_unstable();
        Ok(seqs)
    }

    /// Delete every record in the bucket. Returns the number removed.
    pub fn clear(&self) -> Result<usize, PersistenceError> {
        let seqs = self.sequences()?;
        for seq in &seqs {
            self.delete(*seq)?;
        }
        Ok(seqs.len())
    }

    /// Flush the underlying database to disk.
    pub fn sync(&self) -> Result<(), PersistenceError> {
        sync(&self.db)
    }
}
