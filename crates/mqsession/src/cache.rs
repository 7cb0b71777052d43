//! Outstanding guaranteed deliveries awaiting acknowledgement.

use std::collections::BTreeMap;

use parking_lot::Mutex;
use thiserror::Error;

/// Acknowledgement bookkeeping errors. Never fatal to a session.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AckError {
    #[error("id {id} predates this session (offset {offset})")]
    BeforeOffset { id: u64, offset: u64 },

    #[error("id {0} is not awaiting acknowledgement")]
    Unknown(u64),
}

/// Maps delivery ids to the durable queue record they came from.
///
/// Ids come from the session counter and are strictly greater than the
/// offset the cache was anchored at. The cache locks internally so it can
/// be drained under the session's read lock.
#[derive(Debug)]
pub struct Cache {
    offset: u64,
    entries: Mutex<BTreeMap<u64, u64>>,
}

impl Cache {
    pub fn new(offset: u64) -> Self {
        Self {
            offset,
            entries: Mutex::new(BTreeMap::new()),
        }
    }

    #[inline]
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Record delivery `id` of queue record `seq`.
    pub fn store(&self, id: u64, seq: u64) -> Result<(), AckError> {
        if id <= self.offset {
            return Err(AckError::BeforeOffset {
                id,
                offset: self.offset,
            });
        }
        self.entries.lock().insert(id, seq);
        Ok(())
    }

    /// Remove delivery `id`, returning the queue record it referenced.
    pub fn delete(&self, id: u64) -> Result<u64, AckError> {
        if id <= self.offset {
            return Err(AckError::BeforeOffset {
                id,
                offset: self.offset,
            });
        }
        self.entries.lock().remove(&id).ok_or(AckError::Unknown(id))
    }

    /// Forget every outstanding delivery, returning how many there were.
    pub fn clear(&self) -> usize {
        let mut entries = self.entries.lock();
        let n = entries.len();
        entries.clear();
        n
    }

    /// Outstanding delivery ids, oldest first.
    pub fn ids(&self) -> Vec<u64> {
        self.entries.lock().keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
