//! Monotonic sequence id generation.
//!
//! Every session owns one [`Counter`]. Ids tag guaranteed deliveries and
//! anchor the session's ack cache, so they must never repeat within the
//! lifetime of the counter.

use std::sync::atomic::{AtomicU64, Ordering};

/// Lock-free, monotonically increasing id generator.
#[derive(Debug)]
pub struct Counter {
    next: AtomicU64,
}

impl Default for Counter {
    fn default() -> Self {
        Self::new()
    }
}

impl Counter {
    /// Create a counter whose first id is 1.
    pub fn new() -> Self {
        Self::starting_at(1)
    }

    /// Create a counter whose first id is `first`.
    pub fn starting_at(first: u64) -> Self {
        Self {
            next: AtomicU64::new(first),
        }
    }

    /// Allocate the next id.
    #[inline]
    pub fn next_id(&self) -> u64 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }
}
