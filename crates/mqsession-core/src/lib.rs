//! mqsession-core - Core message types and topic matching.
//!
//! This crate provides the protocol-neutral building blocks shared by the
//! session layer: QoS levels, messages and events, the subscription trie
//! and the sequence counter.

pub mod counter;
pub mod error;
pub mod message;
pub mod qos;
pub mod trie;

pub use counter::Counter;
pub use error::{Error, Result};
pub use message::{Completion, Event, Message};
pub use qos::QoS;
pub use trie::{topic_matches_filter, validate_topic_filter, Trie};
