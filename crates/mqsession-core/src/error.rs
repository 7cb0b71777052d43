//! Error types for mqsession-core.

use thiserror::Error;

/// Errors raised while interpreting QoS levels and topic filters.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("Invalid QoS: {0}")]
    InvalidQoS(u8),

    #[error("Invalid topic filter '{filter}': {reason}")]
    InvalidTopicFilter { filter: String, reason: &'static str },
}

pub type Result<T> = std::result::Result<T, Error>;
