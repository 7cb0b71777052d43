//! Error types for mqsession.

use thiserror::Error;

use crate::config::ConfigError;
use crate::persistence::PersistenceError;
use crate::queue::QueueError;

/// Main error type for mqsession.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

pub type Result<T> = std::result::Result<T, Error>;
