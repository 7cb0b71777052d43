//! Where session records and durable queues live on disk.

use std::path::PathBuf;

use serde::Deserialize;

pub const DEFAULT_PERSISTENCE_PATH: &str = "./data";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PersistenceConfig {
    /// fjall database directory, created on first open.
    pub path: PathBuf,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            path: DEFAULT_PERSISTENCE_PATH.into(),
        }
    }
}
