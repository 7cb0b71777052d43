//! Logging configuration.
//!
//! The crate only emits through the `log` facade; whoever installs the
//! logger reads the level from here.

use ::log::LevelFilter;
use serde::Deserialize;

pub const DEFAULT_LOG_LEVEL: &str = "info";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// One of off, error, warn, info, debug, trace (case-insensitive).
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: DEFAULT_LOG_LEVEL.to_string(),
        }
    }
}

impl LogConfig {
    /// The configured level as a `log` filter.
    pub fn level_filter(&self) -> Result<LevelFilter, String> {
        self.level
            .parse()
            .map_err(|_| format!("unknown log level '{}'", self.level))
    }

    pub fn validate(&self) -> Result<(), String> {
        self.level_filter().map(|_| ())
    }
}
