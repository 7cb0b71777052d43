//! Session configuration.

use serde::Deserialize;

/// Default capacity of the best-effort (QoS 0) queue per session.
pub const DEFAULT_MAX_INFLIGHT_QOS0_MESSAGES: usize = 100;

/// Default number of unacknowledged QoS 1 deliveries per session.
pub const DEFAULT_MAX_INFLIGHT_QOS1_MESSAGES: usize = 20;

/// Session configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Capacity of the ephemeral QoS 0 queue. Messages beyond it are dropped.
    #[serde(default = "default_max_inflight_qos0_messages")]
    pub max_inflight_qos0_messages: usize,

    /// Maximum QoS 1 messages handed out and not yet acknowledged.
    /// Further messages stay in the durable queue until acks arrive.
    #[serde(default = "default_max_inflight_qos1_messages")]
    pub max_inflight_qos1_messages: usize,
}

fn default_max_inflight_qos0_messages() -> usize {
    DEFAULT_MAX_INFLIGHT_QOS0_MESSAGES
}
fn default_max_inflight_qos1_messages() -> usize {
    DEFAULT_MAX_INFLIGHT_QOS1_MESSAGES
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_inflight_qos0_messages: DEFAULT_MAX_INFLIGHT_QOS0_MESSAGES,
            max_inflight_qos1_messages: DEFAULT_MAX_INFLIGHT_QOS1_MESSAGES,
        }
    }
}

impl SessionConfig {
    /// Validate the session configuration.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_inflight_qos0_messages == 0 {
            return Err("max_inflight_qos0_messages must be at least 1".into());
        }
        if self.max_inflight_qos1_messages == 0 {
            return Err("max_inflight_qos1_messages must be at least 1".into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(SessionConfig::default().validate().is_ok());
    }

    #[test]
    fn test_zero_inflight_rejected() {
        let config = SessionConfig {
            max_inflight_qos1_messages: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
