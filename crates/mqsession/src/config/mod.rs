//! Configuration for the session core.
//!
//! Values are layered, lowest priority first:
//!
//! 1. built-in defaults (`DEFAULT_*` constants)
//! 2. an optional TOML file, where `${VAR}` and `${VAR:-fallback}` are
//!    expanded from the environment before parsing
//! 3. `MQSESSION__<SECTION>__<KEY>` environment variables, e.g.
//!    `MQSESSION__SESSION__MAX_INFLIGHT_QOS1_MESSAGES=50` or
//!    `MQSESSION__PERSISTENCE__PATH=/var/lib/mqsession`

mod log;
mod persistence;
mod session;

use std::path::Path;
use std::sync::OnceLock;

use config::{Environment, File, FileFormat};
use regex::{Captures, Regex};
use serde::Deserialize;
use thiserror::Error;

pub use self::log::{LogConfig, DEFAULT_LOG_LEVEL};
pub use persistence::{PersistenceConfig, DEFAULT_PERSISTENCE_PATH};
pub use session::{
    SessionConfig, DEFAULT_MAX_INFLIGHT_QOS0_MESSAGES, DEFAULT_MAX_INFLIGHT_QOS1_MESSAGES,
};

const ENV_PREFIX: &str = "MQSESSION";

fn env_placeholder() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\$\{([^}:]+)(?::-([^}]*))?\}").expect("static regex"))
}

/// Expand `${VAR}` / `${VAR:-fallback}` placeholders. Unset variables
/// without a fallback expand to the empty string.
fn expand_env(content: &str) -> String {
    env_placeholder()
        .replace_all(content, |caps: &Captures| {
            let fallback = caps.get(2).map_or("", |m| m.as_str());
            std::env::var(&caps[1]).unwrap_or_else(|_| fallback.to_owned())
        })
        .into_owned()
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub log: LogConfig,
    /// Per-session queue limits.
    pub session: SessionConfig,
    pub persistence: PersistenceConfig,
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("cannot load config: {0}")]
    Config(#[from] config::ConfigError),

    #[error("cannot parse TOML: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Validation(String),
}

impl Config {
    /// Build the layered configuration. `path` may point at a file that
    /// does not exist, in which case only defaults and the environment apply.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder()
            .set_default("log.level", DEFAULT_LOG_LEVEL)?
            .set_default(
                "session.max_inflight_qos0_messages",
                DEFAULT_MAX_INFLIGHT_QOS0_MESSAGES as i64,
            )?
            .set_default(
                "session.max_inflight_qos1_messages",
                DEFAULT_MAX_INFLIGHT_QOS1_MESSAGES as i64,
            )?
            .set_default("persistence.path", DEFAULT_PERSISTENCE_PATH)?;

        let path = path.as_ref();
        if path.is_file() {
            let raw = std::fs::read_to_string(path)?;
            builder = builder.add_source(File::from_str(&expand_env(&raw), FileFormat::Toml));
        } else {
            ::log::debug!("No config file at {}, using defaults", path.display());
        }

        let config: Config = builder
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML document (with placeholder expansion), no env overrides.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(&expand_env(content))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.log.validate().map_err(ConfigError::Validation)?;
        self.session.validate().map_err(ConfigError::Validation)?;
        if self.persistence.path.as_os_str().is_empty() {
            return Err(ConfigError::Validation("persistence.path is empty".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    #[test]
    fn test_defaults_validate() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_parse_toml() {
        let toml = r#"
[log]
level = "debug"

[session]
max_inflight_qos0_messages = 10
max_inflight_qos1_messages = 5

[persistence]
path = "/tmp/mqsession"
"#;
        let config = Config::parse(toml).unwrap();
        assert_eq!(config.log.level, "debug");
        assert_eq!(config.session.max_inflight_qos0_messages, 10);
        assert_eq!(config.session.max_inflight_qos1_messages, 5);
        assert_eq!(config.persistence.path, PathBuf::from("/tmp/mqsession"));
    }

    #[test]
    fn test_parse_partial_toml() {
        let toml = r#"
[session]
max_inflight_qos1_messages = 64
"#;
        let config = Config::parse(toml).unwrap();
        assert_eq!(config.session.max_inflight_qos1_messages, 64);
        assert_eq!(
            config.session.max_inflight_qos0_messages,
            DEFAULT_MAX_INFLIGHT_QOS0_MESSAGES
        );
        assert_eq!(config.persistence.path, PathBuf::from(DEFAULT_PERSISTENCE_PATH));
    }

    #[test]
    fn test_parse_rejects_invalid_values() {
        let toml = r#"
[session]
max_inflight_qos0_messages = 0
"#;
        assert!(matches!(
            Config::parse(toml),
            Err(ConfigError::Validation(_))
        ));

        let toml = r#"
[log]
level = "loud"
"#;
        assert!(Config::parse(toml).is_err());
    }

    #[test]
    fn test_load_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mqsession.toml");
        std::fs::write(
            &path,
            "[session]\nmax_inflight_qos0_messages = 7\n[persistence]\npath = \"${MQSESSION_TEST_DATA_DIR:-/srv/data}\"\n",
        )
        .unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.session.max_inflight_qos0_messages, 7);
        assert_eq!(
            config.session.max_inflight_qos1_messages,
            DEFAULT_MAX_INFLIGHT_QOS1_MESSAGES
        );
        assert_eq!(config.persistence.path, PathBuf::from("/srv/data"));
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.log.level, DEFAULT_LOG_LEVEL);
        assert_eq!(
            config.session.max_inflight_qos0_messages,
            DEFAULT_MAX_INFLIGHT_QOS0_MESSAGES
        );
    }

    #[test]
    fn test_expand_env() {
        std::env::set_var("MQSESSION_TEST_QOS1", "33");
        let content = r#"
[session]
max_inflight_qos1_messages = ${MQSESSION_TEST_QOS1}
"#;
        let substituted = expand_env(content);
        assert!(substituted.contains("max_inflight_qos1_messages = 33"));
        std::env::remove_var("MQSESSION_TEST_QOS1");
    }

    #[test]
    fn test_expand_env_fallback() {
        std::env::remove_var("MQSESSION_NONEXISTENT_VAR");
        let content = r#"path = "${MQSESSION_NONEXISTENT_VAR:-./data}""#;
        let substituted = expand_env(content);
        assert!(substituted.contains("./data"));
    }
}
