//! Configuration types for quickpoll.
//!
//! `QuickpollConfig` represents the `config.toml` in the data directory that
//! controls where polls are stored and how the store is tuned.

use serde::{Deserialize, Serialize};

/// Top-level configuration.
///
/// Loaded from `~/.quickpoll/config.toml`. All fields have sensible defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuickpollConfig {
    /// SQLite connection URL. Defaults to `quickpoll.db` inside the data directory.
    #[serde(default)]
    pub database_url: Option<String>,

    /// Maximum connections in the read pool.
    #[serde(default = "default_reader_connections")]
    pub reader_connections: u32,

    /// How long a writer waits on a locked database before giving up.
    #[serde(default = "default_busy_timeout_secs")]
    pub busy_timeout_secs: u64,

    /// Bridge tracing spans to OpenTelemetry (stdout exporter).
    #[serde(default)]
    pub enable_otel: bool,
}

fn default_reader_connections() -> u32 {
    8
}

fn default_busy_timeout_secs() -> u64 {
    5
}

impl Default for QuickpollConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            reader_connections: default_reader_connections(),
            busy_timeout_secs: default_busy_timeout_secs(),
            enable_otel: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default_values() {
        let config = QuickpollConfig::default();
        assert!(config.database_url.is_none());
        assert_eq!(config.reader_connections, 8);
        assert_eq!(config.busy_timeout_secs, 5);
        assert!(!config.enable_otel);
    }

    #[test]
    fn test_config_deserialize_with_defaults() {
        let config: QuickpollConfig = toml::from_str("").unwrap();
        assert_eq!(config, QuickpollConfig::default());
    }

    #[test]
    fn test_config_deserialize_with_values() {
        let toml_str = r#"
database_url = "sqlite:///tmp/polls.db?mode=rwc"
reader_connections = 2
busy_timeout_secs = 30
enable_otel = true
"#;
        let config: QuickpollConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(
            config.database_url.as_deref(),
            Some("sqlite:///tmp/polls.db?mode=rwc")
        );
        assert_eq!(config.reader_connections, 2);
        assert_eq!(config.busy_timeout_secs, 30);
        assert!(config.enable_otel);
    }
}
