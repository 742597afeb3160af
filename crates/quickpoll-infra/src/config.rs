//! Configuration loading for quickpoll.
//!
//! Reads `config.toml` from the data directory (`~/.quickpoll/` unless
//! `QUICKPOLL_DATA_DIR` says otherwise) and deserializes it into
//! [`QuickpollConfig`]. Falls back to defaults when the file is missing or
//! malformed.

use std::path::{Path, PathBuf};

use quickpoll_types::config::QuickpollConfig;

/// Environment variable overriding the data directory.
pub const DATA_DIR_ENV: &str = "QUICKPOLL_DATA_DIR";

const CONFIG_FILE: &str = "config.toml";
const DATABASE_FILE: &str = "quickpoll.db";

/// Resolve the data directory.
///
/// Priority:
/// 1. `QUICKPOLL_DATA_DIR` environment variable
/// 2. `~/.quickpoll`
/// 3. `.quickpoll` in the current directory
pub fn resolve_data_dir() -> PathBuf {
    data_dir_from(std::env::var(DATA_DIR_ENV).ok())
}

fn data_dir_from(env_value: Option<String>) -> PathBuf {
    if let Some(dir) = env_value.filter(|dir| !dir.is_empty()) {
        return PathBuf::from(dir);
    }
    if let Some(home) = dirs::home_dir() {
        return home.join(".quickpoll");
    }
    PathBuf::from(".quickpoll")
}

/// Load configuration from `{data_dir}/config.toml`.
///
/// - Missing file: returns [`QuickpollConfig::default()`].
/// - Unreadable or unparsable file: logs a warning and returns the default.
pub async fn load_config(data_dir: &Path) -> QuickpollConfig {
    let config_path = data_dir.join(CONFIG_FILE);

    let content = match tokio::fs::read_to_string(&config_path).await {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No config.toml found at {}, using defaults", config_path.display());
            return QuickpollConfig::default();
        }
        Err(err) => {
            tracing::warn!("Failed to read {}: {err}, using defaults", config_path.display());
            return QuickpollConfig::default();
        }
    };

    match toml::from_str::<QuickpollConfig>(&content) {
        Ok(config) => config,
        Err(err) => {
            tracing::warn!(
                "Failed to parse {}: {err}, using defaults",
                config_path.display()
            );
            QuickpollConfig::default()
        }
    }
}

/// The SQLite URL to open: the configured one, or `quickpoll.db` in the
/// data directory.
pub fn database_url(config: &QuickpollConfig, data_dir: &Path) -> String {
    match &config.database_url {
        Some(url) => url.clone(),
        None => format!("sqlite://{}?mode=rwc", data_dir.join(DATABASE_FILE).display()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn load_config_missing_file_returns_default() {
        let tmp = TempDir::new().unwrap();
        let config = load_config(tmp.path()).await;
        assert_eq!(config, QuickpollConfig::default());
    }

    #[tokio::test]
    async fn load_config_valid_toml_returns_parsed() {
        let tmp = TempDir::new().unwrap();
        tokio::fs::write(
            tmp.path().join("config.toml"),
            r#"
database_url = "sqlite:///var/lib/quickpoll/polls.db"
reader_connections = 2
enable_otel = true
"#,
        )
        .await
        .unwrap();

        let config = load_config(tmp.path()).await;
        assert_eq!(
            config.database_url.as_deref(),
            Some("sqlite:///var/lib/quickpoll/polls.db")
        );
        assert_eq!(config.reader_connections, 2);
        assert_eq!(config.busy_timeout_secs, 5);
        assert!(config.enable_otel);
    }

    #[tokio::test]
    async fn load_config_invalid_toml_returns_default() {
        let tmp = TempDir::new().unwrap();
        tokio::fs::write(tmp.path().join("config.toml"), "this is not { valid toml !!!")
            .await
            .unwrap();

        let config = load_config(tmp.path()).await;
        assert_eq!(config, QuickpollConfig::default());
    }

    #[test]
    fn database_url_defaults_into_data_dir() {
        let url = database_url(&QuickpollConfig::default(), Path::new("/tmp/qp"));
        assert_eq!(url, "sqlite:///tmp/qp/quickpoll.db?mode=rwc");
    }

    #[test]
    fn database_url_prefers_configured_value() {
        let config = QuickpollConfig {
            database_url: Some("sqlite::memory:".to_string()),
            ..QuickpollConfig::default()
        };
        assert_eq!(database_url(&config, Path::new("/ignored")), "sqlite::memory:");
    }

    #[test]
    fn data_dir_env_override_wins() {
        assert_eq!(
            data_dir_from(Some("/srv/polls".to_string())),
            PathBuf::from("/srv/polls")
        );
    }

    #[test]
    fn data_dir_falls_back_to_home() {
        let dir = data_dir_from(None);
        assert!(dir.ends_with(".quickpoll"));
        assert_eq!(data_dir_from(Some(String::new())), dir);
    }
}
