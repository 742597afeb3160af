//! Database pool with split reader/writer connections in WAL mode.
//!
//! SQLite allows only one writer at a time. `DatabasePool` keeps a
//! multi-connection reader pool for concurrent reads and a single-connection
//! writer pool, so every read-check-write transaction on a poll runs alone.

use std::str::FromStr;
use std::time::Duration;

use quickpoll_types::config::QuickpollConfig;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};

/// Split read/write pool for SQLite with WAL mode.
///
/// - `reader`: multi-connection pool for concurrent SELECT queries.
/// - `writer`: single-connection pool for serialized transactions.
#[derive(Clone)]
pub struct DatabasePool {
    pub reader: SqlitePool,
    pub writer: SqlitePool,
}

impl DatabasePool {
    /// Open a pool with default tuning. Runs migrations on the writer.
    pub async fn new(database_url: &str) -> Result<Self, sqlx::Error> {
        Self::with_config(database_url, &QuickpollConfig::default()).await
    }

    /// Open a pool tuned by `config` (reader pool size and busy timeout).
    pub async fn with_config(
        database_url: &str,
        config: &QuickpollConfig,
    ) -> Result<Self, sqlx::Error> {
        let base_opts = SqliteConnectOptions::from_str(database_url)?
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(config.busy_timeout_secs))
            .create_if_missing(true);

        let read_opts = base_opts.clone().read_only(true);
        let write_opts = base_opts;

        let writer = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(write_opts)
            .await?;

        // Schema must exist before the read-only connections open
        sqlx::migrate!("../../migrations").run(&writer).await?;

        let reader = SqlitePoolOptions::new()
            .max_connections(config.reader_connections.max(1))
            .connect_with(read_opts)
            .await?;

        tracing::debug!(
            reader_connections = config.reader_connections,
            busy_timeout_secs = config.busy_timeout_secs,
            "database pool ready"
        );
        Ok(Self { reader, writer })
    }
}
