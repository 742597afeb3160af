//! Application state wiring the store, service and dispatcher together.
//!
//! `PollService` and `Dispatcher` are generic over the storage ports;
//! AppState pins them to the SQLite store.

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use quickpoll_core::dispatch::Dispatcher;
use quickpoll_core::service::poll::PollService;
use quickpoll_infra::config::database_url;
use quickpoll_infra::sqlite::poll::SqlitePollStore;
use quickpoll_infra::sqlite::pool::DatabasePool;
use quickpoll_types::config::QuickpollConfig;

/// Concrete type aliases for the service generics pinned to infra implementations.
pub type ConcretePollService = PollService<SqlitePollStore, SqlitePollStore>;

pub type ConcreteDispatcher = Dispatcher<SqlitePollStore, SqlitePollStore>;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub poll_service: Arc<ConcretePollService>,
    pub dispatcher: ConcreteDispatcher,
}

impl AppState {
    /// Connect to the database and wire services.
    pub async fn init(data_dir: &Path, config: &QuickpollConfig) -> anyhow::Result<Self> {
        tokio::fs::create_dir_all(data_dir)
            .await
            .with_context(|| format!("Failed to create data directory {}", data_dir.display()))?;

        let db_url = database_url(config, data_dir);
        let db_pool = DatabasePool::with_config(&db_url, config)
            .await
            .with_context(|| format!("Failed to open database at {db_url}"))?;

        let store = SqlitePollStore::new(db_pool);
        let poll_service = Arc::new(PollService::new(store.clone(), store));
        let dispatcher = Dispatcher::new(Arc::clone(&poll_service));

        tracing::debug!(data_dir = %data_dir.display(), "application state ready");
        Ok(Self {
            poll_service,
            dispatcher,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quickpoll_types::poll::UserId;

    #[tokio::test]
    async fn test_init_creates_database_in_data_dir() {
        let dir = tempfile::tempdir().unwrap();
        let data_dir = dir.path().join("nested");

        let state = AppState::init(&data_dir, &QuickpollConfig::default())
            .await
            .unwrap();
        let poll = state
            .poll_service
            .create_poll(&UserId::from("u1"), "Works?")
            .await
            .unwrap();

        assert!(data_dir.join("quickpoll.db").exists());
        assert_eq!(state.poll_service.get_poll(&poll.id).await.unwrap(), poll);
    }
}
