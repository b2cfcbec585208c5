//! Application state shared by all handlers

use std::sync::Arc;

use crate::{
    config::Config,
    error::Result,
    presence::ChatHub,
    store::{ChatStore, MemoryChatStore},
};

/// State handed to every axum handler
///
/// Cheap to clone: the hub and the store are reference counted.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub hub: ChatHub,
    pub store: Arc<dyn ChatStore>,
}

impl AppState {
    /// Assemble state from an already built store
    pub fn new(config: Config, store: Arc<dyn ChatStore>) -> Self {
        Self {
            config: Arc::new(config),
            hub: ChatHub::new(),
            store,
        }
    }

    /// State with an in-memory store
    pub fn in_memory(config: Config) -> Self {
        Self::new(config, Arc::new(MemoryChatStore::new()))
    }

    /// Build state from configuration, connecting the database if one is configured
    ///
    /// When the database is unreachable and marked `optional`, the service
    /// starts with in-memory storage instead of failing.
    pub async fn from_config(config: Config) -> Result<Self> {
        let store = build_store(&config).await?;
        tracing::info!(backend = store.backend(), "Chat store ready");
        Ok(Self::new(config, store))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}

#[cfg(feature = "database")]
async fn build_store(config: &Config) -> Result<Arc<dyn ChatStore>> {
    use crate::store::PgChatStore;

    let Some(db) = config.database.as_ref() else {
        return Ok(Arc::new(MemoryChatStore::new()));
    };

    let connected = async {
        let pool = crate::database::create_pool(db).await?;
        let store = PgChatStore::new(pool);
        store.migrate().await?;
        Ok::<_, crate::error::Error>(store)
    }
    .await;

    match connected {
        Ok(store) => Ok(Arc::new(store)),
        Err(e) if db.optional => {
            tracing::warn!("Database unavailable, falling back to in-memory storage: {}", e);
            Ok(Arc::new(MemoryChatStore::new()))
        }
        Err(e) => Err(e),
    }
}

#[cfg(not(feature = "database"))]
async fn build_store(config: &Config) -> Result<Arc<dyn ChatStore>> {
    if config.database.is_some() {
        tracing::warn!("Database configured but the `database` feature is disabled; using in-memory storage");
    }
    Ok(Arc::new(MemoryChatStore::new()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_from_config_without_database_uses_memory() {
        let state = AppState::from_config(Config::default()).await.unwrap();
        assert_eq!(state.store.backend(), "memory");
        assert_eq!(state.config().service.port, 5004);
    }

    #[cfg(feature = "database")]
    #[tokio::test]
    async fn test_optional_database_falls_back_to_memory() {
        let mut config = Config::default();
        config.database = Some(crate::config::DatabaseConfig {
            url: "not-a-database-url".to_string(),
            max_connections: 1,
            min_connections: 0,
            connection_timeout_secs: 1,
            max_retries: 0,
            retry_delay_secs: 0,
            optional: true,
        });

        let state = AppState::from_config(config).await.unwrap();
        assert_eq!(state.store.backend(), "memory");
    }

    #[tokio::test]
    async fn test_clones_share_the_hub() {
        let state = AppState::in_memory(Config::default());
        let clone = state.clone();
        let (tx, _rx) = tokio::sync::mpsc::channel(1);
        state.hub.register(tx).await;
        assert_eq!(clone.hub.stats().await.connections, 1);
    }
}
