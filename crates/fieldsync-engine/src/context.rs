//! Engine configuration and the per-account context object.
//!
//! Everything scoped to one account (database pool, queue, catalog, state
//! table, gateway) hangs off an [`EngineContext`] owned by the engine
//! instance and passed explicitly to every operation. Switching accounts
//! swaps the whole context.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use fieldsync_core::{
    defaults, CatalogStore, Namespace, QueueStore, RemoteDrive, Result, StateStore,
};
use fieldsync_remote::ObjectGateway;
use fieldsync_store::{
    open_database, PoolConfig, SqliteCatalogStore, SqlitePool, SqliteQueueStore, SqliteStateStore,
};

/// Configuration for the sync engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Directory holding the per-account database files.
    pub data_dir: PathBuf,
    /// Base name of the database files (suffixed per account).
    pub database_basename: String,
    /// Name of the root folder on the remote store.
    pub root_folder: String,
    /// Coalescing window for drain triggers.
    pub flush_debounce: Duration,
    /// Coalescing window for manifest pushes.
    pub push_debounce: Duration,
    /// Maximum jobs fetched per drain cycle.
    pub queue_page_limit: i64,
    /// Per-attempt backoff unit for queued jobs.
    pub backoff_unit: Duration,
    /// Cap on the per-job backoff delay.
    pub backoff_cap: Duration,
    /// Random jitter added to the backoff delay.
    pub backoff_jitter_ms: u64,
    /// Poll interval for detecting account switches.
    pub identity_poll_interval: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            database_basename: defaults::DB_BASENAME.to_string(),
            root_folder: defaults::ROOT_FOLDER_NAME.to_string(),
            flush_debounce: Duration::from_millis(defaults::FLUSH_DEBOUNCE_MS),
            push_debounce: Duration::from_millis(defaults::PUSH_DEBOUNCE_MS),
            queue_page_limit: defaults::QUEUE_PAGE_LIMIT,
            backoff_unit: Duration::from_millis(defaults::BACKOFF_UNIT_MS),
            backoff_cap: Duration::from_millis(defaults::BACKOFF_MAX_MS),
            backoff_jitter_ms: defaults::BACKOFF_JITTER_MS,
            identity_poll_interval: Duration::from_millis(defaults::IDENTITY_POLL_MS),
        }
    }
}

impl EngineConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `FIELDSYNC_DATA_DIR` | `data` | Directory for account databases |
    /// | `FIELDSYNC_ROOT_FOLDER` | `FieldSync` | Remote root folder name |
    /// | `FIELDSYNC_FLUSH_DEBOUNCE_MS` | `1200` | Drain trigger coalescing |
    /// | `FIELDSYNC_PUSH_DEBOUNCE_MS` | `750` | Manifest push coalescing |
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(dir) = std::env::var("FIELDSYNC_DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
        }
        if let Ok(folder) = std::env::var("FIELDSYNC_ROOT_FOLDER") {
            config.root_folder = folder;
        }
        if let Some(ms) = std::env::var("FIELDSYNC_FLUSH_DEBOUNCE_MS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
        {
            config.flush_debounce = Duration::from_millis(ms);
        }
        if let Some(ms) = std::env::var("FIELDSYNC_PUSH_DEBOUNCE_MS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
        {
            config.push_debounce = Duration::from_millis(ms);
        }

        config
    }

    /// Set the data directory.
    pub fn with_data_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.data_dir = dir.as_ref().to_path_buf();
        self
    }

    /// Set the remote root folder name.
    pub fn with_root_folder(mut self, folder: impl Into<String>) -> Self {
        self.root_folder = folder.into();
        self
    }

    /// Set the drain trigger coalescing window.
    pub fn with_flush_debounce(mut self, debounce: Duration) -> Self {
        self.flush_debounce = debounce;
        self
    }

    /// Set the manifest push coalescing window.
    pub fn with_push_debounce(mut self, debounce: Duration) -> Self {
        self.push_debounce = debounce;
        self
    }

    /// Set the queued-job backoff parameters.
    pub fn with_backoff(mut self, unit: Duration, cap: Duration, jitter_ms: u64) -> Self {
        self.backoff_unit = unit;
        self.backoff_cap = cap;
        self.backoff_jitter_ms = jitter_ms;
        self
    }

    /// Set the identity poll interval.
    pub fn with_identity_poll(mut self, interval: Duration) -> Self {
        self.identity_poll_interval = interval;
        self
    }
}

/// Everything scoped to one account: database pool, stores, and gateway.
pub struct EngineContext {
    pub namespace: Namespace,
    pub pool: SqlitePool,
    pub queue: Arc<dyn QueueStore>,
    pub catalog: Arc<dyn CatalogStore>,
    pub state: Arc<dyn StateStore>,
    pub gateway: Arc<ObjectGateway>,
}

impl EngineContext {
    /// Open the account's database and wire up its stores and gateway.
    pub async fn open(
        config: &EngineConfig,
        namespace: Namespace,
        drive: Arc<dyn RemoteDrive>,
    ) -> Result<Arc<Self>> {
        tokio::fs::create_dir_all(&config.data_dir).await?;
        let db_path = config
            .data_dir
            .join(namespace.database_name(&config.database_basename));
        let pool = open_database(&db_path, PoolConfig::default()).await?;

        let queue: Arc<dyn QueueStore> = Arc::new(SqliteQueueStore::new(pool.clone()));
        let catalog: Arc<dyn CatalogStore> = Arc::new(SqliteCatalogStore::new(pool.clone()));
        let state: Arc<dyn StateStore> = Arc::new(SqliteStateStore::new(pool.clone()));
        let gateway = Arc::new(ObjectGateway::new(
            drive,
            catalog.clone(),
            config.root_folder.clone(),
        ));

        info!(
            subsystem = "engine",
            component = "context",
            op = "open",
            account = namespace.account_id(),
            "Account context ready"
        );

        Ok(Arc::new(Self {
            namespace,
            pool,
            queue,
            catalog,
            state,
            gateway,
        }))
    }

    /// Close the database pool. Call before dropping a replaced context.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.database_basename, "fieldsync");
        assert_eq!(config.root_folder, "FieldSync");
        assert_eq!(config.queue_page_limit, 200);
        assert_eq!(config.flush_debounce, Duration::from_millis(1_200));
        assert_eq!(config.push_debounce, Duration::from_millis(750));
    }

    #[test]
    fn test_config_builder_chaining() {
        let config = EngineConfig::default()
            .with_data_dir("/tmp/fs-test")
            .with_root_folder("Reports")
            .with_flush_debounce(Duration::from_millis(10))
            .with_push_debounce(Duration::from_millis(20))
            .with_backoff(Duration::ZERO, Duration::ZERO, 0)
            .with_identity_poll(Duration::from_secs(9));

        assert_eq!(config.data_dir, PathBuf::from("/tmp/fs-test"));
        assert_eq!(config.root_folder, "Reports");
        assert_eq!(config.flush_debounce, Duration::from_millis(10));
        assert_eq!(config.push_debounce, Duration::from_millis(20));
        assert_eq!(config.backoff_unit, Duration::ZERO);
        assert_eq!(config.backoff_jitter_ms, 0);
        assert_eq!(config.identity_poll_interval, Duration::from_secs(9));
    }
}
