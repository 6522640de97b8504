//! Database connection pool management.

use std::path::Path;
use std::time::{Duration, Instant};

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use tracing::{debug, info};

use fieldsync_core::{Error, Result};

/// Default maximum number of connections in the pool.
///
/// The store serves a single process; a handful of connections covers the
/// queue drain and manifest sync running concurrently.
pub const DEFAULT_MAX_CONNECTIONS: u32 = 5;

/// Default busy timeout before a locked database read/write gives up.
pub const DEFAULT_BUSY_TIMEOUT_SECS: u64 = 5;

/// Pool configuration options.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Maximum number of connections in the pool.
    pub max_connections: u32,
    /// How long a statement waits on a locked database before failing.
    pub busy_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: DEFAULT_MAX_CONNECTIONS,
            busy_timeout: Duration::from_secs(DEFAULT_BUSY_TIMEOUT_SECS),
        }
    }
}

impl PoolConfig {
    /// Create a new pool configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum number of connections.
    pub fn max_connections(mut self, n: u32) -> Self {
        self.max_connections = n;
        self
    }

    /// Set the busy timeout.
    pub fn busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }
}

/// Open (creating if missing) the database at `path` and ensure its schema.
pub async fn open_database(path: &Path, config: PoolConfig) -> Result<SqlitePool> {
    let start = Instant::now();

    info!(
        subsystem = "store",
        component = "pool",
        op = "open",
        path = %path.display(),
        max_connections = config.max_connections,
        "Opening database"
    );

    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(config.busy_timeout)
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(config.max_connections)
        .connect_with(options)
        .await
        .map_err(Error::Database)?;

    init_schema(&pool).await?;

    info!(
        subsystem = "store",
        component = "pool",
        op = "established",
        duration_ms = start.elapsed().as_millis() as u64,
        "Database ready"
    );
    Ok(pool)
}

/// Open an in-memory database with the schema applied.
///
/// Uses a single connection: each in-memory connection is its own database,
/// so a larger pool would scatter tables across invisible copies.
pub async fn open_memory() -> Result<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .map_err(Error::Database)?;
    init_schema(&pool).await?;
    Ok(pool)
}

/// Create tables and indexes idempotently.
async fn init_schema(pool: &SqlitePool) -> Result<()> {
    let statements = [
        "CREATE TABLE IF NOT EXISTS upload_queue (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            status TEXT NOT NULL DEFAULT 'pending',
            display_name TEXT NOT NULL,
            media_type TEXT NOT NULL,
            content_hash TEXT,
            module TEXT,
            payload BLOB NOT NULL,
            attempts INTEGER NOT NULL DEFAULT 0,
            last_error TEXT,
            created_at TEXT NOT NULL
        )",
        "CREATE INDEX IF NOT EXISTS idx_upload_queue_status ON upload_queue(status)",
        "CREATE INDEX IF NOT EXISTS idx_upload_queue_hash ON upload_queue(content_hash)",
        "CREATE TABLE IF NOT EXISTS catalog (
            content_hash TEXT PRIMARY KEY,
            remote_id TEXT NOT NULL,
            name TEXT NOT NULL,
            size INTEGER NOT NULL,
            media_type TEXT NOT NULL,
            cached_at TEXT NOT NULL
        )",
        "CREATE TABLE IF NOT EXISTS local_state (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        )",
    ];

    for statement in statements {
        sqlx::query(statement)
            .execute(pool)
            .await
            .map_err(Error::Database)?;
    }

    debug!(
        subsystem = "store",
        component = "pool",
        op = "init_schema",
        "Schema ensured"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_config_builder() {
        let config = PoolConfig::new()
            .max_connections(2)
            .busy_timeout(Duration::from_secs(1));

        assert_eq!(config.max_connections, 2);
        assert_eq!(config.busy_timeout, Duration::from_secs(1));
    }

    #[test]
    fn test_default_max_connections() {
        assert_eq!(PoolConfig::default().max_connections, DEFAULT_MAX_CONNECTIONS);
    }

    #[tokio::test]
    async fn test_open_memory_applies_schema() {
        let pool = open_memory().await.unwrap();
        // Schema is idempotent: re-running must not fail.
        init_schema(&pool).await.unwrap();

        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM upload_queue")
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(count, 0);
    }
}
