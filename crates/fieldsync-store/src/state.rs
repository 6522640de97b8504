//! Key/value state repository.
//!
//! Holds the local manifest mirror and the revision marker. Keys are
//! namespaced by the caller (see `Namespace::scoped_key`); this layer stores
//! them verbatim, which is what lets the unscoped alias key coexist with the
//! account-scoped ones.

use async_trait::async_trait;
use sqlx::sqlite::SqlitePool;

use fieldsync_core::{Error, Result, StateStore};

/// SQLite implementation of [`StateStore`].
pub struct SqliteStateStore {
    pool: SqlitePool,
}

impl SqliteStateStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl StateStore for SqliteStateStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let value: Option<String> =
            sqlx::query_scalar("SELECT value FROM local_state WHERE key = ?")
                .bind(key)
                .fetch_optional(&self.pool)
                .await
                .map_err(Error::Database)?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO local_state (key, value) VALUES (?, ?) \
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        sqlx::query("DELETE FROM local_state WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(())
    }
}
