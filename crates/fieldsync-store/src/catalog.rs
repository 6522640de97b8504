//! Catalog repository: the per-account hash → remote-identifier cache.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqlitePool;
use sqlx::Row;

use fieldsync_core::{CatalogEntry, CatalogStore, Error, Result};

/// SQLite implementation of [`CatalogStore`].
pub struct SqliteCatalogStore {
    pool: SqlitePool,
}

impl SqliteCatalogStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CatalogStore for SqliteCatalogStore {
    async fn upsert(&self, entry: CatalogEntry) -> Result<()> {
        sqlx::query(
            "INSERT INTO catalog (content_hash, remote_id, name, size, media_type, cached_at) \
             VALUES (?, ?, ?, ?, ?, ?) \
             ON CONFLICT(content_hash) DO UPDATE SET \
                 remote_id = excluded.remote_id, \
                 name = excluded.name, \
                 size = excluded.size, \
                 media_type = excluded.media_type, \
                 cached_at = excluded.cached_at",
        )
        .bind(&entry.content_hash)
        .bind(&entry.remote_id)
        .bind(&entry.name)
        .bind(entry.size)
        .bind(&entry.media_type)
        .bind(entry.cached_at)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;
        Ok(())
    }

    async fn get(&self, content_hash: &str) -> Result<Option<CatalogEntry>> {
        let row = sqlx::query(
            "SELECT content_hash, remote_id, name, size, media_type, cached_at \
             FROM catalog WHERE content_hash = ?",
        )
        .bind(content_hash)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(row.map(|row| CatalogEntry {
            content_hash: row.get("content_hash"),
            remote_id: row.get("remote_id"),
            name: row.get("name"),
            size: row.get("size"),
            media_type: row.get("media_type"),
            cached_at: row.get::<DateTime<Utc>, _>("cached_at"),
        }))
    }

    async fn clear(&self) -> Result<i64> {
        let result = sqlx::query("DELETE FROM catalog")
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(result.rows_affected() as i64)
    }
}
