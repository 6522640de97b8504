//! Upload queue repository implementation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqlitePool, SqliteRow};
use sqlx::Row;
use tracing::debug;

use fieldsync_core::{
    DocumentPayload, Error, JobStatus, QueueJob, QueueStore, Result,
};

/// SQLite implementation of [`QueueStore`].
///
/// One instance per account database. Completed jobs are deleted rather than
/// marked, so the table only ever holds pending work.
pub struct SqliteQueueStore {
    pool: SqlitePool,
}

impl SqliteQueueStore {
    /// Create a new queue store over the given connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Parse a queue row into a [`QueueJob`].
    fn parse_job_row(row: SqliteRow) -> QueueJob {
        let payload = DocumentPayload {
            display_name: row.get("display_name"),
            media_type: row.get("media_type"),
            bytes: row.get("payload"),
            module: row.get("module"),
        };
        QueueJob {
            id: row.get("id"),
            status: JobStatus::Pending,
            payload,
            content_hash: row.get("content_hash"),
            attempts: row.get("attempts"),
            last_error: row.get("last_error"),
            created_at: row.get::<DateTime<Utc>, _>("created_at"),
        }
    }
}

const JOB_COLUMNS: &str = "id, status, display_name, media_type, content_hash, module, \
                           payload, attempts, last_error, created_at";

#[async_trait]
impl QueueStore for SqliteQueueStore {
    async fn enqueue(&self, payload: DocumentPayload, content_hash: Option<String>) -> Result<i64> {
        // Dedup at the queue level: a pending job with the same hash absorbs
        // the new enqueue and keeps its id.
        if let Some(hash) = content_hash.as_deref() {
            if let Some(existing) = self.find_pending_by_hash(hash).await? {
                debug!(
                    subsystem = "store",
                    component = "queue",
                    op = "enqueue",
                    job_id = existing.id,
                    content_hash = hash,
                    "Collapsed duplicate enqueue onto pending job"
                );
                return Ok(existing.id);
            }
        }

        let now = Utc::now();
        let result = sqlx::query(
            "INSERT INTO upload_queue \
             (status, display_name, media_type, content_hash, module, payload, attempts, created_at) \
             VALUES ('pending', ?, ?, ?, ?, ?, 0, ?)",
        )
        .bind(&payload.display_name)
        .bind(&payload.media_type)
        .bind(content_hash.as_deref())
        .bind(payload.module.as_deref())
        .bind(&payload.bytes)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(result.last_insert_rowid())
    }

    async fn find_pending_by_hash(&self, content_hash: &str) -> Result<Option<QueueJob>> {
        let row = sqlx::query(&format!(
            "SELECT {JOB_COLUMNS} FROM upload_queue \
             WHERE status = 'pending' AND content_hash = ? \
             ORDER BY created_at ASC, id ASC LIMIT 1"
        ))
        .bind(content_hash)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(row.map(Self::parse_job_row))
    }

    async fn pending(&self, limit: i64) -> Result<Vec<QueueJob>> {
        let rows = sqlx::query(&format!(
            "SELECT {JOB_COLUMNS} FROM upload_queue \
             WHERE status = 'pending' \
             ORDER BY created_at ASC, id ASC LIMIT ?"
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(rows.into_iter().map(Self::parse_job_row).collect())
    }

    async fn mark_success(&self, job_id: i64) -> Result<()> {
        let result = sqlx::query("DELETE FROM upload_queue WHERE id = ?")
            .bind(job_id)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;

        // A missing row means the job was purged between claim and
        // completion; nothing left to do.
        if result.rows_affected() == 0 {
            debug!(
                subsystem = "store",
                component = "queue",
                op = "mark_success",
                job_id,
                "Job already gone"
            );
        }
        Ok(())
    }

    async fn mark_failure(&self, job_id: i64, error: &str) -> Result<()> {
        let result = sqlx::query(
            "UPDATE upload_queue \
             SET attempts = attempts + 1, last_error = ?, status = 'pending' \
             WHERE id = ?",
        )
        .bind(error)
        .bind(job_id)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        if result.rows_affected() == 0 {
            return Err(Error::Queue(format!("job {job_id} not found")));
        }
        Ok(())
    }

    async fn pending_count(&self) -> Result<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM upload_queue WHERE status = 'pending'")
                .fetch_one(&self.pool)
                .await
                .map_err(Error::Database)?;
        Ok(count)
    }

    async fn clear_all(&self) -> Result<i64> {
        let result = sqlx::query("DELETE FROM upload_queue")
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(result.rows_affected() as i64)
    }
}
