//! # fieldsync-store
//!
//! SQLite durable storage layer for fieldsync.
//!
//! This crate provides:
//! - Per-account database files with pooled connections
//! - The pending-upload queue table (indexed by status and content hash)
//! - The hash → remote-identifier catalog cache
//! - The namespaced key/value state table holding the local manifest mirror
//!
//! ## Example
//!
//! ```rust,ignore
//! use fieldsync_store::{open_database, PoolConfig, SqliteQueueStore};
//! use fieldsync_core::{DocumentPayload, QueueStore};
//!
//! let pool = open_database("data/fieldsync__u1.db".as_ref(), PoolConfig::default()).await?;
//! let queue = SqliteQueueStore::new(pool);
//!
//! let payload = DocumentPayload::new("report.pdf", "application/pdf", bytes);
//! let job_id = queue.enqueue(payload, Some(hash)).await?;
//! ```

pub mod catalog;
pub mod pool;
pub mod queue;
pub mod state;

// Re-export core types
pub use fieldsync_core::*;

// Re-export the pool type so consumers don't need a direct sqlx dependency
pub use sqlx::sqlite::SqlitePool;

pub use catalog::SqliteCatalogStore;
pub use pool::{open_database, open_memory, PoolConfig, DEFAULT_MAX_CONNECTIONS};
pub use queue::SqliteQueueStore;
pub use state::SqliteStateStore;
