//! # fieldsync-remote
//!
//! Remote object store access for fieldsync.
//!
//! This crate provides:
//! - [`HttpDrive`]: the authenticated drive-style REST client (bearer auth,
//!   bounded retry with jitter on idempotent calls, session invalidation on
//!   401/403)
//! - [`ObjectGateway`]: content-hash dedup, idempotent find-or-create,
//!   hash → id resolution, and small-JSON document read/write on top of any
//!   [`RemoteDrive`](fieldsync_core::RemoteDrive) implementation
//! - [`MemoryDrive`]: a deterministic in-memory drive for tests
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use fieldsync_remote::{AuthSession, HttpDrive, ObjectGateway, RemoteConfig};
//!
//! let session = Arc::new(AuthSession::with_token(token));
//! let drive = Arc::new(HttpDrive::new(RemoteConfig::from_env(), session));
//! let gateway = ObjectGateway::new(drive, catalog, "FieldSync");
//!
//! let stored = gateway
//!     .find_or_create_by_hash(&bytes, &hash, "report.pdf", Some("handover"))
//!     .await?;
//! println!("{} (deduped: {})", stored.remote_id, stored.deduped);
//! ```

pub mod gateway;
pub mod http;
pub mod memory;
pub mod session;
pub mod types;

// Re-export core types
pub use fieldsync_core::*;

pub use gateway::{JsonDocument, ObjectGateway};
pub use http::{HttpDrive, RemoteConfig, RetryPolicy};
pub use memory::MemoryDrive;
pub use session::AuthSession;
