//! # fieldsync-engine
//!
//! The content-addressed offline sync engine: deduplicating uploads, a
//! durable retry queue, and per-account manifest synchronization.
//!
//! This crate provides:
//! - [`UploadScheduler`]: drains the pending-upload queue with per-job
//!   backoff, re-armed (debounced) by connectivity/visibility/auth events
//! - [`ManifestSyncer`]: revision-based pull/heal and debounced push of the
//!   per-account history manifest
//! - [`SyncEngine`]: the facade owning an explicit per-account context
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use fieldsync_core::{DocumentPayload, SharedIdentity, SyncBus, hash_bytes};
//! use fieldsync_engine::{EngineConfig, SyncEngine};
//! use fieldsync_remote::{AuthSession, HttpDrive, RemoteConfig};
//!
//! let identity = SharedIdentity::new(Some("tech-7".into()));
//! let session = Arc::new(AuthSession::with_token(token));
//! let drive = Arc::new(HttpDrive::new(RemoteConfig::from_env(), session));
//! let bus = SyncBus::default();
//!
//! let engine = SyncEngine::open(
//!     EngineConfig::from_env(),
//!     Arc::new(identity),
//!     drive,
//!     bus.clone(),
//! ).await?;
//! engine.start();
//!
//! let bytes = std::fs::read("report.pdf")?;
//! let hash = hash_bytes(&bytes);
//! let payload = DocumentPayload::new("report.pdf", "application/pdf", bytes);
//! let outcome = engine.upload_or_queue(payload, &hash).await?;
//! println!("uploaded: {}, queued id: {:?}", outcome.uploaded, outcome.queued_id);
//! ```

pub mod context;
pub mod engine;
pub mod flusher;
pub mod syncer;

// Re-export core types
pub use fieldsync_core::*;

pub use context::{EngineConfig, EngineContext};
pub use engine::SyncEngine;
pub use flusher::{FlushConfig, UploadScheduler};
pub use syncer::ManifestSyncer;
