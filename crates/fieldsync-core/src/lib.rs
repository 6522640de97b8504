//! # fieldsync-core
//!
//! Core types, traits, and abstractions for the fieldsync library.
//!
//! This crate provides the foundational data structures and trait definitions
//! that other fieldsync crates depend on: the error type, the content hasher,
//! per-account namespacing, manifest merge rules, and the event bus used to
//! re-arm the upload scheduler.

pub mod defaults;
pub mod error;
pub mod events;
pub mod hasher;
pub mod logging;
pub mod manifest;
pub mod media;
pub mod models;
pub mod namespace;
pub mod traits;

// Re-export commonly used types at crate root
pub use error::{Error, Result};
pub use events::{EventEnvelope, SyncBus, SyncEvent};
pub use hasher::{fallback_fingerprint, hash_bytes, is_content_stable};
pub use manifest::{merge_records, next_rev, Manifest, ManifestRecord, ModuleHistory};
pub use media::{detect_media_type, sanitize_display_name, validate_payload, ValidationResult};
pub use models::*;
pub use namespace::{Namespace, ANON_ACCOUNT};
pub use traits::*;
