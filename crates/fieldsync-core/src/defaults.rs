//! Centralized default constants for the fieldsync engine.
//!
//! **This module is the single source of truth** for all shared default values.
//! All crates should reference these constants instead of defining their own
//! magic numbers.
//!
//! Organized by domain area. When adding new constants, place them in the
//! appropriate section and document the rationale for the chosen value.

// =============================================================================
// QUEUE / FLUSHER
// =============================================================================

/// Maximum pending jobs fetched per drain cycle.
pub const QUEUE_PAGE_LIMIT: i64 = 200;

/// Per-attempt backoff unit: a job that failed N times waits N × this.
pub const BACKOFF_UNIT_MS: u64 = 1_000;

/// Upper bound on the per-job backoff delay.
pub const BACKOFF_MAX_MS: u64 = 30_000;

/// Random jitter added on top of the backoff delay.
pub const BACKOFF_JITTER_MS: u64 = 400;

/// Coalescing window for drain triggers (connectivity, visibility, auth).
pub const FLUSH_DEBOUNCE_MS: u64 = 1_200;

// =============================================================================
// MANIFEST SYNC
// =============================================================================

/// Coalescing window for outbound manifest pushes.
pub const PUSH_DEBOUNCE_MS: u64 = 750;

/// Base name of the per-account remote manifest document.
pub const MANIFEST_BASENAME: &str = ".fieldsync_history";

/// Local state key holding the history array (account-scoped via Namespace).
pub const HISTORY_KEY: &str = "history";

/// Local state key holding the manifest revision marker.
pub const HISTORY_REV_KEY: &str = "historyRev";

// =============================================================================
// IDENTITY
// =============================================================================

/// Poll interval for detecting account switches when no change event arrives.
pub const IDENTITY_POLL_MS: u64 = 1_500;

// =============================================================================
// REMOTE STORE
// =============================================================================

/// Retry attempts for idempotent remote read/write operations.
pub const REMOTE_RETRY_ATTEMPTS: u32 = 3;

/// Base delay for remote retry backoff (doubles per attempt).
pub const REMOTE_RETRY_BASE_MS: u64 = 500;

/// Cap on the exponential component of the remote retry delay.
pub const REMOTE_RETRY_CAP_MS: u64 = 8_000;

/// Random jitter range added to every remote retry delay.
pub const REMOTE_RETRY_JITTER_MS: u64 = 1_000;

/// Default page size for remote object searches.
pub const REMOTE_PAGE_SIZE: i64 = 100;

/// HTTP request timeout.
pub const HTTP_TIMEOUT_SECS: u64 = 30;

/// Default name of the per-account root folder on the remote store.
pub const ROOT_FOLDER_NAME: &str = "FieldSync";

/// Canonical tag key carrying the content hash on remote objects.
///
/// Earlier clients wrote `sha256` for the same purpose; lookups still accept
/// it but every hit is re-tagged under this key so the dual-key period ends.
pub const TAG_CONTENT_HASH: &str = "contentHash";

/// Legacy tag key recognized on lookup only, never written.
pub const TAG_LEGACY_HASH: &str = "sha256";

/// Tag key recording which module produced an object.
pub const TAG_MODULE: &str = "module";

/// Media type marking folder objects on the remote store.
pub const FOLDER_MEDIA_TYPE: &str = "application/x-directory";

// =============================================================================
// MEDIA
// =============================================================================

/// Media type assumed when detection and the declared type both fail.
pub const FALLBACK_MEDIA_TYPE: &str = "application/octet-stream";

/// Maximum length of a sanitized remote object name.
pub const MAX_REMOTE_NAME_LEN: usize = 120;

/// Maximum accepted payload size (bytes).
pub const MAX_UPLOAD_BYTES: u64 = 50 * 1024 * 1024;

// =============================================================================
// STORAGE
// =============================================================================

/// Base name of the per-account database file (suffixed by account id).
pub const DB_BASENAME: &str = "fieldsync";

// =============================================================================
// EVENTS
// =============================================================================

/// Broadcast buffer capacity for the event bus.
///
/// Recommended: 256 for production, 32 for tests.
pub const EVENT_BUS_CAPACITY: usize = 256;
