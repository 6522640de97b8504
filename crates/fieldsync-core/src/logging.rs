//! Structured logging schema and field name constants for fieldsync.
//!
//! All crates use these field names for consistent structured logging so log
//! aggregation tools can query by standardized names across every subsystem.
//!
//! ## Log Level Contract
//!
//! | Level | Usage |
//! |-------|-------|
//! | ERROR | Degraded service, requires operator attention |
//! | WARN  | Recoverable issue, automatic fallback applied |
//! | INFO  | Lifecycle events (startup, shutdown), operation completions |
//! | DEBUG | Decision points, intermediate values, config choices |
//! | TRACE | Per-item iteration, high-volume data |

// ─── Identity fields ───────────────────────────────────────────────────────

/// Subsystem originating the log event.
/// Values: "store", "remote", "engine", "core"
pub const SUBSYSTEM: &str = "subsystem";

/// Component within a subsystem.
/// Examples: "queue", "gateway", "flusher", "syncer", "pool"
pub const COMPONENT: &str = "component";

/// Logical operation name.
/// Examples: "enqueue", "drain", "pull", "push", "find_or_create"
pub const OPERATION: &str = "op";

/// Account id the operation is scoped to (the anonymous sentinel included).
pub const ACCOUNT: &str = "account";

// ─── Entity fields ─────────────────────────────────────────────────────────

/// Queue job id being processed.
pub const JOB_ID: &str = "job_id";

/// Content hash of the document being operated on.
pub const CONTENT_HASH: &str = "content_hash";

/// Remote object identifier.
pub const REMOTE_ID: &str = "remote_id";

// ─── Measurement fields ────────────────────────────────────────────────────

/// Wall-clock duration in milliseconds.
pub const DURATION_MS: &str = "duration_ms";

/// Failed attempts recorded on a queue job.
pub const ATTEMPTS: &str = "attempts";

/// Pending jobs remaining after an operation.
pub const PENDING: &str = "pending";

/// Manifest revision involved in a pull/push.
pub const REV: &str = "rev";

// ─── Outcome fields ────────────────────────────────────────────────────────

/// Whether an upload reused an existing remote object.
pub const DEDUPED: &str = "deduped";

/// Error message when an operation fails.
pub const ERROR_MSG: &str = "error";
