//! Shared data models for the sync engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use crate::defaults;
use crate::media::detect_media_type;

/// Status of a queued upload job.
///
/// `Pending` is the only state that is ever persisted: completed jobs are
/// deleted from the queue, and failures stay pending with an incremented
/// attempt counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Pending,
}

impl JobStatus {
    /// String form stored in the queue table.
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
        }
    }
}

/// A document handed to the engine for synchronization.
#[derive(Debug, Clone)]
pub struct DocumentPayload {
    /// Original display name (sanitized only when it reaches the remote).
    pub display_name: String,
    /// Effective media type (detected, falling back to the declared one).
    pub media_type: String,
    /// Owned document bytes.
    pub bytes: Vec<u8>,
    /// Producing module, used for remote subfolder placement.
    pub module: Option<String>,
}

impl DocumentPayload {
    /// Build a payload, resolving the effective media type from magic bytes,
    /// extension, and the declared type, in that order.
    pub fn new(display_name: impl Into<String>, declared_media_type: &str, bytes: Vec<u8>) -> Self {
        let display_name = display_name.into();
        let media_type = detect_media_type(&display_name, &bytes, declared_media_type);
        Self {
            display_name,
            media_type,
            bytes,
            module: None,
        }
    }

    /// Attribute the payload to a producing module.
    pub fn with_module(mut self, module: impl Into<String>) -> Self {
        self.module = Some(module.into());
        self
    }

    /// Payload size in bytes.
    pub fn size(&self) -> i64 {
        self.bytes.len() as i64
    }
}

/// One pending upload attempt, as persisted in the queue table.
#[derive(Debug, Clone)]
pub struct QueueJob {
    pub id: i64,
    pub status: JobStatus,
    pub payload: DocumentPayload,
    pub content_hash: Option<String>,
    /// Failed remote attempts so far; drives the backoff delay.
    pub attempts: i64,
    /// Last failure description, diagnostics only.
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Cached hash → remote-identifier mapping, one row per account catalog.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CatalogEntry {
    pub content_hash: String,
    pub remote_id: String,
    pub name: String,
    pub size: i64,
    pub media_type: String,
    pub cached_at: DateTime<Utc>,
}

/// Outcome of a find-or-create upload against the remote store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub remote_id: String,
    pub name: String,
    /// True when an existing remote object was reused instead of uploading.
    pub deduped: bool,
}

/// Result of [`upload_or_queue`]: either a completed direct upload or a
/// queued job id to be drained later.
///
/// [`upload_or_queue`]: https://docs.rs/fieldsync-engine
#[derive(Debug, Clone)]
pub struct UploadOutcome {
    pub uploaded: bool,
    pub remote: Option<StoredObject>,
    pub queued_id: Option<i64>,
}

impl UploadOutcome {
    pub fn uploaded(remote: StoredObject) -> Self {
        Self {
            uploaded: true,
            remote: Some(remote),
            queued_id: None,
        }
    }

    pub fn queued(id: i64) -> Self {
        Self {
            uploaded: false,
            remote: None,
            queued_id: Some(id),
        }
    }
}

/// Accounting for one drain cycle of the upload scheduler.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DrainSummary {
    pub attempted: usize,
    pub uploaded: usize,
    pub failed: usize,
    /// True when the drain was skipped because another drain was running.
    pub skipped: bool,
}

/// An object (file or folder) on the remote store.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteObject {
    pub id: String,
    pub name: String,
    pub media_type: String,
    pub size: Option<i64>,
    pub modified_at: Option<DateTime<Utc>>,
    pub tags: HashMap<String, String>,
}

impl RemoteObject {
    /// Look up a tag value.
    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(String::as_str)
    }

    pub fn is_folder(&self) -> bool {
        self.media_type == defaults::FOLDER_MEDIA_TYPE
    }
}

/// Metadata for creating or re-tagging a remote object.
#[derive(Debug, Clone, Default)]
pub struct ObjectMeta {
    pub name: String,
    pub media_type: String,
    pub parent: Option<String>,
    pub tags: BTreeMap<String, String>,
}

impl ObjectMeta {
    pub fn new(name: impl Into<String>, media_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            media_type: media_type.into(),
            parent: None,
            tags: BTreeMap::new(),
        }
    }

    pub fn in_parent(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    pub fn tagged(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }
}

/// Search filter for remote object listings.
///
/// All set fields are ANDed together; trashed objects are always excluded.
#[derive(Debug, Clone)]
pub struct DriveQuery {
    pub name: Option<String>,
    pub name_contains: Option<String>,
    pub parent: Option<String>,
    pub tag: Option<(String, String)>,
    pub media_type: Option<String>,
    pub folders_only: bool,
    pub page_size: i64,
}

impl Default for DriveQuery {
    fn default() -> Self {
        Self {
            name: None,
            name_contains: None,
            parent: None,
            tag: None,
            media_type: None,
            folders_only: false,
            page_size: defaults::REMOTE_PAGE_SIZE,
        }
    }
}

impl DriveQuery {
    pub fn by_name(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    pub fn by_name_contains(fragment: impl Into<String>) -> Self {
        Self {
            name_contains: Some(fragment.into()),
            ..Self::default()
        }
    }

    pub fn by_tag(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            tag: Some((key.into(), value.into())),
            ..Self::default()
        }
    }

    pub fn in_parent(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    pub fn folders(mut self) -> Self {
        self.folders_only = true;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_status_as_str() {
        assert_eq!(JobStatus::Pending.as_str(), "pending");
    }

    #[test]
    fn test_payload_detects_media_type() {
        let payload = DocumentPayload::new("r.bin", "", b"%PDF-1.5 x".to_vec());
        assert_eq!(payload.media_type, "application/pdf");
    }

    #[test]
    fn test_payload_keeps_declared_when_undetectable() {
        let payload = DocumentPayload::new("r", "application/pdf", b"opaque".to_vec());
        assert_eq!(payload.media_type, "application/pdf");
    }

    #[test]
    fn test_payload_with_module() {
        let payload = DocumentPayload::new("r.pdf", "application/pdf", vec![1, 2, 3])
            .with_module("handover");
        assert_eq!(payload.module.as_deref(), Some("handover"));
        assert_eq!(payload.size(), 3);
    }

    #[test]
    fn test_upload_outcome_constructors() {
        let direct = UploadOutcome::uploaded(StoredObject {
            remote_id: "f1".into(),
            name: "abc__r.pdf".into(),
            deduped: false,
        });
        assert!(direct.uploaded);
        assert!(direct.queued_id.is_none());

        let queued = UploadOutcome::queued(7);
        assert!(!queued.uploaded);
        assert_eq!(queued.queued_id, Some(7));
        assert!(queued.remote.is_none());
    }

    #[test]
    fn test_remote_object_tag_lookup() {
        let mut tags = HashMap::new();
        tags.insert("contentHash".to_string(), "abc".to_string());
        let obj = RemoteObject {
            id: "1".into(),
            name: "n".into(),
            media_type: "application/pdf".into(),
            size: None,
            modified_at: None,
            tags,
        };
        assert_eq!(obj.tag("contentHash"), Some("abc"));
        assert_eq!(obj.tag("missing"), None);
        assert!(!obj.is_folder());
    }

    #[test]
    fn test_object_meta_builder() {
        let meta = ObjectMeta::new("doc.pdf", "application/pdf")
            .in_parent("folder-1")
            .tagged("contentHash", "abc");
        assert_eq!(meta.parent.as_deref(), Some("folder-1"));
        assert_eq!(meta.tags.get("contentHash").map(String::as_str), Some("abc"));
    }

    #[test]
    fn test_drive_query_defaults() {
        let q = DriveQuery::default();
        assert_eq!(q.page_size, defaults::REMOTE_PAGE_SIZE);
        assert!(!q.folders_only);
    }

    #[test]
    fn test_drive_query_builders() {
        let q = DriveQuery::by_tag("contentHash", "abc").in_parent("root");
        assert_eq!(q.tag, Some(("contentHash".into(), "abc".into())));
        assert_eq!(q.parent.as_deref(), Some("root"));

        let f = DriveQuery::by_name("X").folders();
        assert!(f.folders_only);
    }

    #[test]
    fn test_catalog_entry_serde_camel_case() {
        let entry = CatalogEntry {
            content_hash: "abc".into(),
            remote_id: "f1".into(),
            name: "doc.pdf".into(),
            size: 10,
            media_type: "application/pdf".into(),
            cached_at: Utc::now(),
        };
        let json = serde_json::to_string(&entry).unwrap();
        assert!(json.contains("\"contentHash\""));
        assert!(json.contains("\"remoteId\""));
        assert!(json.contains("\"mediaType\""));
    }
}
