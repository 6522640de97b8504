//! Manifest records and the merge rules that keep multi-device history
//! convergent.
//!
//! Two documents exist on the remote side. The primary per-account manifest
//! carries a monotonic revision and is replaced wholesale: the copy with the
//! greater `rev` wins. The legacy per-module history documents have no
//! revision and are merged record-by-record instead, so independent writers
//! can append concurrently without clobbering each other.
//!
//! Records are identified either by an explicit `id` or by a derivation from
//! `(contentHash, createdAt, fileName)` that is stable across merges. On an
//! identity collision the record with the greater timestamp wins; re-merging
//! the same input is a no-op.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One entry in the synchronized per-account history.
///
/// The core fields are typed; everything else a client attached (work-site
/// labels, module markers, free-form notes) rides along opaquely in `extra`
/// and survives merges untouched.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ManifestRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Creation time in epoch milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uploaded_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<i64>,
    /// Domain fields carried opaquely (forward compatibility).
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl ManifestRecord {
    /// Merge identity: the explicit `id` when present, otherwise a stable
    /// derivation from hash, creation time, and file name.
    pub fn identity(&self) -> String {
        if let Some(id) = self.id.as_deref() {
            if !id.is_empty() {
                return id.to_string();
            }
        }
        format!(
            "{}|{}|{}",
            self.content_hash.as_deref().unwrap_or(""),
            self.created_at.unwrap_or(0),
            self.file_name.as_deref().unwrap_or("")
        )
    }

    /// Timestamp used for last-write-wins comparison, in epoch milliseconds.
    pub fn merge_stamp(&self) -> i64 {
        self.created_at
            .or_else(|| self.uploaded_at.map(|t| t.timestamp_millis()))
            .unwrap_or(0)
    }

    /// Whether this record describes the same document as an older entry
    /// that predates content hashing (name + size comparison).
    pub fn matches_legacy(&self, file_name: &str, size: i64) -> bool {
        self.file_name.as_deref() == Some(file_name) && self.size == Some(size)
    }
}

/// The versioned per-account manifest document: `{"rev": n, "data": [...]}`.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Manifest {
    #[serde(default)]
    pub rev: i64,
    #[serde(default)]
    pub data: Vec<ManifestRecord>,
}

/// A legacy per-module history document without a revision marker.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct ModuleHistory {
    #[serde(default)]
    pub data: Vec<ManifestRecord>,
}

/// Merge two record arrays by identity with last-write-wins on collisions.
///
/// Disjoint inputs produce their union regardless of argument order. On a
/// collision the record with the strictly greater [`merge_stamp`] replaces
/// the other; ties keep the `base` side. Output is sorted newest-first, with
/// identity as the tiebreaker so equal-stamp orderings are deterministic.
///
/// [`merge_stamp`]: ManifestRecord::merge_stamp
pub fn merge_records(base: &[ManifestRecord], incoming: &[ManifestRecord]) -> Vec<ManifestRecord> {
    let mut by_identity: HashMap<String, ManifestRecord> = HashMap::new();
    let mut order: Vec<String> = Vec::new();

    for record in base.iter().chain(incoming.iter()) {
        let identity = record.identity();
        match by_identity.get(&identity) {
            Some(existing) if record.merge_stamp() <= existing.merge_stamp() => {}
            Some(_) => {
                by_identity.insert(identity, record.clone());
            }
            None => {
                by_identity.insert(identity.clone(), record.clone());
                order.push(identity);
            }
        }
    }

    let mut merged: Vec<ManifestRecord> = order
        .into_iter()
        .filter_map(|identity| by_identity.remove(&identity))
        .collect();
    merged.sort_by(|a, b| {
        b.merge_stamp()
            .cmp(&a.merge_stamp())
            .then_with(|| a.identity().cmp(&b.identity()))
    });
    merged
}

/// Mint the next manifest revision: wall-clock millis, but always strictly
/// greater than the revision it replaces (guards against clock skew).
pub fn next_rev(current: i64) -> i64 {
    Utc::now().timestamp_millis().max(current + 1)
}
