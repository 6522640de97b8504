//! Core traits for fieldsync abstractions.
//!
//! These traits define the interfaces that concrete implementations must
//! satisfy, enabling pluggable backends and testability: the durable local
//! stores, the authenticated remote drive capability, and the identity
//! capability the engine consults for account scoping.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};

use crate::error::Result;
use crate::models::*;

// =============================================================================
// LOCAL DURABLE STORES
// =============================================================================

/// Durable table of pending upload jobs, scoped to one account's database.
///
/// No operation blocks indefinitely; callers that need timeouts apply their
/// own. Completed jobs are deleted, never marked.
#[async_trait]
pub trait QueueStore: Send + Sync {
    /// Insert a pending job, collapsing duplicates: when a pending job with
    /// the same non-null hash already exists its id is returned unchanged.
    async fn enqueue(&self, payload: DocumentPayload, content_hash: Option<String>) -> Result<i64>;

    /// Find a pending job with the given content hash.
    async fn find_pending_by_hash(&self, content_hash: &str) -> Result<Option<QueueJob>>;

    /// Fetch up to `limit` pending jobs, oldest-inserted first.
    async fn pending(&self, limit: i64) -> Result<Vec<QueueJob>>;

    /// Delete a job after its upload was confirmed.
    async fn mark_success(&self, job_id: i64) -> Result<()>;

    /// Record a failed attempt: attempts + 1, last error replaced, job stays
    /// pending for the next drain.
    async fn mark_failure(&self, job_id: i64, error: &str) -> Result<()>;

    /// Number of pending jobs.
    async fn pending_count(&self) -> Result<i64>;

    /// Remove every job (external purge). Returns the number removed.
    async fn clear_all(&self) -> Result<i64>;
}

/// Per-account cache mapping content hashes to remote identifiers.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Insert or replace the entry for `entry.content_hash`.
    async fn upsert(&self, entry: CatalogEntry) -> Result<()>;

    /// Look up an entry by content hash.
    async fn get(&self, content_hash: &str) -> Result<Option<CatalogEntry>>;

    /// Drop every entry (explicit reset). Returns the number removed.
    async fn clear(&self) -> Result<i64>;
}

/// Namespaced key/value state, backing the local manifest mirror and the
/// revision marker.
#[async_trait]
pub trait StateStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn set(&self, key: &str, value: &str) -> Result<()>;
    async fn remove(&self, key: &str) -> Result<()>;
}

// =============================================================================
// REMOTE DRIVE CAPABILITY
// =============================================================================

/// Authenticated remote object store operations.
///
/// This is the boundary to the credential-owning collaborator: implementations
/// are handed a working session and surface `Error::Unauthorized` once it is
/// rejected, after invalidating it locally so subsequent calls fail fast.
#[async_trait]
pub trait RemoteDrive: Send + Sync {
    /// Whether an authenticated session is currently available.
    fn is_authenticated(&self) -> bool;

    /// Find or create a folder with the given name under `parent` (root when
    /// `None`), returning its identifier.
    async fn ensure_folder(&self, name: &str, parent: Option<&str>) -> Result<String>;

    /// Search for objects matching the query. An empty result is a valid
    /// miss, not an error.
    async fn find(&self, query: &DriveQuery) -> Result<Vec<RemoteObject>>;

    /// Create an object in a single request (small payloads, JSON documents).
    async fn create_object(&self, meta: &ObjectMeta, data: &[u8]) -> Result<RemoteObject>;

    /// Create an object with the two-phase resumable protocol: initiate a
    /// session with the declared size and type, then stream the body.
    async fn create_object_resumable(&self, meta: &ObjectMeta, data: &[u8])
        -> Result<RemoteObject>;

    /// Replace the content of an existing object.
    async fn update_content(
        &self,
        id: &str,
        media_type: &str,
        data: &[u8],
    ) -> Result<RemoteObject>;

    /// Merge tags into an existing object's metadata.
    async fn update_tags(&self, id: &str, tags: &BTreeMap<String, String>)
        -> Result<RemoteObject>;

    /// Fetch the raw bytes of an object.
    async fn download(&self, id: &str) -> Result<Vec<u8>>;
}

// =============================================================================
// IDENTITY CAPABILITY
// =============================================================================

/// Read access to the active account identity.
pub trait IdentityProvider: Send + Sync {
    /// Current account id, or `None` when signed out.
    fn account_id(&self) -> Option<String>;
}

/// Shared, mutable identity handle for hosts (and tests) that manage the
/// signed-in account themselves.
#[derive(Clone, Default)]
pub struct SharedIdentity {
    inner: Arc<RwLock<Option<String>>>,
}

impl SharedIdentity {
    pub fn new(account_id: Option<String>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(account_id)),
        }
    }

    /// Replace the active account id.
    pub fn set(&self, account_id: Option<String>) {
        *self
            .inner
            .write()
            .unwrap_or_else(PoisonError::into_inner) = account_id;
    }
}

impl IdentityProvider for SharedIdentity {
    fn account_id(&self) -> Option<String> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shared_identity_set_and_read() {
        let identity = SharedIdentity::default();
        assert_eq!(identity.account_id(), None);

        identity.set(Some("u1".into()));
        assert_eq!(identity.account_id(), Some("u1".into()));

        let clone = identity.clone();
        clone.set(None);
        assert_eq!(identity.account_id(), None);
    }
}
