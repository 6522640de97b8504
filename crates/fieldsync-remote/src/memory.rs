//! In-memory remote drive for deterministic testing.
//!
//! Behaves like the HTTP client from the gateway's point of view (folders,
//! tag and name searches, create/update/download) without any network.
//! Authentication and create-failure toggles let tests exercise the offline
//! and degraded paths.
//!
//! ## Usage
//!
//! ```rust,ignore
//! let drive = Arc::new(MemoryDrive::new());
//! drive.set_authenticated(false);          // simulate signed-out
//! drive.fail_creates(true);                // simulate flaky uploads
//! assert_eq!(drive.object_count(), 0);
//! ```

use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

use fieldsync_core::{
    defaults, DriveQuery, Error, ObjectMeta, RemoteDrive, RemoteObject, Result,
};

/// One stored object (file or folder).
#[derive(Debug, Clone)]
pub struct MemoryObject {
    pub id: String,
    pub name: String,
    pub media_type: String,
    pub parent: Option<String>,
    pub tags: BTreeMap<String, String>,
    pub data: Vec<u8>,
    pub folder: bool,
}

impl From<&MemoryObject> for RemoteObject {
    fn from(obj: &MemoryObject) -> Self {
        RemoteObject {
            id: obj.id.clone(),
            name: obj.name.clone(),
            media_type: obj.media_type.clone(),
            size: (!obj.folder).then(|| obj.data.len() as i64),
            modified_at: Some(Utc::now()),
            tags: obj.tags.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
        }
    }
}

/// In-memory [`RemoteDrive`] implementation.
#[derive(Default)]
pub struct MemoryDrive {
    authenticated: AtomicBool,
    fail_creates: AtomicBool,
    next_id: AtomicU64,
    objects: Mutex<HashMap<String, MemoryObject>>,
}

impl MemoryDrive {
    /// Create an authenticated, empty drive.
    pub fn new() -> Self {
        Self {
            authenticated: AtomicBool::new(true),
            ..Self::default()
        }
    }

    /// Toggle the authenticated state.
    pub fn set_authenticated(&self, authenticated: bool) {
        self.authenticated.store(authenticated, Ordering::SeqCst);
    }

    /// When set, create operations fail with a transient error.
    pub fn fail_creates(&self, fail: bool) {
        self.fail_creates.store(fail, Ordering::SeqCst);
    }

    /// Number of non-folder objects stored.
    pub fn object_count(&self) -> usize {
        self.lock().values().filter(|o| !o.folder).count()
    }

    /// All non-folder objects carrying the given tag value.
    pub fn objects_with_tag(&self, key: &str, value: &str) -> Vec<MemoryObject> {
        self.lock()
            .values()
            .filter(|o| !o.folder && o.tags.get(key).map(String::as_str) == Some(value))
            .cloned()
            .collect()
    }

    /// First object with the given name.
    pub fn object_named(&self, name: &str) -> Option<MemoryObject> {
        self.lock()
            .values()
            .find(|o| !o.folder && o.name == name)
            .cloned()
    }

    /// First folder with the given name.
    pub fn folder_named(&self, name: &str) -> Option<MemoryObject> {
        self.lock()
            .values()
            .find(|o| o.folder && o.name == name)
            .cloned()
    }

    /// Insert an object directly, bypassing auth/failure toggles. For
    /// arranging preexisting remote state in tests.
    pub fn seed_object(&self, name: &str, data: &[u8], tags: &[(&str, &str)]) -> String {
        let id = self.alloc_id("obj");
        let object = MemoryObject {
            id: id.clone(),
            name: name.to_string(),
            media_type: "application/octet-stream".to_string(),
            parent: None,
            tags: tags
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            data: data.to_vec(),
            folder: false,
        };
        self.lock().insert(id.clone(), object);
        id
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, MemoryObject>> {
        self.objects.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn alloc_id(&self, prefix: &str) -> String {
        format!("{prefix}-{}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1)
    }

    fn check_auth(&self) -> Result<()> {
        if self.authenticated.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(Error::Unauthorized("no active remote session".into()))
        }
    }

    fn matches(obj: &MemoryObject, query: &DriveQuery) -> bool {
        if let Some(name) = &query.name {
            if &obj.name != name {
                return false;
            }
        }
        if let Some(fragment) = &query.name_contains {
            if !obj.name.contains(fragment.as_str()) {
                return false;
            }
        }
        if let Some(parent) = &query.parent {
            if obj.parent.as_deref() != Some(parent.as_str()) {
                return false;
            }
        }
        if let Some((key, value)) = &query.tag {
            if obj.tags.get(key) != Some(value) {
                return false;
            }
        }
        if query.folders_only && !obj.folder {
            return false;
        }
        if let Some(media_type) = &query.media_type {
            if &obj.media_type != media_type {
                return false;
            }
        }
        true
    }
}

#[async_trait]
impl RemoteDrive for MemoryDrive {
    fn is_authenticated(&self) -> bool {
        self.authenticated.load(Ordering::SeqCst)
    }

    async fn ensure_folder(&self, name: &str, parent: Option<&str>) -> Result<String> {
        self.check_auth()?;
        let mut objects = self.lock();
        if let Some(existing) = objects
            .values()
            .find(|o| o.folder && o.name == name && o.parent.as_deref() == parent)
        {
            return Ok(existing.id.clone());
        }

        let id = self.alloc_id("folder");
        objects.insert(
            id.clone(),
            MemoryObject {
                id: id.clone(),
                name: name.to_string(),
                media_type: defaults::FOLDER_MEDIA_TYPE.to_string(),
                parent: parent.map(String::from),
                tags: BTreeMap::new(),
                data: Vec::new(),
                folder: true,
            },
        );
        Ok(id)
    }

    async fn find(&self, query: &DriveQuery) -> Result<Vec<RemoteObject>> {
        self.check_auth()?;
        let objects = self.lock();
        let mut hits: Vec<&MemoryObject> = objects
            .values()
            .filter(|o| Self::matches(o, query))
            .collect();
        hits.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(hits
            .into_iter()
            .take(query.page_size.max(0) as usize)
            .map(RemoteObject::from)
            .collect())
    }

    async fn create_object(&self, meta: &ObjectMeta, data: &[u8]) -> Result<RemoteObject> {
        self.check_auth()?;
        if self.fail_creates.load(Ordering::SeqCst) {
            return Err(Error::Request("injected create failure".into()));
        }

        let id = self.alloc_id("obj");
        let object = MemoryObject {
            id: id.clone(),
            name: meta.name.clone(),
            media_type: meta.media_type.clone(),
            parent: meta.parent.clone(),
            tags: meta.tags.clone(),
            data: data.to_vec(),
            folder: false,
        };
        let remote = RemoteObject::from(&object);
        self.lock().insert(id, object);
        Ok(remote)
    }

    async fn create_object_resumable(
        &self,
        meta: &ObjectMeta,
        data: &[u8],
    ) -> Result<RemoteObject> {
        // Same storage path; the two-phase protocol is a transport concern.
        self.create_object(meta, data).await
    }

    async fn update_content(
        &self,
        id: &str,
        media_type: &str,
        data: &[u8],
    ) -> Result<RemoteObject> {
        self.check_auth()?;
        let mut objects = self.lock();
        let object = objects
            .get_mut(id)
            .ok_or_else(|| Error::NotFound(format!("object {id}")))?;
        object.data = data.to_vec();
        object.media_type = media_type.to_string();
        Ok(RemoteObject::from(&*object))
    }

    async fn update_tags(
        &self,
        id: &str,
        tags: &BTreeMap<String, String>,
    ) -> Result<RemoteObject> {
        self.check_auth()?;
        let mut objects = self.lock();
        let object = objects
            .get_mut(id)
            .ok_or_else(|| Error::NotFound(format!("object {id}")))?;
        for (key, value) in tags {
            object.tags.insert(key.clone(), value.clone());
        }
        Ok(RemoteObject::from(&*object))
    }

    async fn download(&self, id: &str) -> Result<Vec<u8>> {
        self.check_auth()?;
        let objects = self.lock();
        objects
            .get(id)
            .map(|o| o.data.clone())
            .ok_or_else(|| Error::NotFound(format!("object {id}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_ensure_folder_is_idempotent() {
        let drive = MemoryDrive::new();
        let a = drive.ensure_folder("FieldSync", None).await.unwrap();
        let b = drive.ensure_folder("FieldSync", None).await.unwrap();
        assert_eq!(a, b);

        let child = drive.ensure_folder("handover", Some(&a)).await.unwrap();
        assert_ne!(child, a);
    }

    #[tokio::test]
    async fn test_find_by_tag_and_name() {
        let drive = MemoryDrive::new();
        drive.seed_object("h1__a.pdf", b"a", &[("contentHash", "h1")]);
        drive.seed_object("other.pdf", b"b", &[]);

        let by_tag = drive
            .find(&DriveQuery::by_tag("contentHash", "h1"))
            .await
            .unwrap();
        assert_eq!(by_tag.len(), 1);
        assert_eq!(by_tag[0].name, "h1__a.pdf");

        let by_fragment = drive
            .find(&DriveQuery::by_name_contains("h1"))
            .await
            .unwrap();
        assert_eq!(by_fragment.len(), 1);

        let miss = drive
            .find(&DriveQuery::by_tag("contentHash", "h2"))
            .await
            .unwrap();
        assert!(miss.is_empty());
    }

    #[tokio::test]
    async fn test_unauthenticated_calls_fail() {
        let drive = MemoryDrive::new();
        drive.set_authenticated(false);

        let err = drive.find(&DriveQuery::by_name("x")).await.unwrap_err();
        assert!(err.is_unauthorized());
    }

    #[tokio::test]
    async fn test_injected_create_failure() {
        let drive = MemoryDrive::new();
        drive.fail_creates(true);

        let meta = ObjectMeta::new("doc.pdf", "application/pdf");
        assert!(drive.create_object(&meta, b"x").await.is_err());
        assert_eq!(drive.object_count(), 0);

        drive.fail_creates(false);
        assert!(drive.create_object(&meta, b"x").await.is_ok());
        assert_eq!(drive.object_count(), 1);
    }

    #[tokio::test]
    async fn test_update_and_download() {
        let drive = MemoryDrive::new();
        let id = drive.seed_object("doc.json", b"[]", &[]);

        drive
            .update_content(&id, "application/json", b"[1,2]")
            .await
            .unwrap();
        assert_eq!(drive.download(&id).await.unwrap(), b"[1,2]");

        let err = drive.download("missing").await.unwrap_err();
        assert!(err.is_not_found());
    }
}
