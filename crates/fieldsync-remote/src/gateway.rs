//! Content-addressed object gateway.
//!
//! Sits between the engine and the raw drive capability, adding the
//! semantics the sync engine actually needs: idempotent find-or-create by
//! content hash, hash → identifier resolution through the local catalog, and
//! small-JSON document read/write at a conventional per-account location.
//!
//! Idempotence of `find_or_create_by_hash` rests on two invariants: the
//! search runs before the create, and every created object is tagged with
//! its hash in the same request. Re-running the operation therefore finds
//! the earlier object instead of creating a second one.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use fieldsync_core::{
    defaults, sanitize_display_name, CatalogEntry, CatalogStore, DriveQuery, Error, ObjectMeta,
    RemoteDrive, RemoteObject, Result, StoredObject,
};

/// A JSON document fetched from the remote store.
#[derive(Debug, Clone)]
pub struct JsonDocument<T> {
    pub remote_id: String,
    pub data: T,
}

/// Gateway over a [`RemoteDrive`] implementing dedup and document ops.
pub struct ObjectGateway {
    drive: Arc<dyn RemoteDrive>,
    catalog: Arc<dyn CatalogStore>,
    root_folder: String,
    /// Folder-name → id cache, keyed by "" for the root itself.
    folder_ids: Mutex<HashMap<String, String>>,
}

impl ObjectGateway {
    pub fn new(
        drive: Arc<dyn RemoteDrive>,
        catalog: Arc<dyn CatalogStore>,
        root_folder: impl Into<String>,
    ) -> Self {
        Self {
            drive,
            catalog,
            root_folder: root_folder.into(),
            folder_ids: Mutex::new(HashMap::new()),
        }
    }

    /// Whether remote operations can currently be attempted.
    pub fn is_ready(&self) -> bool {
        self.drive.is_authenticated()
    }

    /// Forget cached folder ids (after an account switch).
    pub async fn reset_folder_cache(&self) {
        self.folder_ids.lock().await.clear();
    }

    /// Id of the per-account root folder, creating it on first use.
    async fn ensure_root(&self) -> Result<String> {
        let mut cache = self.folder_ids.lock().await;
        if let Some(id) = cache.get("") {
            return Ok(id.clone());
        }
        let id = self.drive.ensure_folder(&self.root_folder, None).await?;
        cache.insert(String::new(), id.clone());
        Ok(id)
    }

    /// Id of a module subfolder under the root; the root itself when no
    /// module is given.
    async fn ensure_module_folder(&self, module: Option<&str>) -> Result<String> {
        let module = module.map(str::trim).filter(|m| !m.is_empty());
        let Some(module) = module else {
            return self.ensure_root().await;
        };

        let root = self.ensure_root().await?;
        let mut cache = self.folder_ids.lock().await;
        if let Some(id) = cache.get(module) {
            return Ok(id.clone());
        }
        let id = self.drive.ensure_folder(module, Some(&root)).await?;
        cache.insert(module.to_string(), id.clone());
        Ok(id)
    }

    /// Search for an object tagged with `hash`, first under the canonical
    /// key, then under the legacy key. Legacy hits are re-tagged with the
    /// canonical key (best effort) so the dual-key period converges.
    async fn find_by_hash_tag(
        &self,
        hash: &str,
        parent: Option<&str>,
    ) -> Result<Option<RemoteObject>> {
        let mut query = DriveQuery::by_tag(defaults::TAG_CONTENT_HASH, hash);
        if let Some(parent) = parent {
            query = query.in_parent(parent);
        }
        if let Some(hit) = self.drive.find(&query).await?.into_iter().next() {
            return Ok(Some(hit));
        }

        let mut legacy = DriveQuery::by_tag(defaults::TAG_LEGACY_HASH, hash);
        if let Some(parent) = parent {
            legacy = legacy.in_parent(parent);
        }
        if let Some(hit) = self.drive.find(&legacy).await?.into_iter().next() {
            let mut tags = BTreeMap::new();
            tags.insert(defaults::TAG_CONTENT_HASH.to_string(), hash.to_string());
            if let Err(e) = self.drive.update_tags(&hit.id, &tags).await {
                warn!(
                    subsystem = "remote",
                    component = "gateway",
                    op = "reconcile_tag",
                    remote_id = %hit.id,
                    error = %e,
                    "Failed to re-tag legacy object"
                );
            }
            return Ok(Some(hit));
        }
        Ok(None)
    }

    /// Record a hash → id mapping in the catalog. Cache failures must never
    /// fail the upload that produced them.
    async fn remember(&self, hash: &str, remote_id: &str, name: &str, size: i64, media_type: &str) {
        let entry = CatalogEntry {
            content_hash: hash.to_string(),
            remote_id: remote_id.to_string(),
            name: name.to_string(),
            size,
            media_type: media_type.to_string(),
            cached_at: Utc::now(),
        };
        if let Err(e) = self.catalog.upsert(entry).await {
            warn!(
                subsystem = "remote",
                component = "gateway",
                op = "remember",
                content_hash = hash,
                error = %e,
                "Failed to update catalog"
            );
        }
    }

    /// Upload a document, reusing an existing remote object with the same
    /// content hash when one exists.
    ///
    /// Calling this twice with the same hash yields the same identifier both
    /// times; the second call reports `deduped = true`.
    pub async fn find_or_create_by_hash(
        &self,
        data: &[u8],
        hash: &str,
        display_name: &str,
        module: Option<&str>,
    ) -> Result<StoredObject> {
        let safe_name = sanitize_display_name(display_name);
        let object_name = format!("{hash}__{safe_name}");
        let folder = self.ensure_module_folder(module).await?;

        // Search before create: subfolder first, then anywhere.
        let existing = match self.find_by_hash_tag(hash, Some(&folder)).await? {
            Some(hit) => Some(hit),
            None => self.find_by_hash_tag(hash, None).await?,
        };
        if let Some(hit) = existing {
            debug!(
                subsystem = "remote",
                component = "gateway",
                op = "find_or_create",
                content_hash = hash,
                remote_id = %hit.id,
                deduped = true,
                "Reusing existing remote object"
            );
            self.remember(hash, &hit.id, &hit.name, data.len() as i64, &hit.media_type)
                .await;
            return Ok(StoredObject {
                remote_id: hit.id,
                name: hit.name,
                deduped: true,
            });
        }

        let media_type = fieldsync_core::detect_media_type(display_name, data, "");
        let mut meta = ObjectMeta::new(&object_name, &media_type)
            .in_parent(&folder)
            .tagged(defaults::TAG_CONTENT_HASH, hash);
        if let Some(module) = module {
            meta = meta.tagged(defaults::TAG_MODULE, module);
        }

        let created = self.drive.create_object_resumable(&meta, data).await?;
        info!(
            subsystem = "remote",
            component = "gateway",
            op = "find_or_create",
            content_hash = hash,
            remote_id = %created.id,
            size = data.len(),
            deduped = false,
            "Uploaded new remote object"
        );
        self.remember(hash, &created.id, &created.name, data.len() as i64, &media_type)
            .await;
        Ok(StoredObject {
            remote_id: created.id,
            name: created.name,
            deduped: false,
        })
    }

    /// Resolve a content hash to a remote identifier, checking the local
    /// catalog, then the deterministic object name, then the hash tag.
    ///
    /// `None` means "not stored remotely yet" and is a valid outcome.
    pub async fn resolve_id_by_hash(&self, hash: &str) -> Result<Option<String>> {
        match self.catalog.get(hash).await {
            Ok(Some(entry)) => return Ok(Some(entry.remote_id)),
            Ok(None) => {}
            Err(e) => warn!(
                subsystem = "remote",
                component = "gateway",
                op = "resolve",
                content_hash = hash,
                error = %e,
                "Catalog lookup failed, falling through to remote search"
            ),
        }

        if !self.is_ready() {
            return Ok(None);
        }

        // Objects are named "{hash}__{original}"; accept "{hash}.ext" from
        // earlier clients as well.
        let by_name = self
            .drive
            .find(&DriveQuery::by_name_contains(hash))
            .await?
            .into_iter()
            .find(|obj| {
                obj.name.starts_with(&format!("{hash}__")) || obj.name.starts_with(&format!("{hash}."))
            });
        if let Some(hit) = by_name {
            self.remember(hash, &hit.id, &hit.name, hit.size.unwrap_or(0), &hit.media_type)
                .await;
            return Ok(Some(hit.id));
        }

        if let Some(hit) = self.find_by_hash_tag(hash, None).await? {
            self.remember(hash, &hit.id, &hit.name, hit.size.unwrap_or(0), &hit.media_type)
                .await;
            return Ok(Some(hit.id));
        }

        Ok(None)
    }

    /// Read a small JSON document from the per-account root folder.
    pub async fn get_json<T: DeserializeOwned>(&self, name: &str) -> Result<Option<JsonDocument<T>>> {
        let root = self.ensure_root().await?;
        let hits = self
            .drive
            .find(&DriveQuery::by_name(name).in_parent(&root))
            .await?;
        let Some(hit) = hits.into_iter().next() else {
            return Ok(None);
        };

        let bytes = self.drive.download(&hit.id).await?;
        let data = serde_json::from_slice(&bytes)
            .map_err(|e| Error::Serialization(format!("{name}: {e}")))?;
        Ok(Some(JsonDocument {
            remote_id: hit.id,
            data,
        }))
    }

    /// Write a small JSON document into the per-account root folder,
    /// creating it on first write.
    pub async fn put_json<T: Serialize>(&self, name: &str, value: &T) -> Result<String> {
        let root = self.ensure_root().await?;
        let bytes = serde_json::to_vec(value)?;

        let existing = self
            .drive
            .find(&DriveQuery::by_name(name).in_parent(&root))
            .await?
            .into_iter()
            .next();

        let remote_id = match existing {
            Some(hit) => {
                self.drive
                    .update_content(&hit.id, "application/json", &bytes)
                    .await?;
                hit.id
            }
            None => {
                let meta = ObjectMeta::new(name, "application/json").in_parent(&root);
                self.drive.create_object(&meta, &bytes).await?.id
            }
        };
        debug!(
            subsystem = "remote",
            component = "gateway",
            op = "put_json",
            remote_id = %remote_id,
            name,
            size = bytes.len(),
            "Wrote JSON document"
        );
        Ok(remote_id)
    }

    /// Fetch the raw bytes of a remote object.
    pub async fn download_blob(&self, remote_id: &str) -> Result<Vec<u8>> {
        self.drive.download(remote_id).await
    }
}
