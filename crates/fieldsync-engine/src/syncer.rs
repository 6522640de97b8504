//! Manifest synchronization between the local state table and the remote
//! per-account manifest document.
//!
//! The primary manifest is `{rev, data}`: whichever copy carries the greater
//! revision is authoritative and replaces the other wholesale. A remote copy
//! that lost a race (its rev is behind the local one) is healed by pushing
//! the local array under a freshly minted revision. Legacy per-module
//! history documents carry no revision and are merged record-by-record.
//!
//! Both directions are silent no-ops without an authenticated session: the
//! engine works fully offline and reconciles on the next sign-in.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use fieldsync_core::{
    defaults, merge_records, next_rev, Manifest, ManifestRecord, ModuleHistory, Namespace,
    Result, StateStore, SyncBus, SyncEvent,
};
use fieldsync_remote::ObjectGateway;

/// Pull/push of the per-account history manifest.
pub struct ManifestSyncer {
    namespace: Namespace,
    state: Arc<dyn StateStore>,
    gateway: Arc<ObjectGateway>,
    bus: SyncBus,
    push_debounce: Duration,
    push_timer: Mutex<Option<JoinHandle<()>>>,
}

impl ManifestSyncer {
    pub fn new(
        namespace: Namespace,
        state: Arc<dyn StateStore>,
        gateway: Arc<ObjectGateway>,
        bus: SyncBus,
        push_debounce: Duration,
    ) -> Arc<Self> {
        Arc::new(Self {
            namespace,
            state,
            gateway,
            bus,
            push_debounce,
            push_timer: Mutex::new(None),
        })
    }

    fn history_key(&self) -> String {
        self.namespace.scoped_key(defaults::HISTORY_KEY)
    }

    fn rev_key(&self) -> String {
        self.namespace.scoped_key(defaults::HISTORY_REV_KEY)
    }

    /// Read the local history array. Absent or unparseable state reads as
    /// empty; corrupted local state must not wedge the sync loop.
    pub async fn read_local(&self) -> Result<Vec<ManifestRecord>> {
        let raw = self.state.get(&self.history_key()).await?;
        let Some(raw) = raw else {
            return Ok(Vec::new());
        };
        match serde_json::from_str(&raw) {
            Ok(records) => Ok(records),
            Err(e) => {
                warn!(
                    subsystem = "engine",
                    component = "syncer",
                    op = "read_local",
                    account = self.namespace.account_id(),
                    error = %e,
                    "Local history unparseable, treating as empty"
                );
                Ok(Vec::new())
            }
        }
    }

    /// Write the local history under the account-scoped key and mirror it to
    /// the unscoped alias key for pre-namespacing readers.
    async fn write_local(&self, records: &[ManifestRecord]) -> Result<()> {
        let json = serde_json::to_string(records)?;
        self.state.set(&self.history_key(), &json).await?;
        self.state.set(defaults::HISTORY_KEY, &json).await?;
        Ok(())
    }

    async fn local_rev(&self) -> Result<i64> {
        let raw = self.state.get(&self.rev_key()).await?;
        Ok(raw.and_then(|v| v.parse::<i64>().ok()).unwrap_or(0))
    }

    async fn set_local_rev(&self, rev: i64) -> Result<()> {
        let value = rev.to_string();
        self.state.set(&self.rev_key(), &value).await?;
        self.state.set(defaults::HISTORY_REV_KEY, &value).await?;
        Ok(())
    }

    /// Reconcile local history with the remote manifest.
    ///
    /// Remote rev ahead (or equal): the remote copy replaces local state.
    /// Remote rev behind: the remote copy lost a write race and is healed
    /// with the local array under a fresh revision. No session: returns the
    /// local array untouched.
    pub async fn pull(&self) -> Result<Vec<ManifestRecord>> {
        let local = self.read_local().await?;
        if !self.gateway.is_ready() {
            debug!(
                subsystem = "engine",
                component = "syncer",
                op = "pull",
                account = self.namespace.account_id(),
                "Offline, returning local history"
            );
            return Ok(local);
        }

        let manifest_name = self.namespace.manifest_name();
        match self.gateway.get_json::<Manifest>(&manifest_name).await {
            Ok(Some(document)) => {
                let remote = document.data;
                let local_rev = self.local_rev().await?;
                if remote.rev >= local_rev {
                    self.write_local(&remote.data).await?;
                    self.set_local_rev(remote.rev).await?;
                    info!(
                        subsystem = "engine",
                        component = "syncer",
                        op = "pull",
                        account = self.namespace.account_id(),
                        rev = remote.rev,
                        records = remote.data.len(),
                        "Adopted remote history"
                    );
                    self.bus.emit(SyncEvent::ManifestPulled {
                        records: remote.data.len(),
                    });
                    Ok(remote.data)
                } else {
                    debug!(
                        subsystem = "engine",
                        component = "syncer",
                        op = "pull",
                        account = self.namespace.account_id(),
                        remote_rev = remote.rev,
                        local_rev,
                        "Remote behind local, healing"
                    );
                    if let Err(e) = self.push_now().await {
                        warn!(
                            subsystem = "engine",
                            component = "syncer",
                            op = "heal",
                            error = %e,
                            "Failed to heal stale remote manifest"
                        );
                    }
                    Ok(local)
                }
            }
            Ok(None) => {
                if !local.is_empty() {
                    if let Err(e) = self.push_now().await {
                        warn!(
                            subsystem = "engine",
                            component = "syncer",
                            op = "seed",
                            error = %e,
                            "Failed to seed remote manifest"
                        );
                    }
                }
                Ok(local)
            }
            Err(e) if e.is_unauthorized() => Err(e),
            Err(e) => {
                warn!(
                    subsystem = "engine",
                    component = "syncer",
                    op = "pull",
                    account = self.namespace.account_id(),
                    error = %e,
                    "Manifest pull failed, keeping local history"
                );
                Ok(local)
            }
        }
    }

    /// Merge a legacy per-module history document into the local array,
    /// record by record, then schedule a push of the merged result.
    pub async fn pull_module(self: &Arc<Self>, module: &str) -> Result<Vec<ManifestRecord>> {
        let local = self.read_local().await?;
        if !self.gateway.is_ready() {
            return Ok(local);
        }

        let name = self.namespace.module_history_name(module);
        match self.gateway.get_json::<ModuleHistory>(&name).await {
            Ok(Some(document)) => {
                let merged = merge_records(&local, &document.data.data);
                self.write_local(&merged).await?;
                self.queue_push();
                Ok(merged)
            }
            Ok(None) => Ok(local),
            Err(e) if e.is_unauthorized() => Err(e),
            Err(e) => {
                warn!(
                    subsystem = "engine",
                    component = "syncer",
                    op = "pull_module",
                    error = %e,
                    "Module history pull failed"
                );
                Ok(local)
            }
        }
    }

    /// Push the local history to the remote manifest immediately.
    ///
    /// Mints a revision strictly greater than the current local one and
    /// persists it only after the remote write succeeded. Silent no-op
    /// (returning the unchanged rev) without a session.
    pub async fn push_now(&self) -> Result<i64> {
        let current = self.local_rev().await?;
        if !self.gateway.is_ready() {
            return Ok(current);
        }

        let records = self.read_local().await?;
        let rev = next_rev(current);
        let manifest = Manifest {
            rev,
            data: records,
        };
        self.gateway
            .put_json(&self.namespace.manifest_name(), &manifest)
            .await?;
        self.set_local_rev(rev).await?;
        info!(
            subsystem = "engine",
            component = "syncer",
            op = "push",
            account = self.namespace.account_id(),
            rev,
            records = manifest.data.len(),
            "Pushed history manifest"
        );
        self.bus.emit(SyncEvent::ManifestPushed { rev });
        Ok(rev)
    }

    /// Schedule a debounced push, coalescing bursts of local edits.
    pub fn queue_push(self: &Arc<Self>) {
        let mut timer = self
            .push_timer
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = timer.take() {
            previous.abort();
        }

        let syncer = Arc::clone(self);
        *timer = Some(tokio::spawn(async move {
            tokio::time::sleep(syncer.push_debounce).await;
            if let Err(e) = syncer.push_now().await {
                warn!(
                    subsystem = "engine",
                    component = "syncer",
                    op = "queued_push",
                    error = %e,
                    "Debounced manifest push failed"
                );
            }
        }));
    }

    /// Append a record from a successful document intake, deduplicating by
    /// content hash with a name+size fallback for entries that predate
    /// hashing. Returns the resulting array.
    pub async fn record_intake(
        self: &Arc<Self>,
        record: ManifestRecord,
    ) -> Result<Vec<ManifestRecord>> {
        let mut local = self.read_local().await?;

        let duplicate = local.iter().any(|existing| {
            let hash_match =
                record.content_hash.is_some() && existing.content_hash == record.content_hash;
            let legacy_match = match (record.file_name.as_deref(), record.size) {
                (Some(name), Some(size)) => existing.matches_legacy(name, size),
                _ => false,
            };
            hash_match || legacy_match
        });
        if duplicate {
            debug!(
                subsystem = "engine",
                component = "syncer",
                op = "record_intake",
                account = self.namespace.account_id(),
                "Document already in history"
            );
            return Ok(local);
        }

        local.insert(0, record);
        self.write_local(&local).await?;
        self.queue_push();
        Ok(local)
    }

    /// Replace the local history wholesale (deletions, bulk edits) and
    /// schedule a push.
    pub async fn replace(self: &Arc<Self>, records: Vec<ManifestRecord>) -> Result<Vec<ManifestRecord>> {
        self.write_local(&records).await?;
        self.queue_push();
        Ok(records)
    }

    /// Clear the history locally and, best effort, remotely.
    pub async fn reset(&self) -> Result<()> {
        self.write_local(&[]).await?;
        let rev = next_rev(self.local_rev().await?);
        self.set_local_rev(rev).await?;

        if self.gateway.is_ready() {
            let empty = Manifest {
                rev,
                data: Vec::new(),
            };
            if let Err(e) = self
                .gateway
                .put_json(&self.namespace.manifest_name(), &empty)
                .await
            {
                warn!(
                    subsystem = "engine",
                    component = "syncer",
                    op = "reset",
                    error = %e,
                    "Failed to reset remote manifest"
                );
            }
        }
        info!(
            subsystem = "engine",
            component = "syncer",
            op = "reset",
            account = self.namespace.account_id(),
            rev,
            "History reset"
        );
        Ok(())
    }

    /// Abort any pending debounced push. Used when the account context this
    /// syncer belongs to is being replaced.
    pub fn shutdown(&self) {
        if let Some(timer) = self
            .push_timer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            timer.abort();
        }
    }
}
