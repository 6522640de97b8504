//! The sync engine facade.
//!
//! One `SyncEngine` owns one account's context (database, queue, catalog,
//! gateway) plus the scheduler and syncer built over it. All state lives in
//! the context object; switching accounts swaps the context and re-pulls the
//! manifest, so nothing leaks between accounts.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex, PoisonError};

use tokio::sync::broadcast::error::RecvError;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use fieldsync_core::{
    validate_payload, DocumentPayload, DrainSummary, Error, IdentityProvider, ManifestRecord,
    Namespace, QueueJob, RemoteDrive, Result, SyncBus, SyncEvent, UploadOutcome,
};

use crate::context::{EngineConfig, EngineContext};
use crate::flusher::{FlushConfig, UploadScheduler};
use crate::syncer::ManifestSyncer;

/// Per-account working set: context plus the workers built over it.
#[derive(Clone)]
struct EngineState {
    ctx: Arc<EngineContext>,
    flusher: Arc<UploadScheduler>,
    syncer: Arc<ManifestSyncer>,
}

/// The engine facade exposed to collaborators.
pub struct SyncEngine {
    config: EngineConfig,
    identity: Arc<dyn IdentityProvider>,
    drive: Arc<dyn RemoteDrive>,
    bus: SyncBus,
    online: AtomicBool,
    started: AtomicBool,
    state: RwLock<EngineState>,
    tasks: StdMutex<Vec<JoinHandle<()>>>,
}

impl SyncEngine {
    /// Open the engine for the currently signed-in account (or the anonymous
    /// namespace when nobody is).
    pub async fn open(
        config: EngineConfig,
        identity: Arc<dyn IdentityProvider>,
        drive: Arc<dyn RemoteDrive>,
        bus: SyncBus,
    ) -> Result<Arc<Self>> {
        let namespace = Namespace::resolve(identity.account_id().as_deref());
        let state = Self::build_state(&config, namespace, &drive, &bus).await?;

        Ok(Arc::new(Self {
            config,
            identity,
            drive,
            bus,
            online: AtomicBool::new(true),
            started: AtomicBool::new(false),
            state: RwLock::new(state),
            tasks: StdMutex::new(Vec::new()),
        }))
    }

    async fn build_state(
        config: &EngineConfig,
        namespace: Namespace,
        drive: &Arc<dyn RemoteDrive>,
        bus: &SyncBus,
    ) -> Result<EngineState> {
        let ctx = EngineContext::open(config, namespace, drive.clone()).await?;
        let flusher = UploadScheduler::new(
            ctx.queue.clone(),
            ctx.gateway.clone(),
            bus.clone(),
            FlushConfig {
                debounce: config.flush_debounce,
                page_limit: config.queue_page_limit,
                backoff_unit: config.backoff_unit,
                backoff_cap: config.backoff_cap,
                jitter_ms: config.backoff_jitter_ms,
            },
        );
        let syncer = ManifestSyncer::new(
            ctx.namespace.clone(),
            ctx.state.clone(),
            ctx.gateway.clone(),
            bus.clone(),
            config.push_debounce,
        );
        Ok(EngineState {
            ctx,
            flusher,
            syncer,
        })
    }

    async fn snapshot(&self) -> EngineState {
        self.state.read().await.clone()
    }

    /// The event bus this engine listens on and publishes to.
    pub fn bus(&self) -> SyncBus {
        self.bus.clone()
    }

    /// Account id of the active context.
    pub async fn account_id(&self) -> String {
        self.state.read().await.ctx.namespace.account_id().to_string()
    }

    /// Record a connectivity change and broadcast it (a restored connection
    /// re-arms the scheduler through the bus).
    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
        self.bus.emit(SyncEvent::ConnectivityChanged { online });
    }

    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    /// Spawn the background reactions: the bus listener (drain triggers,
    /// account switches) and the identity poll watcher. Idempotent.
    pub fn start(self: &Arc<Self>) {
        if self.started.swap(true, Ordering::SeqCst) {
            return;
        }

        let engine = Arc::clone(self);
        let mut rx = self.bus.subscribe();
        let listener = tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(envelope) => engine.handle_event(envelope.payload).await,
                    Err(RecvError::Lagged(_)) => continue,
                    Err(RecvError::Closed) => break,
                }
            }
        });

        let engine = Arc::clone(self);
        let poll = self.config.identity_poll_interval;
        let watcher = tokio::spawn(async move {
            let mut interval = tokio::time::interval(poll);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                if let Err(e) = engine.resync_account().await {
                    warn!(
                        subsystem = "engine",
                        component = "engine",
                        op = "identity_watch",
                        error = %e,
                        "Account resync failed"
                    );
                }
            }
        });

        self.tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend([listener, watcher]);
    }

    /// Stop background tasks and pending timers.
    pub async fn shutdown(&self) {
        for task in self
            .tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
        {
            task.abort();
        }
        let state = self.snapshot().await;
        state.flusher.shutdown();
        state.syncer.shutdown();
        self.started.store(false, Ordering::SeqCst);
    }

    async fn handle_event(&self, event: SyncEvent) {
        match &event {
            SyncEvent::ConnectivityChanged { online } => {
                self.online.store(*online, Ordering::SeqCst);
            }
            SyncEvent::AccountChanged { .. } | SyncEvent::VisibilityChanged { visible: true } => {
                if let Err(e) = self.resync_account().await {
                    warn!(
                        subsystem = "engine",
                        component = "engine",
                        op = "handle_event",
                        error = %e,
                        "Account resync failed"
                    );
                }
            }
            _ => {}
        }

        if event.is_flush_trigger() {
            self.flush_soon().await;
        }
    }

    /// Upload a document now when possible, otherwise enqueue it.
    ///
    /// The direct path requires connectivity and a remote session; any
    /// failure along it falls back to the durable queue, so a document
    /// handed to this method is never lost. The returned outcome tells the
    /// caller which path was taken.
    pub async fn upload_or_queue(
        &self,
        payload: DocumentPayload,
        content_hash: &str,
    ) -> Result<UploadOutcome> {
        let verdict = validate_payload(&payload.display_name, &payload.bytes);
        if !verdict.allowed {
            return Err(Error::InvalidInput(
                verdict
                    .block_reason
                    .unwrap_or_else(|| "payload rejected".to_string()),
            ));
        }

        let state = self.snapshot().await;

        if self.is_online() && state.ctx.gateway.is_ready() {
            match state
                .ctx
                .gateway
                .find_or_create_by_hash(
                    &payload.bytes,
                    content_hash,
                    &payload.display_name,
                    payload.module.as_deref(),
                )
                .await
            {
                Ok(stored) => {
                    self.bus.emit(SyncEvent::JobUploaded {
                        job_id: None,
                        remote_id: stored.remote_id.clone(),
                        deduped: stored.deduped,
                    });
                    return Ok(UploadOutcome::uploaded(stored));
                }
                Err(e) => {
                    warn!(
                        subsystem = "engine",
                        component = "engine",
                        op = "upload_or_queue",
                        content_hash,
                        error = %e,
                        "Direct upload failed, falling back to queue"
                    );
                }
            }
        }

        let job_id = state
            .ctx
            .queue
            .enqueue(payload, Some(content_hash.to_string()))
            .await?;
        self.bus.emit(SyncEvent::JobQueued {
            job_id,
            content_hash: Some(content_hash.to_string()),
        });
        state.flusher.schedule();
        Ok(UploadOutcome::queued(job_id))
    }

    /// Resolve a content hash to its remote identifier, if the document has
    /// ever reached the remote store. `None` is a valid miss.
    pub async fn resolve_remote_id(&self, content_hash: &str) -> Result<Option<String>> {
        let state = self.snapshot().await;
        state.ctx.gateway.resolve_id_by_hash(content_hash).await
    }

    /// Re-fetch a document's bytes from the remote store by content hash.
    pub async fn fetch_document(&self, content_hash: &str) -> Result<Option<Vec<u8>>> {
        let state = self.snapshot().await;
        match state.ctx.gateway.resolve_id_by_hash(content_hash).await? {
            Some(remote_id) => Ok(Some(state.ctx.gateway.download_blob(&remote_id).await?)),
            None => Ok(None),
        }
    }

    /// Reconcile local history with the remote manifest and return the
    /// resulting array.
    pub async fn pull_manifest(&self) -> Result<Vec<ManifestRecord>> {
        let state = self.snapshot().await;
        state.syncer.pull().await
    }

    /// Merge a legacy per-module history document into the local array.
    pub async fn pull_module_history(&self, module: &str) -> Result<Vec<ManifestRecord>> {
        let state = self.snapshot().await;
        state.syncer.pull_module(module).await
    }

    /// Schedule a debounced push of the local history (fire and forget).
    pub async fn push_manifest(&self) {
        let state = self.snapshot().await;
        state.syncer.queue_push();
    }

    /// Push the local history immediately, returning the new revision.
    pub async fn push_manifest_now(&self) -> Result<i64> {
        let state = self.snapshot().await;
        state.syncer.push_now().await
    }

    /// Current local history without touching the remote.
    pub async fn local_history(&self) -> Result<Vec<ManifestRecord>> {
        let state = self.snapshot().await;
        state.syncer.read_local().await
    }

    /// Record a successfully ingested document in the history and schedule a
    /// push. History is recorded even when the payload failed to persist
    /// locally; the bytes can be re-fetched from the remote store later.
    pub async fn record_intake(&self, record: ManifestRecord) -> Result<Vec<ManifestRecord>> {
        let state = self.snapshot().await;
        state.syncer.record_intake(record).await
    }

    /// Replace the local history wholesale (deletions, bulk edits) and
    /// schedule a push.
    pub async fn replace_history(
        &self,
        records: Vec<ManifestRecord>,
    ) -> Result<Vec<ManifestRecord>> {
        let state = self.snapshot().await;
        state.syncer.replace(records).await
    }

    /// Clear history and catalog for the active account, resetting the
    /// remote manifest copy as well (best effort).
    pub async fn reset_history(&self) -> Result<()> {
        let state = self.snapshot().await;
        state.syncer.reset().await?;
        state.ctx.catalog.clear().await?;
        Ok(())
    }

    /// Pending jobs, for diagnostics and UI badges.
    pub async fn list_pending_jobs(&self) -> Result<Vec<QueueJob>> {
        let state = self.snapshot().await;
        state.ctx.queue.pending(self.config.queue_page_limit).await
    }

    /// Number of pending jobs.
    pub async fn pending_count(&self) -> Result<i64> {
        let state = self.snapshot().await;
        state.ctx.queue.pending_count().await
    }

    /// Drop every queued job (external purge).
    pub async fn purge_queue(&self) -> Result<i64> {
        let state = self.snapshot().await;
        state.ctx.queue.clear_all().await
    }

    /// Run one drain cycle immediately.
    pub async fn drain_now(&self) -> Result<DrainSummary> {
        let state = self.snapshot().await;
        state.flusher.drain().await
    }

    /// Schedule a debounced drain.
    pub async fn flush_soon(&self) {
        let state = self.snapshot().await;
        state.flusher.schedule();
    }

    /// Re-derive the namespace from the identity capability and, when it
    /// changed, swap in a fresh account context and re-pull the manifest.
    ///
    /// This is the explicit resynchronization step for account switches:
    /// the old pool is closed, pending timers are aborted, and nothing from
    /// the previous account survives into the new context.
    pub async fn resync_account(&self) -> Result<()> {
        let namespace = Namespace::resolve(self.identity.account_id().as_deref());
        {
            let state = self.state.read().await;
            if state.ctx.namespace == namespace {
                return Ok(());
            }
        }

        let fresh = Self::build_state(&self.config, namespace.clone(), &self.drive, &self.bus)
            .await?;

        let previous = {
            let mut guard = self.state.write().await;
            if guard.ctx.namespace == namespace {
                // Another resync won the race; discard our fresh context.
                fresh.ctx.close().await;
                return Ok(());
            }
            std::mem::replace(&mut *guard, fresh)
        };

        previous.flusher.shutdown();
        previous.syncer.shutdown();
        previous.ctx.close().await;

        info!(
            subsystem = "engine",
            component = "engine",
            op = "resync_account",
            account = namespace.account_id(),
            "Switched account context"
        );
        self.bus.emit(SyncEvent::AccountChanged {
            account_id: namespace.account_id().to_string(),
        });

        if let Err(e) = self.pull_manifest().await {
            warn!(
                subsystem = "engine",
                component = "engine",
                op = "resync_account",
                error = %e,
                "Manifest pull after account switch failed"
            );
        }
        Ok(())
    }
}
