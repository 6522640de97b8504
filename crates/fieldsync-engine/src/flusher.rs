//! Upload scheduler: drains the pending queue against the remote store.
//!
//! One drain cycle fetches a bounded page of pending jobs, oldest first, and
//! attempts each in turn with a per-job backoff derived from its failure
//! count. A job failure records the attempt and moves on; it never aborts
//! the cycle. An atomic guard keeps at most one drain running; a trigger
//! arriving mid-drain is a no-op, since the next scheduled drain will pick up
//! whatever is left.
//!
//! Drains are scheduled through a debounced timer so bursts of triggers
//! (connectivity flapping, repeated auth events) coalesce into one pass.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use rand::Rng;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use fieldsync_core::{
    defaults, hash_bytes, DrainSummary, QueueStore, Result, SyncBus, SyncEvent,
};
use fieldsync_remote::ObjectGateway;

/// Tuning knobs for the scheduler.
#[derive(Debug, Clone)]
pub struct FlushConfig {
    /// Coalescing window for [`UploadScheduler::schedule`].
    pub debounce: Duration,
    /// Maximum jobs fetched per drain.
    pub page_limit: i64,
    /// Per-attempt backoff unit.
    pub backoff_unit: Duration,
    /// Cap on the backoff delay.
    pub backoff_cap: Duration,
    /// Random jitter added to every backoff delay.
    pub jitter_ms: u64,
}

impl Default for FlushConfig {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(defaults::FLUSH_DEBOUNCE_MS),
            page_limit: defaults::QUEUE_PAGE_LIMIT,
            backoff_unit: Duration::from_millis(defaults::BACKOFF_UNIT_MS),
            backoff_cap: Duration::from_millis(defaults::BACKOFF_MAX_MS),
            jitter_ms: defaults::BACKOFF_JITTER_MS,
        }
    }
}

/// Drains the pending-upload queue with backoff and mutual exclusion.
pub struct UploadScheduler {
    queue: Arc<dyn QueueStore>,
    gateway: Arc<ObjectGateway>,
    bus: SyncBus,
    config: FlushConfig,
    draining: AtomicBool,
    timer: Mutex<Option<JoinHandle<()>>>,
}

impl UploadScheduler {
    pub fn new(
        queue: Arc<dyn QueueStore>,
        gateway: Arc<ObjectGateway>,
        bus: SyncBus,
        config: FlushConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            queue,
            gateway,
            bus,
            config,
            draining: AtomicBool::new(false),
            timer: Mutex::new(None),
        })
    }

    /// Backoff before retrying a job that already failed `attempts` times:
    /// `min(cap, attempts × unit)` plus jitter. A fresh job waits only for
    /// the jitter-free zero delay.
    pub fn backoff_delay(attempts: i64, config: &FlushConfig) -> Duration {
        let unit_ms = config.backoff_unit.as_millis() as u64;
        let base = unit_ms.saturating_mul(attempts.max(0) as u64);
        let capped = base.min(config.backoff_cap.as_millis() as u64);
        let jitter = if config.jitter_ms > 0 {
            rand::thread_rng().gen_range(0..config.jitter_ms)
        } else {
            0
        };
        Duration::from_millis(capped + jitter)
    }

    /// Run one drain cycle now. Returns a skipped summary when another drain
    /// holds the guard.
    pub async fn drain(&self) -> Result<DrainSummary> {
        if self
            .draining
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!(
                subsystem = "engine",
                component = "flusher",
                op = "drain",
                "Drain already running, skipping"
            );
            return Ok(DrainSummary {
                skipped: true,
                ..DrainSummary::default()
            });
        }

        let result = self.drain_inner().await;
        self.draining.store(false, Ordering::SeqCst);
        result
    }

    async fn drain_inner(&self) -> Result<DrainSummary> {
        let mut summary = DrainSummary::default();

        if !self.gateway.is_ready() {
            debug!(
                subsystem = "engine",
                component = "flusher",
                op = "drain",
                "No remote session, leaving queue untouched"
            );
            return Ok(summary);
        }

        let jobs = self.queue.pending(self.config.page_limit).await?;
        if jobs.is_empty() {
            return Ok(summary);
        }

        info!(
            subsystem = "engine",
            component = "flusher",
            op = "drain",
            pending = jobs.len(),
            "Draining upload queue"
        );

        for job in jobs {
            summary.attempted += 1;

            let delay = Self::backoff_delay(job.attempts, &self.config);
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }

            // Jobs enqueued before hashing was possible get fingerprinted
            // here, where the bytes are at hand anyway.
            let hash = match &job.content_hash {
                Some(hash) => hash.clone(),
                None => hash_bytes(&job.payload.bytes),
            };

            match self
                .gateway
                .find_or_create_by_hash(
                    &job.payload.bytes,
                    &hash,
                    &job.payload.display_name,
                    job.payload.module.as_deref(),
                )
                .await
            {
                Ok(stored) => {
                    if let Err(e) = self.queue.mark_success(job.id).await {
                        error!(
                            subsystem = "engine",
                            component = "flusher",
                            job_id = job.id,
                            error = %e,
                            "Failed to delete completed job"
                        );
                    }
                    summary.uploaded += 1;
                    self.bus.emit(SyncEvent::JobUploaded {
                        job_id: Some(job.id),
                        remote_id: stored.remote_id,
                        deduped: stored.deduped,
                    });
                }
                Err(e) => {
                    warn!(
                        subsystem = "engine",
                        component = "flusher",
                        job_id = job.id,
                        attempts = job.attempts + 1,
                        error = %e,
                        "Upload attempt failed, job stays queued"
                    );
                    if let Err(mark_err) = self.queue.mark_failure(job.id, &e.to_string()).await {
                        error!(
                            subsystem = "engine",
                            component = "flusher",
                            job_id = job.id,
                            error = %mark_err,
                            "Failed to record job failure"
                        );
                    }
                    summary.failed += 1;
                    self.bus.emit(SyncEvent::JobRetried {
                        job_id: job.id,
                        attempts: job.attempts + 1,
                        error: e.to_string(),
                    });
                }
            }
        }

        let pending = self.queue.pending_count().await.unwrap_or(0);
        self.bus.emit(SyncEvent::QueueStatus { pending });

        info!(
            subsystem = "engine",
            component = "flusher",
            op = "drain",
            attempted = summary.attempted,
            uploaded = summary.uploaded,
            failed = summary.failed,
            pending,
            "Drain complete"
        );
        Ok(summary)
    }

    /// Schedule a drain after the debounce window, replacing any pending
    /// timer so trigger bursts coalesce.
    pub fn schedule(self: &Arc<Self>) {
        let mut timer = self.timer.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = timer.take() {
            previous.abort();
        }

        let scheduler = Arc::clone(self);
        *timer = Some(tokio::spawn(async move {
            tokio::time::sleep(scheduler.config.debounce).await;
            if let Err(e) = scheduler.drain().await {
                warn!(
                    subsystem = "engine",
                    component = "flusher",
                    op = "scheduled_drain",
                    error = %e,
                    "Scheduled drain failed"
                );
            }
        }));
    }

    /// Listen on the bus and schedule a drain for every flush trigger.
    pub fn spawn_trigger_listener(self: &Arc<Self>) -> JoinHandle<()> {
        let scheduler = Arc::clone(self);
        let mut rx = self.bus.subscribe();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(envelope) if envelope.payload.is_flush_trigger() => scheduler.schedule(),
                    Ok(_) => {}
                    Err(RecvError::Lagged(_)) => continue,
                    Err(RecvError::Closed) => break,
                }
            }
        })
    }

    /// Abort any pending debounce timer. Used when the account context this
    /// scheduler belongs to is being replaced.
    pub fn shutdown(&self) {
        if let Some(timer) = self
            .timer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            timer.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_zero_attempts_no_base_delay() {
        let config = FlushConfig {
            jitter_ms: 0,
            ..FlushConfig::default()
        };
        assert_eq!(UploadScheduler::backoff_delay(0, &config), Duration::ZERO);
    }

    #[test]
    fn test_backoff_grows_linearly() {
        let config = FlushConfig {
            jitter_ms: 0,
            ..FlushConfig::default()
        };
        assert_eq!(
            UploadScheduler::backoff_delay(1, &config),
            Duration::from_millis(1_000)
        );
        assert_eq!(
            UploadScheduler::backoff_delay(5, &config),
            Duration::from_millis(5_000)
        );
    }

    #[test]
    fn test_backoff_is_capped() {
        let config = FlushConfig {
            jitter_ms: 0,
            ..FlushConfig::default()
        };
        assert_eq!(
            UploadScheduler::backoff_delay(1_000, &config),
            Duration::from_millis(defaults::BACKOFF_MAX_MS)
        );
    }

    #[test]
    fn test_backoff_jitter_stays_in_range() {
        let config = FlushConfig::default();
        for _ in 0..50 {
            let delay = UploadScheduler::backoff_delay(2, &config).as_millis() as u64;
            assert!(delay >= 2_000);
            assert!(delay < 2_000 + defaults::BACKOFF_JITTER_MS);
        }
    }

    #[test]
    fn test_backoff_negative_attempts_treated_as_zero() {
        let config = FlushConfig {
            jitter_ms: 0,
            ..FlushConfig::default()
        };
        assert_eq!(UploadScheduler::backoff_delay(-3, &config), Duration::ZERO);
    }
}
