//! Engine event types and the broadcast bus that distributes them.
//!
//! The bus replaces the ad hoc callback and cross-tab broadcast wiring older
//! clients used: hosts publish environment signals (connectivity, visibility,
//! authentication, account switches) and the engine publishes its own
//! lifecycle events. Downstream consumers subscribe independently; slow
//! receivers that fall behind receive a `Lagged` error and miss events, which
//! is acceptable for signals where freshness matters more than completeness.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::defaults;

/// Events flowing through the sync engine.
///
/// Serialized as JSON with a `type` tag field, e.g.
/// `{"type":"JobQueued","job_id":7,"content_hash":"abc"}`.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum SyncEvent {
    /// Network connectivity changed (published by the host).
    ConnectivityChanged { online: bool },
    /// The process/tab gained or lost foreground visibility (host).
    VisibilityChanged { visible: bool },
    /// The remote session was established or lost (host or gateway).
    AuthStateChanged { signed_in: bool },
    /// The active account switched; dependent stores must resynchronize.
    AccountChanged { account_id: String },
    /// A document was enqueued for later upload.
    JobQueued {
        job_id: i64,
        #[serde(skip_serializing_if = "Option::is_none")]
        content_hash: Option<String>,
    },
    /// A document reached the remote store (direct path has no job id).
    JobUploaded {
        #[serde(skip_serializing_if = "Option::is_none")]
        job_id: Option<i64>,
        remote_id: String,
        deduped: bool,
    },
    /// An upload attempt failed; the job stays queued.
    JobRetried {
        job_id: i64,
        attempts: i64,
        error: String,
    },
    /// A manifest pull replaced or confirmed the local history.
    ManifestPulled { records: usize },
    /// The local history was pushed under a new revision.
    ManifestPushed { rev: i64 },
    /// Periodic pending-count broadcast after a drain.
    QueueStatus { pending: i64 },
}

impl SyncEvent {
    /// Namespaced event type name (e.g. `"job.uploaded"`).
    pub fn event_type(&self) -> &'static str {
        match self {
            SyncEvent::ConnectivityChanged { .. } => "connectivity.changed",
            SyncEvent::VisibilityChanged { .. } => "visibility.changed",
            SyncEvent::AuthStateChanged { .. } => "auth.changed",
            SyncEvent::AccountChanged { .. } => "account.changed",
            SyncEvent::JobQueued { .. } => "job.queued",
            SyncEvent::JobUploaded { .. } => "job.uploaded",
            SyncEvent::JobRetried { .. } => "job.retried",
            SyncEvent::ManifestPulled { .. } => "manifest.pulled",
            SyncEvent::ManifestPushed { .. } => "manifest.pushed",
            SyncEvent::QueueStatus { .. } => "queue.status",
        }
    }

    /// Whether this event should re-arm the upload scheduler.
    ///
    /// Connectivity returning, the process becoming visible again, and a
    /// fresh sign-in are the moments queued work becomes uploadable.
    pub fn is_flush_trigger(&self) -> bool {
        matches!(
            self,
            SyncEvent::ConnectivityChanged { online: true }
                | SyncEvent::VisibilityChanged { visible: true }
                | SyncEvent::AuthStateChanged { signed_in: true }
        )
    }
}

/// Versioned wrapper around a [`SyncEvent`] with identity and timing.
#[derive(Debug, Clone, Serialize)]
pub struct EventEnvelope {
    /// Unique event identifier (UUIDv7 for temporal ordering).
    pub event_id: Uuid,
    /// Namespaced event type (e.g. `"job.uploaded"`).
    pub event_type: String,
    /// When the event occurred (UTC).
    pub occurred_at: DateTime<Utc>,
    /// Domain-specific event data.
    pub payload: SyncEvent,
}

impl EventEnvelope {
    pub fn new(event: SyncEvent) -> Self {
        Self {
            event_id: Uuid::now_v7(),
            event_type: event.event_type().to_string(),
            occurred_at: Utc::now(),
            payload: event,
        }
    }
}

/// Broadcast-based event bus distributing engine events to consumers.
#[derive(Clone)]
pub struct SyncBus {
    tx: broadcast::Sender<EventEnvelope>,
}

impl SyncBus {
    /// Create a new bus with the given buffer capacity.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Emit an event to all subscribers.
    ///
    /// The event is wrapped in an [`EventEnvelope`] with a UUIDv7 id. If
    /// there are no active subscribers, the event is silently dropped.
    pub fn emit(&self, event: SyncEvent) {
        let envelope = EventEnvelope::new(event);
        tracing::debug!(
            event_type = %envelope.event_type,
            event_id = %envelope.event_id,
            subscriber_count = self.tx.receiver_count(),
            "SyncBus emit"
        );
        let _ = self.tx.send(envelope);
    }

    /// Subscribe to receive enveloped events. Each subscriber gets its own
    /// independent stream.
    pub fn subscribe(&self) -> broadcast::Receiver<EventEnvelope> {
        self.tx.subscribe()
    }

    /// Number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for SyncBus {
    fn default() -> Self {
        Self::new(defaults::EVENT_BUS_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_emit_subscribe() {
        let bus = SyncBus::new(32);
        let mut rx = bus.subscribe();

        bus.emit(SyncEvent::QueueStatus { pending: 4 });

        let envelope = rx.recv().await.unwrap();
        assert!(matches!(
            envelope.payload,
            SyncEvent::QueueStatus { pending: 4 }
        ));
        assert_eq!(envelope.event_type, "queue.status");
    }

    #[tokio::test]
    async fn test_multiple_subscribers() {
        let bus = SyncBus::new(32);
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        bus.emit(SyncEvent::ConnectivityChanged { online: true });

        assert!(matches!(
            rx1.recv().await.unwrap().payload,
            SyncEvent::ConnectivityChanged { online: true }
        ));
        assert!(matches!(
            rx2.recv().await.unwrap().payload,
            SyncEvent::ConnectivityChanged { online: true }
        ));
    }

    #[tokio::test]
    async fn test_emit_without_subscribers_ok() {
        let bus = SyncBus::new(32);
        bus.emit(SyncEvent::ManifestPushed { rev: 1 });
    }

    #[tokio::test]
    async fn test_subscriber_count() {
        let bus = SyncBus::new(32);
        assert_eq!(bus.subscriber_count(), 0);
        let rx = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 1);
        drop(rx);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn test_flush_triggers() {
        assert!(SyncEvent::ConnectivityChanged { online: true }.is_flush_trigger());
        assert!(SyncEvent::VisibilityChanged { visible: true }.is_flush_trigger());
        assert!(SyncEvent::AuthStateChanged { signed_in: true }.is_flush_trigger());

        assert!(!SyncEvent::ConnectivityChanged { online: false }.is_flush_trigger());
        assert!(!SyncEvent::AuthStateChanged { signed_in: false }.is_flush_trigger());
        assert!(!SyncEvent::QueueStatus { pending: 0 }.is_flush_trigger());
    }

    #[test]
    fn test_event_json_serialization() {
        let event = SyncEvent::JobQueued {
            job_id: 7,
            content_hash: Some("abc".into()),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""type":"JobQueued"#));
        assert!(json.contains(r#""content_hash":"abc"#));

        // Direct uploads have no job id and the field is omitted.
        let direct = SyncEvent::JobUploaded {
            job_id: None,
            remote_id: "f1".into(),
            deduped: true,
        };
        let json = serde_json::to_string(&direct).unwrap();
        assert!(!json.contains("job_id"));
        assert!(json.contains(r#""deduped":true"#));
    }

    #[test]
    fn test_event_type_names() {
        assert_eq!(
            SyncEvent::AccountChanged {
                account_id: "u".into()
            }
            .event_type(),
            "account.changed"
        );
        assert_eq!(
            SyncEvent::JobRetried {
                job_id: 1,
                attempts: 2,
                error: "e".into()
            }
            .event_type(),
            "job.retried"
        );
    }
}
