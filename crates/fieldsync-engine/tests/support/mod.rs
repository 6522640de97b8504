//! Shared fixtures for engine integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use fieldsync_core::{DocumentPayload, ManifestRecord, SharedIdentity, SyncBus};
use fieldsync_engine::{EngineConfig, SyncEngine};
use fieldsync_remote::{MemoryDrive, ObjectGateway};
use fieldsync_store::{open_memory, SqliteCatalogStore};

pub struct TestEnv {
    pub dir: TempDir,
    pub drive: Arc<MemoryDrive>,
    pub identity: SharedIdentity,
    pub bus: SyncBus,
    pub engine: Arc<SyncEngine>,
}

/// Engine over a temp directory and an in-memory drive, with debounces and
/// backoff tuned so tests are fast and deterministic: drains coalesce in
/// 50 ms, while debounced pushes and identity polls effectively never fire
/// unless a test asks for them explicitly.
pub async fn env() -> TestEnv {
    env_with(|config| config).await
}

pub async fn env_with(tune: impl FnOnce(EngineConfig) -> EngineConfig) -> TestEnv {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();

    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let config = tune(
        EngineConfig::default()
            .with_data_dir(dir.path())
            .with_flush_debounce(Duration::from_millis(50))
            .with_push_debounce(Duration::from_secs(60))
            .with_backoff(Duration::ZERO, Duration::ZERO, 0)
            .with_identity_poll(Duration::from_secs(60)),
    );

    let drive = Arc::new(MemoryDrive::new());
    let identity = SharedIdentity::default();
    let bus = SyncBus::new(64);
    let engine = SyncEngine::open(config, Arc::new(identity.clone()), drive.clone(), bus.clone())
        .await
        .expect("Failed to open engine");

    TestEnv {
        dir,
        drive,
        identity,
        bus,
        engine,
    }
}

/// An independent gateway over the same in-memory drive, for arranging and
/// inspecting remote state from the "other device" point of view.
pub async fn remote_gateway(drive: &Arc<MemoryDrive>) -> ObjectGateway {
    let pool = open_memory().await.expect("Failed to open memory db");
    let catalog = Arc::new(SqliteCatalogStore::new(pool));
    ObjectGateway::new(drive.clone(), catalog, "FieldSync")
}

pub fn payload(name: &str, bytes: &[u8]) -> DocumentPayload {
    DocumentPayload::new(name, "application/pdf", bytes.to_vec())
}

pub fn record(id: &str, created_at: i64) -> ManifestRecord {
    ManifestRecord {
        id: Some(id.to_string()),
        created_at: Some(created_at),
        ..Default::default()
    }
}
