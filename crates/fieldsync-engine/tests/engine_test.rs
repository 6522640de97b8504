//! End-to-end tests for the upload path: direct uploads, queue fallback,
//! drain convergence, and hash resolution.

mod support;

use std::time::Duration;

use fieldsync_core::{defaults, hash_bytes};
use support::{env, payload};

#[tokio::test]
async fn test_direct_upload_when_online() {
    let t = env().await;
    let bytes = b"inspection report";
    let hash = hash_bytes(bytes);

    let outcome = t
        .engine
        .upload_or_queue(payload("report.pdf", bytes), &hash)
        .await
        .unwrap();

    assert!(outcome.uploaded);
    assert!(outcome.queued_id.is_none());
    let stored = outcome.remote.unwrap();
    assert!(!stored.deduped);

    assert_eq!(t.drive.object_count(), 1);
    assert_eq!(t.engine.pending_count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_direct_upload_second_call_dedupes() {
    let t = env().await;
    let bytes = b"same bytes";
    let hash = hash_bytes(bytes);

    let first = t
        .engine
        .upload_or_queue(payload("a.pdf", bytes), &hash)
        .await
        .unwrap();
    let second = t
        .engine
        .upload_or_queue(payload("a.pdf", bytes), &hash)
        .await
        .unwrap();

    let first = first.remote.unwrap();
    let second = second.remote.unwrap();
    assert!(!first.deduped);
    assert!(second.deduped);
    assert_eq!(first.remote_id, second.remote_id);
    assert_eq!(t.drive.object_count(), 1);
}

#[tokio::test]
async fn test_offline_upload_queues() {
    let t = env().await;
    t.engine.set_online(false);

    let outcome = t
        .engine
        .upload_or_queue(payload("r.pdf", b"bytes"), "h1")
        .await
        .unwrap();

    assert!(!outcome.uploaded);
    assert!(outcome.queued_id.is_some());
    assert_eq!(t.engine.pending_count().await.unwrap(), 1);
    assert_eq!(t.drive.object_count(), 0);
}

#[tokio::test]
async fn test_signed_out_session_queues() {
    let t = env().await;
    t.drive.set_authenticated(false);

    let outcome = t
        .engine
        .upload_or_queue(payload("r.pdf", b"bytes"), "h1")
        .await
        .unwrap();

    assert!(!outcome.uploaded);
    assert_eq!(t.engine.pending_count().await.unwrap(), 1);
}

#[tokio::test]
async fn test_queue_collapses_duplicate_hashes() {
    let t = env().await;
    t.engine.set_online(false);

    let first = t
        .engine
        .upload_or_queue(payload("r.pdf", b"bytes"), "h1")
        .await
        .unwrap();
    let second = t
        .engine
        .upload_or_queue(payload("r-copy.pdf", b"bytes"), "h1")
        .await
        .unwrap();

    assert_eq!(first.queued_id, second.queued_id);
    assert_eq!(t.engine.pending_count().await.unwrap(), 1);
}

#[tokio::test]
async fn test_drain_converges_to_empty_queue() {
    let t = env().await;
    t.engine.set_online(false);

    for i in 0..5 {
        let body = format!("document body {i}");
        let hash = hash_bytes(body.as_bytes());
        t.engine
            .upload_or_queue(payload(&format!("doc-{i}.pdf"), body.as_bytes()), &hash)
            .await
            .unwrap();
    }
    assert_eq!(t.engine.pending_count().await.unwrap(), 5);

    t.engine.set_online(true);
    let summary = t.engine.drain_now().await.unwrap();

    assert_eq!(summary.attempted, 5);
    assert_eq!(summary.uploaded, 5);
    assert_eq!(summary.failed, 0);
    assert_eq!(t.engine.pending_count().await.unwrap(), 0);
    assert_eq!(t.drive.object_count(), 5);
}

#[tokio::test]
async fn test_offline_then_reconnect_uploads_exactly_once() {
    // Enqueue while fully offline, then restore connectivity and let the
    // bus-triggered debounced drain do the rest.
    let t = env().await;
    t.engine.start();

    t.drive.set_authenticated(false);
    t.engine.set_online(false);

    let outcome = t
        .engine
        .upload_or_queue(payload("report.pdf", b"10 bytes!!"), "abc123")
        .await
        .unwrap();
    assert!(!outcome.uploaded);
    assert!(outcome.queued_id.is_some());

    t.drive.set_authenticated(true);
    t.engine.set_online(true);

    tokio::time::sleep(Duration::from_millis(600)).await;

    let tagged = t.drive.objects_with_tag(defaults::TAG_CONTENT_HASH, "abc123");
    assert_eq!(tagged.len(), 1);
    assert_eq!(t.engine.pending_count().await.unwrap(), 0);

    t.engine.shutdown().await;
}

#[tokio::test]
async fn test_failed_direct_upload_falls_back_to_queue() {
    let t = env().await;
    t.drive.fail_creates(true);

    let outcome = t
        .engine
        .upload_or_queue(payload("r.pdf", b"bytes"), "h1")
        .await
        .unwrap();
    assert!(!outcome.uploaded);
    assert_eq!(t.engine.pending_count().await.unwrap(), 1);

    t.drive.fail_creates(false);
    let summary = t.engine.drain_now().await.unwrap();
    assert_eq!(summary.uploaded, 1);
    assert_eq!(t.engine.pending_count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_drain_records_failure_and_continues() {
    let t = env().await;
    t.engine.set_online(false);

    t.engine
        .upload_or_queue(payload("r.pdf", b"bytes"), "h1")
        .await
        .unwrap();

    t.engine.set_online(true);
    t.drive.fail_creates(true);
    let summary = t.engine.drain_now().await.unwrap();

    assert_eq!(summary.failed, 1);
    assert_eq!(summary.uploaded, 0);

    let jobs = t.engine.list_pending_jobs().await.unwrap();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].attempts, 1);
    assert!(jobs[0].last_error.as_deref().unwrap().contains("injected"));
}

#[tokio::test]
async fn test_drain_without_session_leaves_queue_untouched() {
    let t = env().await;
    t.engine.set_online(false);
    t.engine
        .upload_or_queue(payload("r.pdf", b"bytes"), "h1")
        .await
        .unwrap();

    t.drive.set_authenticated(false);
    let summary = t.engine.drain_now().await.unwrap();

    assert_eq!(summary.attempted, 0);
    let jobs = t.engine.list_pending_jobs().await.unwrap();
    assert_eq!(jobs[0].attempts, 0);
}

#[tokio::test]
async fn test_resolve_unknown_hash_returns_none() {
    let t = env().await;
    let resolved = t.engine.resolve_remote_id("deadbeef").await.unwrap();
    assert!(resolved.is_none());
}

#[tokio::test]
async fn test_resolve_after_upload() {
    let t = env().await;
    let bytes = b"resolvable";
    let hash = hash_bytes(bytes);

    let outcome = t
        .engine
        .upload_or_queue(payload("r.pdf", bytes), &hash)
        .await
        .unwrap();
    let remote_id = outcome.remote.unwrap().remote_id;

    let resolved = t.engine.resolve_remote_id(&hash).await.unwrap();
    assert_eq!(resolved, Some(remote_id));
}

#[tokio::test]
async fn test_fetch_document_round_trip() {
    let t = env().await;
    let bytes = b"full document body";
    let hash = hash_bytes(bytes);

    t.engine
        .upload_or_queue(payload("doc.pdf", bytes), &hash)
        .await
        .unwrap();

    let fetched = t.engine.fetch_document(&hash).await.unwrap();
    assert_eq!(fetched.as_deref(), Some(bytes.as_slice()));

    assert!(t.engine.fetch_document("unknown").await.unwrap().is_none());
}

#[tokio::test]
async fn test_executable_payload_is_rejected() {
    let t = env().await;
    let result = t
        .engine
        .upload_or_queue(payload("tool.exe", b"MZ\x90\x00"), "h1")
        .await;

    assert!(result.is_err());
    assert_eq!(t.engine.pending_count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_purge_queue() {
    let t = env().await;
    t.engine.set_online(false);

    t.engine
        .upload_or_queue(payload("a.pdf", b"a"), "ha")
        .await
        .unwrap();
    t.engine
        .upload_or_queue(payload("b.pdf", b"b"), "hb")
        .await
        .unwrap();

    assert_eq!(t.engine.purge_queue().await.unwrap(), 2);
    assert_eq!(t.engine.pending_count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_module_upload_lands_in_subfolder() {
    let t = env().await;
    let bytes = b"module doc";
    let hash = hash_bytes(bytes);

    t.engine
        .upload_or_queue(payload("m.pdf", bytes).with_module("handover"), &hash)
        .await
        .unwrap();

    let folder = t.drive.folder_named("handover").expect("subfolder created");
    let tagged = t.drive.objects_with_tag(defaults::TAG_CONTENT_HASH, &hash);
    assert_eq!(tagged.len(), 1);
    assert_eq!(tagged[0].parent.as_deref(), Some(folder.id.as_str()));
}
