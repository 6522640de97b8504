//! Tests for the upload queue: enqueue dedup, failure bookkeeping, and the
//! delete-on-success lifecycle.

use fieldsync_core::{DocumentPayload, QueueStore};
use fieldsync_store::{open_memory, SqliteQueueStore};

fn payload(name: &str, bytes: &[u8]) -> DocumentPayload {
    DocumentPayload::new(name, "application/pdf", bytes.to_vec())
}

async fn setup_queue() -> SqliteQueueStore {
    let pool = open_memory().await.expect("Failed to open in-memory database");
    SqliteQueueStore::new(pool)
}

#[tokio::test]
async fn test_enqueue_and_fetch_pending() {
    let queue = setup_queue().await;

    let id = queue
        .enqueue(payload("report.pdf", b"body"), Some("abc123".into()))
        .await
        .unwrap();
    assert!(id > 0);

    let jobs = queue.pending(10).await.unwrap();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].id, id);
    assert_eq!(jobs[0].payload.display_name, "report.pdf");
    assert_eq!(jobs[0].payload.bytes, b"body");
    assert_eq!(jobs[0].content_hash.as_deref(), Some("abc123"));
    assert_eq!(jobs[0].attempts, 0);
    assert!(jobs[0].last_error.is_none());
}

#[tokio::test]
async fn test_enqueue_same_hash_collapses_to_one_row() {
    let queue = setup_queue().await;

    let first = queue
        .enqueue(payload("a.pdf", b"same"), Some("h1".into()))
        .await
        .unwrap();
    let second = queue
        .enqueue(payload("a-again.pdf", b"same"), Some("h1".into()))
        .await
        .unwrap();

    assert_eq!(first, second);
    assert_eq!(queue.pending_count().await.unwrap(), 1);
}

#[tokio::test]
async fn test_enqueue_distinct_hashes_are_separate_jobs() {
    let queue = setup_queue().await;

    let a = queue
        .enqueue(payload("a.pdf", b"a"), Some("ha".into()))
        .await
        .unwrap();
    let b = queue
        .enqueue(payload("b.pdf", b"b"), Some("hb".into()))
        .await
        .unwrap();

    assert_ne!(a, b);
    assert_eq!(queue.pending_count().await.unwrap(), 2);
}

#[tokio::test]
async fn test_enqueue_without_hash_never_dedups() {
    let queue = setup_queue().await;

    let a = queue.enqueue(payload("x.pdf", b"x"), None).await.unwrap();
    let b = queue.enqueue(payload("x.pdf", b"x"), None).await.unwrap();

    assert_ne!(a, b);
    assert_eq!(queue.pending_count().await.unwrap(), 2);
}

#[tokio::test]
async fn test_mark_failure_increments_attempts_and_keeps_pending() {
    let queue = setup_queue().await;
    let id = queue
        .enqueue(payload("r.pdf", b"r"), Some("h".into()))
        .await
        .unwrap();

    queue.mark_failure(id, "connection refused").await.unwrap();
    queue.mark_failure(id, "server error 503").await.unwrap();

    let job = queue.find_pending_by_hash("h").await.unwrap().unwrap();
    assert_eq!(job.attempts, 2);
    assert_eq!(job.last_error.as_deref(), Some("server error 503"));
    assert_eq!(queue.pending_count().await.unwrap(), 1);
}

#[tokio::test]
async fn test_mark_failure_unknown_job_errors() {
    let queue = setup_queue().await;
    let result = queue.mark_failure(999, "nope").await;
    assert!(result.is_err());
}

#[tokio::test]
async fn test_mark_success_deletes_row() {
    let queue = setup_queue().await;
    let id = queue
        .enqueue(payload("r.pdf", b"r"), Some("h".into()))
        .await
        .unwrap();

    queue.mark_success(id).await.unwrap();

    assert_eq!(queue.pending_count().await.unwrap(), 0);
    assert!(queue.find_pending_by_hash("h").await.unwrap().is_none());

    // Success on an already-deleted job is a quiet no-op.
    queue.mark_success(id).await.unwrap();
}

#[tokio::test]
async fn test_pending_returns_oldest_first_with_limit() {
    let queue = setup_queue().await;

    let first = queue
        .enqueue(payload("1.pdf", b"1"), Some("h1".into()))
        .await
        .unwrap();
    let second = queue
        .enqueue(payload("2.pdf", b"2"), Some("h2".into()))
        .await
        .unwrap();
    queue
        .enqueue(payload("3.pdf", b"3"), Some("h3".into()))
        .await
        .unwrap();

    let page = queue.pending(2).await.unwrap();
    assert_eq!(page.len(), 2);
    assert_eq!(page[0].id, first);
    assert_eq!(page[1].id, second);
}

#[tokio::test]
async fn test_dedup_after_success_allows_requeue() {
    let queue = setup_queue().await;

    let first = queue
        .enqueue(payload("r.pdf", b"r"), Some("h".into()))
        .await
        .unwrap();
    queue.mark_success(first).await.unwrap();

    // The hash is free again once the pending job is gone.
    let second = queue
        .enqueue(payload("r.pdf", b"r"), Some("h".into()))
        .await
        .unwrap();
    assert_ne!(first, second);
    assert_eq!(queue.pending_count().await.unwrap(), 1);
}

#[tokio::test]
async fn test_clear_all_reports_removed_count() {
    let queue = setup_queue().await;
    queue
        .enqueue(payload("a.pdf", b"a"), Some("ha".into()))
        .await
        .unwrap();
    queue
        .enqueue(payload("b.pdf", b"b"), Some("hb".into()))
        .await
        .unwrap();

    assert_eq!(queue.clear_all().await.unwrap(), 2);
    assert_eq!(queue.pending_count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_module_round_trips() {
    let queue = setup_queue().await;
    let with_module = payload("m.pdf", b"m").with_module("handover");
    queue.enqueue(with_module, Some("hm".into())).await.unwrap();

    let job = queue.find_pending_by_hash("hm").await.unwrap().unwrap();
    assert_eq!(job.payload.module.as_deref(), Some("handover"));
}
