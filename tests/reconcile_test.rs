//! Integration tests for draining buffered counter deltas.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::FaultyBuffer;
use counter_sync::buffer::{CounterBuffer, MemoryBuffer};
use counter_sync::db::{get_comment, get_post, insert_comment, insert_post, insert_user, Database};
use counter_sync::domain::{ContentKey, CounterField, NewComment, NewPost, NewUser};
use counter_sync::reconcile::{
    FlushOutcome, FlushReport, ReconcileError, Reconciler, DEFAULT_LOCK_TTL, FLUSH_LOCK,
};
use tempfile::TempDir;

async fn setup_db() -> (Database, TempDir) {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let db_path = temp_dir.path().join("test.sqlite");
    let db = Database::new(&db_path)
        .await
        .expect("Failed to create database");
    (db, temp_dir)
}

async fn seed_post(db: &Database) -> i64 {
    let user_id = insert_user(db.pool(), &NewUser::new("bobby22", "bob@example.com").unwrap())
        .await
        .unwrap();
    let mut conn = db.pool().acquire().await.unwrap();
    insert_post(&mut conn, &NewPost::new(user_id, "post").unwrap())
        .await
        .unwrap()
}

fn reconciler(db: &Database, buffer: &Arc<MemoryBuffer>) -> Reconciler {
    Reconciler::new(db.pool().clone(), buffer.clone(), DEFAULT_LOCK_TTL)
}

fn flushed(outcome: FlushOutcome) -> FlushReport {
    match outcome {
        FlushOutcome::Flushed(report) => report,
        FlushOutcome::Skipped => panic!("expected a flush, run was skipped"),
    }
}

#[tokio::test]
async fn test_flush_applies_and_clears_deltas() {
    let (db, _temp_dir) = setup_db().await;
    let post_id = seed_post(&db).await;
    let buffer = Arc::new(MemoryBuffer::new());
    let key = format!("post:{post_id}");

    buffer.incr(&key, "comments_count", 3).await.unwrap();
    buffer.incr(&key, "reposts_count", 1).await.unwrap();

    let report = flushed(reconciler(&db, &buffer).run_once().await.unwrap());
    assert_eq!(report.keys_scanned, 1);
    assert_eq!(report.fields_applied, 2);
    assert_eq!(report.rows_missing, 0);

    let post = get_post(db.pool(), post_id).await.unwrap().unwrap();
    assert_eq!(post.comments_count, 3);
    assert_eq!(post.reposts_count, 1);
    assert_eq!(buffer.key_count(), 0);
}

#[tokio::test]
async fn test_second_run_is_a_no_op() {
    let (db, _temp_dir) = setup_db().await;
    let post_id = seed_post(&db).await;
    let buffer = Arc::new(MemoryBuffer::new());
    buffer
        .incr(&format!("post:{post_id}"), "comments_count", 2)
        .await
        .unwrap();

    let reconciler = reconciler(&db, &buffer);
    flushed(reconciler.run_once().await.unwrap());
    let second = flushed(reconciler.run_once().await.unwrap());

    assert_eq!(second, FlushReport::default());
    let post = get_post(db.pool(), post_id).await.unwrap().unwrap();
    assert_eq!(post.comments_count, 2);
}

#[tokio::test]
async fn test_held_lock_skips_run() {
    let (db, _temp_dir) = setup_db().await;
    let post_id = seed_post(&db).await;
    let buffer = Arc::new(MemoryBuffer::new());
    let key = format!("post:{post_id}");
    buffer.incr(&key, "comments_count", 1).await.unwrap();

    let token = buffer
        .try_lock(FLUSH_LOCK, Duration::from_secs(30))
        .await
        .unwrap()
        .expect("lock should be free");

    let outcome = reconciler(&db, &buffer).run_once().await.unwrap();
    assert_eq!(outcome, FlushOutcome::Skipped);

    let post = get_post(db.pool(), post_id).await.unwrap().unwrap();
    assert_eq!(post.comments_count, 0);
    assert_eq!(buffer.get(&key, "comments_count").await.unwrap(), 1);

    assert!(buffer.unlock(FLUSH_LOCK, &token).await.unwrap());
    flushed(reconciler(&db, &buffer).run_once().await.unwrap());
    let post = get_post(db.pool(), post_id).await.unwrap().unwrap();
    assert_eq!(post.comments_count, 1);
}

#[tokio::test]
async fn test_lock_is_released_after_run() {
    let (db, _temp_dir) = setup_db().await;
    let buffer = Arc::new(MemoryBuffer::new());

    flushed(reconciler(&db, &buffer).run_once().await.unwrap());

    let token = buffer.try_lock(FLUSH_LOCK, DEFAULT_LOCK_TTL).await.unwrap();
    assert!(token.is_some());
}

#[tokio::test]
async fn test_concurrent_runs_apply_each_delta_once() {
    let (db, _temp_dir) = setup_db().await;
    let post_id = seed_post(&db).await;
    let buffer = Arc::new(MemoryBuffer::new());
    buffer
        .incr(&format!("post:{post_id}"), "comments_count", 5)
        .await
        .unwrap();

    let a = reconciler(&db, &buffer);
    let b = reconciler(&db, &buffer);
    let (first, second) = tokio::join!(a.run_once(), b.run_once());
    first.unwrap();
    second.unwrap();

    let post = get_post(db.pool(), post_id).await.unwrap().unwrap();
    assert_eq!(post.comments_count, 5);
    assert_eq!(buffer.key_count(), 0);
}

#[tokio::test]
async fn test_run_started_while_lock_is_held_is_skipped() {
    let (db, _temp_dir) = setup_db().await;
    let post_id = seed_post(&db).await;
    let buffer = Arc::new(FaultyBuffer::new());
    let key = format!("post:{post_id}");
    buffer.incr(&key, "comments_count", 5).await.unwrap();
    buffer.incr(&key, "reposts_count", 2).await.unwrap();

    let reconciler = Reconciler::new(db.pool().clone(), buffer.clone(), DEFAULT_LOCK_TTL);
    buffer.pause_next_scan();
    let first = tokio::spawn({
        let reconciler = reconciler.clone();
        async move { reconciler.run_once().await }
    });

    // The first run has the lock and is parked inside its scan
    buffer.scan_paused.notified().await;
    let second = reconciler.run_once().await.unwrap();
    assert_eq!(second, FlushOutcome::Skipped);
    let post = get_post(db.pool(), post_id).await.unwrap().unwrap();
    assert_eq!(post.comments_count, 0);
    assert_eq!(post.reposts_count, 0);

    buffer.resume_scan.notify_one();
    let report = flushed(first.await.unwrap().unwrap());
    assert_eq!(report.keys_scanned, 1);
    assert_eq!(report.fields_applied, 2);

    let post = get_post(db.pool(), post_id).await.unwrap().unwrap();
    assert_eq!(post.comments_count, 5);
    assert_eq!(post.reposts_count, 2);
    assert_eq!(buffer.key_count(), 0);
}

#[tokio::test]
async fn test_store_failure_keeps_deltas_and_releases_lock() {
    let (db, _temp_dir) = setup_db().await;
    let post_id = seed_post(&db).await;
    let buffer = Arc::new(MemoryBuffer::new());
    let key = format!("post:{post_id}");
    buffer.incr(&key, "comments_count", 3).await.unwrap();
    buffer.incr(&key, "reposts_count", 1).await.unwrap();

    let reconciler = reconciler(&db, &buffer);
    db.pool().close().await;

    let err = reconciler.run_once().await.unwrap_err();
    assert!(
        matches!(
            &err,
            ReconcileError::Store { key, field: CounterField::CommentsCount, delta: 3, .. }
                if *key == ContentKey::post(post_id)
        ),
        "{err}"
    );

    assert_eq!(buffer.get(&key, "comments_count").await.unwrap(), 3);
    assert_eq!(buffer.get(&key, "reposts_count").await.unwrap(), 1);
    assert!(buffer
        .try_lock(FLUSH_LOCK, DEFAULT_LOCK_TTL)
        .await
        .unwrap()
        .is_some());
}

#[tokio::test]
async fn test_settle_failure_is_reported_and_releases_lock() {
    let (db, _temp_dir) = setup_db().await;
    let post_id = seed_post(&db).await;
    let buffer = Arc::new(FaultyBuffer::new());
    let key = format!("post:{post_id}");
    buffer.incr(&key, "comments_count", 2).await.unwrap();
    buffer.set_fail_settle(true);

    let reconciler = Reconciler::new(db.pool().clone(), buffer.clone(), DEFAULT_LOCK_TTL);
    let err = reconciler.run_once().await.unwrap_err();
    assert!(
        matches!(
            &err,
            ReconcileError::Settle { field: CounterField::CommentsCount, delta: 2, .. }
        ),
        "{err}"
    );

    // Applied to the row, yet still pending in the buffer
    let post = get_post(db.pool(), post_id).await.unwrap().unwrap();
    assert_eq!(post.comments_count, 2);
    assert_eq!(buffer.get(&key, "comments_count").await.unwrap(), 2);
    assert!(buffer
        .try_lock(FLUSH_LOCK, DEFAULT_LOCK_TTL)
        .await
        .unwrap()
        .is_some());
}

#[tokio::test]
async fn test_increments_between_runs_are_kept() {
    let (db, _temp_dir) = setup_db().await;
    let post_id = seed_post(&db).await;
    let buffer = Arc::new(MemoryBuffer::new());
    let key = format!("post:{post_id}");
    let reconciler = reconciler(&db, &buffer);

    buffer.incr(&key, "comments_count", 3).await.unwrap();
    flushed(reconciler.run_once().await.unwrap());
    buffer.incr(&key, "comments_count", -1).await.unwrap();
    flushed(reconciler.run_once().await.unwrap());

    let post = get_post(db.pool(), post_id).await.unwrap().unwrap();
    assert_eq!(post.comments_count, 2);
}

#[tokio::test]
async fn test_nested_comment_key_is_flushed() {
    let (db, _temp_dir) = setup_db().await;
    let post_id = seed_post(&db).await;
    let comment_id = {
        let post = get_post(db.pool(), post_id).await.unwrap().unwrap();
        let mut conn = db.pool().acquire().await.unwrap();
        insert_comment(
            &mut conn,
            &NewComment::new(post.author_id, "parent", post_id, None).unwrap(),
        )
        .await
        .unwrap()
    };
    let buffer = Arc::new(MemoryBuffer::new());
    buffer
        .incr(&format!("comment:{comment_id}"), "comments_count", 1)
        .await
        .unwrap();

    flushed(reconciler(&db, &buffer).run_once().await.unwrap());

    let comment = get_comment(db.pool(), comment_id).await.unwrap().unwrap();
    assert_eq!(comment.comments_count, 1);
}

#[tokio::test]
async fn test_delta_for_missing_row_is_discarded() {
    let (db, _temp_dir) = setup_db().await;
    let buffer = Arc::new(MemoryBuffer::new());
    buffer.incr("post:999", "reposts_count", 1).await.unwrap();

    let report = flushed(reconciler(&db, &buffer).run_once().await.unwrap());
    assert_eq!(report.rows_missing, 1);
    assert_eq!(buffer.key_count(), 0);
}

#[tokio::test]
async fn test_unrecognised_key_is_left_alone() {
    let (db, _temp_dir) = setup_db().await;
    let buffer = Arc::new(MemoryBuffer::new());
    buffer.incr("post:abc", "comments_count", 1).await.unwrap();

    let report = flushed(reconciler(&db, &buffer).run_once().await.unwrap());
    assert_eq!(report.keys_scanned, 0);
    assert_eq!(buffer.get("post:abc", "comments_count").await.unwrap(), 1);
}

#[tokio::test]
async fn test_zero_net_delta_is_cleared_without_write() {
    let (db, _temp_dir) = setup_db().await;
    let post_id = seed_post(&db).await;
    let buffer = Arc::new(MemoryBuffer::new());
    let key = format!("post:{post_id}");
    buffer.incr(&key, "comments_count", 1).await.unwrap();
    buffer.incr(&key, "comments_count", -1).await.unwrap();

    let report = flushed(reconciler(&db, &buffer).run_once().await.unwrap());
    assert_eq!(report.fields_applied, 0);
    assert_eq!(buffer.key_count(), 0);
}
