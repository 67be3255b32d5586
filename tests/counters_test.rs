//! Integration tests for the synchronous counter adjustment API.

use counter_sync::db::{
    adjust_comments_count, adjust_likes_count, adjust_reposts_count, find_counter_drift,
    get_comment, get_post, insert_comment, insert_post, insert_user, Database,
};
use counter_sync::domain::{ContentKey, ContentType, CounterField, NewComment, NewPost, NewUser};
use counter_sync::error::RepositoryError;
use tempfile::TempDir;

async fn setup_db() -> (Database, TempDir) {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let db_path = temp_dir.path().join("test.sqlite");
    let db = Database::new(&db_path)
        .await
        .expect("Failed to create database");
    (db, temp_dir)
}

/// A user, a post, and a top-level comment on it.
async fn seed(db: &Database) -> (i64, i64, i64) {
    let user_id = insert_user(db.pool(), &NewUser::new("alice01", "alice@example.com").unwrap())
        .await
        .expect("Failed to insert user");

    let mut conn = db.pool().acquire().await.unwrap();
    let post_id = insert_post(&mut conn, &NewPost::new(user_id, "hello").unwrap())
        .await
        .expect("Failed to insert post");
    let comment_id = insert_comment(
        &mut conn,
        &NewComment::new(user_id, "first", post_id, None).unwrap(),
    )
    .await
    .expect("Failed to insert comment");

    (user_id, post_id, comment_id)
}

#[tokio::test]
async fn test_adjust_likes_count_on_post_and_comment() {
    let (db, _temp_dir) = setup_db().await;
    let (_, post_id, comment_id) = seed(&db).await;
    let mut conn = db.pool().acquire().await.unwrap();

    adjust_likes_count(&mut conn, ContentType::Post, post_id, 1).await.unwrap();
    adjust_likes_count(&mut conn, ContentType::Post, post_id, 1).await.unwrap();
    adjust_likes_count(&mut conn, ContentType::Comment, comment_id, 1).await.unwrap();
    adjust_likes_count(&mut conn, ContentType::Post, post_id, -1).await.unwrap();

    let post = get_post(db.pool(), post_id).await.unwrap().unwrap();
    let comment = get_comment(db.pool(), comment_id).await.unwrap().unwrap();
    assert_eq!(post.likes_count, 1);
    assert_eq!(comment.likes_count, 1);
    assert_eq!(post.comments_count, 0);
}

#[tokio::test]
async fn test_adjust_comments_count_moves_post_and_parent_together() {
    let (db, _temp_dir) = setup_db().await;
    let (_, post_id, comment_id) = seed(&db).await;
    let mut conn = db.pool().acquire().await.unwrap();

    adjust_comments_count(&mut conn, post_id, Some(comment_id), 1).await.unwrap();
    adjust_comments_count(&mut conn, post_id, None, 1).await.unwrap();

    let post = get_post(db.pool(), post_id).await.unwrap().unwrap();
    let comment = get_comment(db.pool(), comment_id).await.unwrap().unwrap();
    assert_eq!(post.comments_count, 2);
    assert_eq!(comment.comments_count, 1);
}

#[tokio::test]
async fn test_adjust_reposts_count_targets_original() {
    let (db, _temp_dir) = setup_db().await;
    let (_, post_id, comment_id) = seed(&db).await;
    let mut conn = db.pool().acquire().await.unwrap();

    adjust_reposts_count(&mut conn, comment_id, ContentType::Comment, 1).await.unwrap();

    let post = get_post(db.pool(), post_id).await.unwrap().unwrap();
    let comment = get_comment(db.pool(), comment_id).await.unwrap().unwrap();
    assert_eq!(comment.reposts_count, 1);
    assert_eq!(post.reposts_count, 0);
}

#[tokio::test]
async fn test_non_unit_delta_is_rejected() {
    let (db, _temp_dir) = setup_db().await;
    let (_, post_id, _) = seed(&db).await;
    let mut conn = db.pool().acquire().await.unwrap();

    for delta in [0, 2, -5] {
        let err = adjust_likes_count(&mut conn, ContentType::Post, post_id, delta)
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::InvalidOperation { .. }), "{err}");
    }
    let err = adjust_comments_count(&mut conn, post_id, None, 3).await.unwrap_err();
    assert!(matches!(err, RepositoryError::InvalidOperation { .. }));

    let post = get_post(db.pool(), post_id).await.unwrap().unwrap();
    assert_eq!(post.likes_count, 0);
    assert_eq!(post.comments_count, 0);
}

#[tokio::test]
async fn test_unknown_content_type_is_rejected() {
    let err = ContentType::parse("story").unwrap_err();
    assert!(matches!(err, RepositoryError::InvalidEntityInput(_)));
}

#[tokio::test]
async fn test_negative_counter_is_kept_and_reported_as_drift() {
    let (db, _temp_dir) = setup_db().await;
    let (_, post_id, _) = seed(&db).await;
    let mut conn = db.pool().acquire().await.unwrap();

    adjust_likes_count(&mut conn, ContentType::Post, post_id, -1).await.unwrap();

    let post = get_post(db.pool(), post_id).await.unwrap().unwrap();
    assert_eq!(post.likes_count, -1);

    let drift = find_counter_drift(db.pool()).await.unwrap();
    // The seeded comment was inserted without an adjustment, so comments_count drifts too
    let likes_drift: Vec<_> = drift
        .iter()
        .filter(|d| d.field == CounterField::LikesCount)
        .collect();
    assert_eq!(likes_drift.len(), 1);
    assert_eq!(likes_drift[0].key, ContentKey::post(post_id));
    assert_eq!(likes_drift[0].cached, -1);
    assert_eq!(likes_drift[0].actual, 0);
}

#[tokio::test]
async fn test_adjustment_rolls_back_with_transaction() {
    let (db, _temp_dir) = setup_db().await;
    let (_, post_id, _) = seed(&db).await;

    let mut tx = db.pool().begin().await.unwrap();
    adjust_likes_count(&mut tx, ContentType::Post, post_id, 1).await.unwrap();
    tx.rollback().await.unwrap();

    let post = get_post(db.pool(), post_id).await.unwrap().unwrap();
    assert_eq!(post.likes_count, 0);
}
