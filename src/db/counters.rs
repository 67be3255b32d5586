//! Synchronous counter adjustment.
//!
//! Every function here takes the caller's open connection or transaction, so a
//! counter change commits or rolls back together with the row mutation that
//! caused it. Counters are only ever changed through [`increment_counter`],
//! which delegates the arithmetic to a single `col = col + ?` statement; no
//! caller reads a counter and writes it back.

use sqlx::SqliteConnection;
use tracing::debug;

use crate::domain::{ContentType, CounterField};
use crate::error::RepositoryError;

/// Atomically add `delta` to one counter column of one row.
///
/// Returns the number of rows updated (0 if the row no longer exists).
///
/// # Errors
///
/// Returns `InvalidOperation` wrapping the store error if the update cannot be issued.
pub async fn increment_counter(
    conn: &mut SqliteConnection,
    content_type: ContentType,
    id: i64,
    field: CounterField,
    delta: i64,
) -> Result<u64, RepositoryError> {
    // Table and column names come from closed enums, never from input.
    let sql = format!(
        "UPDATE {table} SET {col} = {col} + ? WHERE id = ?",
        table = content_type.table(),
        col = field.column(),
    );

    let result = sqlx::query(&sql)
        .bind(delta)
        .bind(id)
        .execute(&mut *conn)
        .await
        .map_err(|source| RepositoryError::InvalidOperation {
            message: format!("failed to adjust {field} on {content_type}:{id}"),
            source: Some(source),
        })?;

    debug!(%content_type, id, %field, delta, rows = result.rows_affected(), "Counter incremented");
    Ok(result.rows_affected())
}

fn check_unit_delta(delta: i64) -> Result<(), RepositoryError> {
    if delta == 1 || delta == -1 {
        Ok(())
    } else {
        Err(RepositoryError::invalid_operation(format!(
            "counter adjustments must be +1 or -1, got {delta}"
        )))
    }
}

/// Apply a like/unlike to the liked item's `likes_count`.
///
/// # Errors
///
/// Returns `InvalidOperation` if `delta` is not ±1 or the update fails.
pub async fn adjust_likes_count(
    conn: &mut SqliteConnection,
    content_type: ContentType,
    content_id: i64,
    delta: i64,
) -> Result<(), RepositoryError> {
    check_unit_delta(delta)?;
    increment_counter(conn, content_type, content_id, CounterField::LikesCount, delta).await?;
    Ok(())
}

/// Apply a comment create/delete to the owning post and, for a reply, the
/// parent comment.
///
/// # Errors
///
/// Returns `InvalidOperation` if `delta` is not ±1 or either update fails.
pub async fn adjust_comments_count(
    conn: &mut SqliteConnection,
    parent_post_id: i64,
    parent_comment_id: Option<i64>,
    delta: i64,
) -> Result<(), RepositoryError> {
    check_unit_delta(delta)?;
    if let Some(parent_comment_id) = parent_comment_id {
        increment_counter(
            conn,
            ContentType::Comment,
            parent_comment_id,
            CounterField::CommentsCount,
            delta,
        )
        .await?;
    }
    increment_counter(
        conn,
        ContentType::Post,
        parent_post_id,
        CounterField::CommentsCount,
        delta,
    )
    .await?;
    Ok(())
}

/// Apply a repost create/delete to the original item's `reposts_count`.
///
/// # Errors
///
/// Returns `InvalidOperation` if `delta` is not ±1 or the update fails.
pub async fn adjust_reposts_count(
    conn: &mut SqliteConnection,
    repost_of_id: i64,
    repost_of_content_type: ContentType,
    delta: i64,
) -> Result<(), RepositoryError> {
    check_unit_delta(delta)?;
    increment_counter(
        conn,
        repost_of_content_type,
        repost_of_id,
        CounterField::RepostsCount,
        delta,
    )
    .await?;
    Ok(())
}
