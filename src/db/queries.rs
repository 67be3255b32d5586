//! Row-level queries. Counter columns are never written here; see `counters`.

use sqlx::{Executor, Sqlite, SqliteConnection, SqlitePool};

use crate::domain::{
    Comment, ContentKey, Follow, Like, NewComment, NewFollow, NewPost, NewUser, Post, User,
};

/// Recursive CTE selecting a comment and all replies below it.
const COMMENT_SUBTREE: &str = r"
    WITH RECURSIVE subtree(id) AS (
        SELECT id FROM comments WHERE id = ?
        UNION ALL
        SELECT c.id FROM comments c JOIN subtree s ON c.parent_comment_id = s.id
    )
";

// ========== Users ==========

/// Insert a new user, returning its ID.
pub async fn insert_user(pool: &SqlitePool, user: &NewUser) -> sqlx::Result<i64> {
    let result = sqlx::query("INSERT INTO users (username, email) VALUES (?, ?)")
        .bind(&user.username)
        .bind(&user.email)
        .execute(pool)
        .await?;

    Ok(result.last_insert_rowid())
}

/// Get a user by ID.
pub async fn get_user(pool: &SqlitePool, id: i64) -> sqlx::Result<Option<User>> {
    sqlx::query_as("SELECT * FROM users WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await
}

// ========== Content ==========

/// Check whether a post or comment row exists.
pub async fn content_exists<'e, E>(executor: E, key: ContentKey) -> sqlx::Result<bool>
where
    E: Executor<'e, Database = Sqlite>,
{
    let sql = format!(
        "SELECT EXISTS(SELECT 1 FROM {} WHERE id = ?)",
        key.content_type.table()
    );
    let (exists,): (bool,) = sqlx::query_as(&sql)
        .bind(key.id)
        .fetch_one(executor)
        .await?;
    Ok(exists)
}

// ========== Posts ==========

/// Insert a new post (or repost-as-post), returning its ID.
pub async fn insert_post(conn: &mut SqliteConnection, post: &NewPost) -> sqlx::Result<i64> {
    let result = sqlx::query(
        r"
        INSERT INTO posts (author_id, content, is_repost, repost_of, repost_of_content_type)
        VALUES (?, ?, ?, ?, ?)
        ",
    )
    .bind(post.author_id)
    .bind(&post.content)
    .bind(post.repost_of.is_some())
    .bind(post.repost_of.map(|k| k.id))
    .bind(post.repost_of.map(|k| k.content_type.as_str()))
    .execute(&mut *conn)
    .await?;

    Ok(result.last_insert_rowid())
}

/// Get a post by ID.
pub async fn get_post<'e, E>(executor: E, id: i64) -> sqlx::Result<Option<Post>>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query_as("SELECT * FROM posts WHERE id = ?")
        .bind(id)
        .fetch_optional(executor)
        .await
}

/// Replace a post's text.
pub async fn update_post_content(pool: &SqlitePool, id: i64, content: &str) -> sqlx::Result<u64> {
    let result =
        sqlx::query("UPDATE posts SET content = ?, updated_at = datetime('now') WHERE id = ?")
            .bind(content)
            .bind(id)
            .execute(pool)
            .await?;
    Ok(result.rows_affected())
}

/// Comments under a post that are themselves reposts.
pub async fn get_repost_comments_in_post(
    conn: &mut SqliteConnection,
    post_id: i64,
) -> sqlx::Result<Vec<Comment>> {
    sqlx::query_as("SELECT * FROM comments WHERE parent_post_id = ? AND is_repost = 1")
        .bind(post_id)
        .fetch_all(&mut *conn)
        .await
}

/// Delete a post row; its comments go with it through the cascade.
pub async fn delete_post_row(conn: &mut SqliteConnection, id: i64) -> sqlx::Result<u64> {
    let result = sqlx::query("DELETE FROM posts WHERE id = ?")
        .bind(id)
        .execute(&mut *conn)
        .await?;
    Ok(result.rows_affected())
}

/// Delete likes on a post and on every comment under it.
pub async fn delete_likes_for_post_tree(
    conn: &mut SqliteConnection,
    post_id: i64,
) -> sqlx::Result<u64> {
    let result = sqlx::query(
        r"
        DELETE FROM likes
        WHERE (content_type = 'post' AND content_item_id = ?)
           OR (content_type = 'comment' AND content_item_id IN (
                SELECT id FROM comments WHERE parent_post_id = ?
           ))
        ",
    )
    .bind(post_id)
    .bind(post_id)
    .execute(&mut *conn)
    .await?;
    Ok(result.rows_affected())
}

/// Posts by the given authors, oldest first.
pub async fn get_posts_by_authors(
    pool: &SqlitePool,
    author_ids: &[i64],
    offset: i64,
    limit: i64,
) -> sqlx::Result<Vec<Post>> {
    if author_ids.is_empty() {
        return Ok(Vec::new());
    }

    let mut query = sqlx::QueryBuilder::<Sqlite>::new("SELECT * FROM posts WHERE author_id IN (");
    let mut separated = query.separated(", ");
    for id in author_ids {
        separated.push_bind(*id);
    }
    separated.push_unseparated(") ORDER BY created_at, id LIMIT ");
    query.push_bind(limit);
    query.push(" OFFSET ");
    query.push_bind(offset);

    query.build_query_as::<Post>().fetch_all(pool).await
}

// ========== Comments ==========

/// Insert a new comment (or repost-as-comment), returning its ID.
pub async fn insert_comment(
    conn: &mut SqliteConnection,
    comment: &NewComment,
) -> sqlx::Result<i64> {
    let result = sqlx::query(
        r"
        INSERT INTO comments (
            author_id, content, parent_post_id, parent_comment_id,
            is_repost, repost_of, repost_of_content_type
        )
        VALUES (?, ?, ?, ?, ?, ?, ?)
        ",
    )
    .bind(comment.author_id)
    .bind(&comment.content)
    .bind(comment.parent_post_id)
    .bind(comment.parent_comment_id)
    .bind(comment.repost_of.is_some())
    .bind(comment.repost_of.map(|k| k.id))
    .bind(comment.repost_of.map(|k| k.content_type.as_str()))
    .execute(&mut *conn)
    .await?;

    Ok(result.last_insert_rowid())
}

/// Get a comment by ID.
pub async fn get_comment<'e, E>(executor: E, id: i64) -> sqlx::Result<Option<Comment>>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query_as("SELECT * FROM comments WHERE id = ?")
        .bind(id)
        .fetch_optional(executor)
        .await
}

/// Replace a comment's text.
pub async fn update_comment_content(
    pool: &SqlitePool,
    id: i64,
    content: &str,
) -> sqlx::Result<u64> {
    let result =
        sqlx::query("UPDATE comments SET content = ?, updated_at = datetime('now') WHERE id = ?")
            .bind(content)
            .bind(id)
            .execute(pool)
            .await?;
    Ok(result.rows_affected())
}

/// Delete likes on a comment and on every reply below it.
pub async fn delete_likes_for_comment_subtree(
    conn: &mut SqliteConnection,
    root_id: i64,
) -> sqlx::Result<u64> {
    let sql = format!(
        "{COMMENT_SUBTREE} DELETE FROM likes WHERE content_type = 'comment' AND content_item_id IN (SELECT id FROM subtree)"
    );
    let result = sqlx::query(&sql)
        .bind(root_id)
        .execute(&mut *conn)
        .await?;
    Ok(result.rows_affected())
}

/// A comment and every reply below it, root first.
pub async fn get_comment_subtree(
    conn: &mut SqliteConnection,
    root_id: i64,
) -> sqlx::Result<Vec<Comment>> {
    let sql = format!(
        "{COMMENT_SUBTREE} SELECT c.* FROM comments c JOIN subtree s ON c.id = s.id ORDER BY c.id"
    );
    sqlx::query_as(&sql)
        .bind(root_id)
        .fetch_all(&mut *conn)
        .await
}

/// Delete a comment and its replies.
pub async fn delete_comment_subtree(
    conn: &mut SqliteConnection,
    root_id: i64,
) -> sqlx::Result<u64> {
    let sql = format!("{COMMENT_SUBTREE} DELETE FROM comments WHERE id IN (SELECT id FROM subtree)");
    let result = sqlx::query(&sql)
        .bind(root_id)
        .execute(&mut *conn)
        .await?;
    Ok(result.rows_affected())
}

/// Comments on a post, oldest first.
pub async fn get_comments_by_post_id(
    pool: &SqlitePool,
    post_id: i64,
    offset: i64,
    limit: i64,
) -> sqlx::Result<Vec<Comment>> {
    sqlx::query_as(
        "SELECT * FROM comments WHERE parent_post_id = ? ORDER BY created_at, id LIMIT ? OFFSET ?",
    )
    .bind(post_id)
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await
}

/// Direct replies to a comment, newest first.
pub async fn get_child_comments(
    pool: &SqlitePool,
    comment_id: i64,
    offset: i64,
    limit: i64,
) -> sqlx::Result<Vec<Comment>> {
    sqlx::query_as(
        "SELECT * FROM comments WHERE parent_comment_id = ? ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?",
    )
    .bind(comment_id)
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await
}

// ========== Likes ==========

/// Insert a like row, returning its ID.
pub async fn insert_like(
    conn: &mut SqliteConnection,
    user_id: i64,
    target: ContentKey,
) -> sqlx::Result<i64> {
    let result =
        sqlx::query("INSERT INTO likes (user_id, content_type, content_item_id) VALUES (?, ?, ?)")
            .bind(user_id)
            .bind(target.content_type.as_str())
            .bind(target.id)
            .execute(&mut *conn)
            .await?;

    Ok(result.last_insert_rowid())
}

/// Find a user's like on an item.
pub async fn get_like<'e, E>(
    executor: E,
    user_id: i64,
    target: ContentKey,
) -> sqlx::Result<Option<Like>>
where
    E: Executor<'e, Database = Sqlite>,
{
    sqlx::query_as(
        r"
        SELECT id, user_id, content_item_id, content_type FROM likes
        WHERE user_id = ? AND content_type = ? AND content_item_id = ?
        ",
    )
    .bind(user_id)
    .bind(target.content_type.as_str())
    .bind(target.id)
    .fetch_optional(executor)
    .await
}

/// Delete a like row by ID.
pub async fn delete_like_row(conn: &mut SqliteConnection, id: i64) -> sqlx::Result<u64> {
    let result = sqlx::query("DELETE FROM likes WHERE id = ?")
        .bind(id)
        .execute(&mut *conn)
        .await?;
    Ok(result.rows_affected())
}

// ========== Follows ==========

/// Insert a follow edge, returning its ID.
pub async fn insert_follow(pool: &SqlitePool, follow: &NewFollow) -> sqlx::Result<i64> {
    let result = sqlx::query("INSERT INTO follows (follower_id, following_id) VALUES (?, ?)")
        .bind(follow.follower_id)
        .bind(follow.following_id)
        .execute(pool)
        .await?;
    Ok(result.last_insert_rowid())
}

/// Get a follow edge.
pub async fn get_follow(
    pool: &SqlitePool,
    follower_id: i64,
    following_id: i64,
) -> sqlx::Result<Option<Follow>> {
    sqlx::query_as("SELECT * FROM follows WHERE follower_id = ? AND following_id = ?")
        .bind(follower_id)
        .bind(following_id)
        .fetch_optional(pool)
        .await
}

/// Delete a follow edge.
pub async fn delete_follow(
    pool: &SqlitePool,
    follower_id: i64,
    following_id: i64,
) -> sqlx::Result<u64> {
    let result = sqlx::query("DELETE FROM follows WHERE follower_id = ? AND following_id = ?")
        .bind(follower_id)
        .bind(following_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

/// IDs of the users a user follows.
pub async fn get_following_ids(pool: &SqlitePool, follower_id: i64) -> sqlx::Result<Vec<i64>> {
    let rows: Vec<(i64,)> =
        sqlx::query_as("SELECT following_id FROM follows WHERE follower_id = ? ORDER BY id")
            .bind(follower_id)
            .fetch_all(pool)
            .await?;
    Ok(rows.into_iter().map(|(id,)| id).collect())
}
