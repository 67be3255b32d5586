use tracing::{debug, info};

use super::Repository;
use crate::db;
use crate::domain::{validate_content, NewPost, Post};
use crate::error::{is_foreign_key_violation, RepositoryError};
use crate::hooks::LifecycleEvent;

impl Repository {
    /// Create a post, or a repost-as-post when `post.repost_of` is set.
    ///
    /// # Errors
    ///
    /// Returns `EntityDoesNotExist` if the author or the reposted item is
    /// missing.
    pub async fn create_post(&self, post: &NewPost) -> Result<Post, RepositoryError> {
        let mut tx = self.begin().await?;

        let id = db::insert_post(tx.conn(), post).await.map_err(|e| {
            if is_foreign_key_violation(&e) {
                RepositoryError::EntityDoesNotExist(format!("user {}", post.author_id))
            } else {
                RepositoryError::failed("failed to create post")(e)
            }
        })?;

        if let Some(original) = post.repost_of {
            // Checked after the insert so the transaction already holds the write lock
            let exists = db::content_exists(tx.conn(), original)
                .await
                .map_err(RepositoryError::failed("failed to look up reposted item"))?;
            if !exists {
                return Err(RepositoryError::EntityDoesNotExist(original.to_string()));
            }
            tx.emit(LifecycleEvent::RepostCreated { original }).await?;
        }

        let created = db::get_post(tx.conn(), id)
            .await
            .map_err(RepositoryError::failed("failed to load created post"))?
            .ok_or_else(|| RepositoryError::EntityDoesNotExist(format!("post {id}")))?;

        tx.commit().await?;
        info!(post_id = id, author_id = post.author_id, repost_of = ?post.repost_of, "Created post");
        Ok(created)
    }

    /// Repost an item as a new post.
    ///
    /// # Errors
    ///
    /// Returns `InvalidEntityInput` if `post` does not reference an original.
    pub async fn repost_as_post(&self, post: &NewPost) -> Result<Post, RepositoryError> {
        if post.repost_of.is_none() {
            return Err(RepositoryError::InvalidEntityInput(
                "a repost must reference the reposted item".to_string(),
            ));
        }
        self.create_post(post).await
    }

    /// # Errors
    ///
    /// Returns `EntityDoesNotExist` if there is no such post.
    pub async fn get_post(&self, id: i64) -> Result<Post, RepositoryError> {
        db::get_post(&self.pool, id)
            .await
            .map_err(RepositoryError::failed("failed to load post"))?
            .ok_or_else(|| RepositoryError::EntityDoesNotExist(format!("post {id}")))
    }

    /// # Errors
    ///
    /// Returns `InvalidEntityInput` for invalid content and
    /// `EntityDoesNotExist` if there is no such post.
    pub async fn update_post_content(&self, id: i64, content: &str) -> Result<Post, RepositoryError> {
        validate_content(content)?;

        let rows = db::update_post_content(&self.pool, id, content)
            .await
            .map_err(RepositoryError::failed("failed to update post"))?;
        if rows == 0 {
            return Err(RepositoryError::EntityDoesNotExist(format!("post {id}")));
        }
        self.get_post(id).await
    }

    /// Delete a post with all of its comments and the likes on them.
    ///
    /// Reposts removed along the way release their originals' repost counts.
    ///
    /// # Errors
    ///
    /// Returns `EntityDoesNotExist` if there is no such post.
    pub async fn delete_post(&self, id: i64) -> Result<(), RepositoryError> {
        let mut tx = self.begin().await?;

        let likes_removed = db::delete_likes_for_post_tree(tx.conn(), id)
            .await
            .map_err(RepositoryError::failed("failed to delete likes"))?;

        let Some(post) = db::get_post(tx.conn(), id)
            .await
            .map_err(RepositoryError::failed("failed to load post"))?
        else {
            return Err(RepositoryError::EntityDoesNotExist(format!("post {id}")));
        };

        let repost_comments = db::get_repost_comments_in_post(tx.conn(), id)
            .await
            .map_err(RepositoryError::failed("failed to load comments"))?;

        db::delete_post_row(tx.conn(), id)
            .await
            .map_err(RepositoryError::failed("failed to delete post"))?;

        if let Some(original) = post.repost_origin() {
            tx.emit(LifecycleEvent::RepostDeleted { original }).await?;
        }
        // Comment counters on the deleted post itself are moot
        for comment in &repost_comments {
            if let Some(original) = comment.repost_origin() {
                tx.emit(LifecycleEvent::RepostDeleted { original }).await?;
            }
        }

        tx.commit().await?;
        debug!(post_id = id, likes_removed, reposts_released = repost_comments.len(), "Deleted post");
        Ok(())
    }

    /// Posts by the given authors, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `EntityOperationFailed` if the query fails.
    pub async fn list_posts_by_authors(
        &self,
        author_ids: &[i64],
        offset: i64,
        limit: i64,
    ) -> Result<Vec<Post>, RepositoryError> {
        db::get_posts_by_authors(&self.pool, author_ids, offset, limit)
            .await
            .map_err(RepositoryError::failed("failed to list posts"))
    }
}
