use tracing::{debug, info};

use super::Repository;
use crate::db;
use crate::domain::{validate_content, Comment, NewComment};
use crate::error::{is_foreign_key_violation, RepositoryError};
use crate::hooks::LifecycleEvent;

impl Repository {
    /// Create a comment, or a repost-as-comment when `comment.repost_of` is set.
    ///
    /// # Errors
    ///
    /// Returns `EntityDoesNotExist` if the parent post, the parent comment or
    /// the reposted item is missing, and `InvalidEntityInput` if the parent
    /// comment belongs to a different post.
    pub async fn create_comment(&self, comment: &NewComment) -> Result<Comment, RepositoryError> {
        if let Some(parent_comment_id) = comment.parent_comment_id {
            let parent = db::get_comment(&self.pool, parent_comment_id)
                .await
                .map_err(RepositoryError::failed("failed to load parent comment"))?
                .ok_or_else(|| {
                    RepositoryError::EntityDoesNotExist(format!("comment {parent_comment_id}"))
                })?;
            if parent.parent_post_id != comment.parent_post_id {
                return Err(RepositoryError::InvalidEntityInput(format!(
                    "comment {parent_comment_id} does not belong to post {}",
                    comment.parent_post_id
                )));
            }
        }

        let mut tx = self.begin().await?;

        let id = db::insert_comment(tx.conn(), comment).await.map_err(|e| {
            if is_foreign_key_violation(&e) {
                RepositoryError::EntityDoesNotExist(format!(
                    "post {} or author {}",
                    comment.parent_post_id, comment.author_id
                ))
            } else {
                RepositoryError::failed("failed to create comment")(e)
            }
        })?;

        tx.emit(LifecycleEvent::CommentCreated {
            parent_post_id: comment.parent_post_id,
            parent_comment_id: comment.parent_comment_id,
        })
        .await?;

        if let Some(original) = comment.repost_of {
            let exists = db::content_exists(tx.conn(), original)
                .await
                .map_err(RepositoryError::failed("failed to look up reposted item"))?;
            if !exists {
                return Err(RepositoryError::EntityDoesNotExist(original.to_string()));
            }
            tx.emit(LifecycleEvent::RepostCreated { original }).await?;
        }

        let created = db::get_comment(tx.conn(), id)
            .await
            .map_err(RepositoryError::failed("failed to load created comment"))?
            .ok_or_else(|| RepositoryError::EntityDoesNotExist(format!("comment {id}")))?;

        tx.commit().await?;
        info!(
            comment_id = id,
            post_id = comment.parent_post_id,
            parent_comment_id = ?comment.parent_comment_id,
            "Created comment"
        );
        Ok(created)
    }

    /// Repost an item as a comment under a post.
    ///
    /// # Errors
    ///
    /// Returns `InvalidEntityInput` if `comment` does not reference an original.
    pub async fn repost_as_comment(&self, comment: &NewComment) -> Result<Comment, RepositoryError> {
        if comment.repost_of.is_none() {
            return Err(RepositoryError::InvalidEntityInput(
                "a repost must reference the reposted item".to_string(),
            ));
        }
        self.create_comment(comment).await
    }

    /// # Errors
    ///
    /// Returns `EntityDoesNotExist` if there is no such comment.
    pub async fn get_comment(&self, id: i64) -> Result<Comment, RepositoryError> {
        db::get_comment(&self.pool, id)
            .await
            .map_err(RepositoryError::failed("failed to load comment"))?
            .ok_or_else(|| RepositoryError::EntityDoesNotExist(format!("comment {id}")))
    }

    /// # Errors
    ///
    /// Returns `InvalidEntityInput` for invalid content and
    /// `EntityDoesNotExist` if there is no such comment.
    pub async fn update_comment_content(
        &self,
        id: i64,
        content: &str,
    ) -> Result<Comment, RepositoryError> {
        validate_content(content)?;

        let rows = db::update_comment_content(&self.pool, id, content)
            .await
            .map_err(RepositoryError::failed("failed to update comment"))?;
        if rows == 0 {
            return Err(RepositoryError::EntityDoesNotExist(format!("comment {id}")));
        }
        self.get_comment(id).await
    }

    /// Delete a comment together with every reply below it.
    ///
    /// Each removed comment releases one comment count on its post and parent,
    /// and each removed repost releases its original's repost count.
    ///
    /// # Errors
    ///
    /// Returns `EntityDoesNotExist` if there is no such comment.
    pub async fn delete_comment(&self, id: i64) -> Result<(), RepositoryError> {
        let mut tx = self.begin().await?;

        let likes_removed = db::delete_likes_for_comment_subtree(tx.conn(), id)
            .await
            .map_err(RepositoryError::failed("failed to delete likes"))?;

        let subtree = db::get_comment_subtree(tx.conn(), id)
            .await
            .map_err(RepositoryError::failed("failed to load comment replies"))?;
        if subtree.is_empty() {
            return Err(RepositoryError::EntityDoesNotExist(format!("comment {id}")));
        }

        db::delete_comment_subtree(tx.conn(), id)
            .await
            .map_err(RepositoryError::failed("failed to delete comment"))?;

        for comment in &subtree {
            for event in LifecycleEvent::for_deleted_comment(comment) {
                tx.emit(event).await?;
            }
        }

        tx.commit().await?;
        debug!(comment_id = id, removed = subtree.len(), likes_removed, "Deleted comment");
        Ok(())
    }

    /// Comments on a post, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `EntityDoesNotExist` if there is no such post.
    pub async fn list_comments_for_post(
        &self,
        post_id: i64,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<Comment>, RepositoryError> {
        self.get_post(post_id).await?;
        db::get_comments_by_post_id(&self.pool, post_id, offset, limit)
            .await
            .map_err(RepositoryError::failed("failed to list comments"))
    }

    /// Direct replies to a comment, newest first.
    ///
    /// # Errors
    ///
    /// Returns `EntityDoesNotExist` if there is no such comment.
    pub async fn list_child_comments(
        &self,
        comment_id: i64,
        offset: i64,
        limit: i64,
    ) -> Result<Vec<Comment>, RepositoryError> {
        self.get_comment(comment_id).await?;
        db::get_child_comments(&self.pool, comment_id, offset, limit)
            .await
            .map_err(RepositoryError::failed("failed to list replies"))
    }
}
