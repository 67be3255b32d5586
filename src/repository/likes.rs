use tracing::debug;

use super::Repository;
use crate::db;
use crate::domain::{ContentKey, Like};
use crate::error::{is_foreign_key_violation, is_unique_violation, RepositoryError};

impl Repository {
    /// Like an item and bump its `likes_count` in the same transaction.
    ///
    /// # Errors
    ///
    /// Returns `EntityAlreadyExists` if the user already likes the item and
    /// `EntityDoesNotExist` if the item is missing.
    pub async fn create_like(&self, user_id: i64, target: ContentKey) -> Result<Like, RepositoryError> {
        let mut tx = self.begin().await?;

        let id = db::insert_like(tx.conn(), user_id, target)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    RepositoryError::EntityAlreadyExists(format!(
                        "user {user_id} already likes {target}"
                    ))
                } else if is_foreign_key_violation(&e) {
                    RepositoryError::EntityDoesNotExist(format!("user {user_id}"))
                } else {
                    RepositoryError::failed("failed to create like")(e)
                }
            })?;

        let exists = db::content_exists(tx.conn(), target)
            .await
            .map_err(RepositoryError::failed("failed to look up liked item"))?;
        if !exists {
            return Err(RepositoryError::EntityDoesNotExist(target.to_string()));
        }

        db::adjust_likes_count(tx.conn(), target.content_type, target.id, 1).await?;
        tx.commit().await?;

        debug!(like_id = id, user_id, %target, "Created like");
        Ok(Like {
            id,
            user_id,
            content_item_id: target.id,
            content_type: target.content_type.as_str().to_string(),
        })
    }

    /// Remove a like and decrement its target's `likes_count`.
    ///
    /// # Errors
    ///
    /// Returns `EntityDoesNotExist` if the like row is already gone.
    pub async fn delete_like(&self, like: &Like) -> Result<(), RepositoryError> {
        let target = like.target()?;
        let mut tx = self.begin().await?;

        let rows = db::delete_like_row(tx.conn(), like.id)
            .await
            .map_err(RepositoryError::failed("failed to delete like"))?;
        if rows == 0 {
            return Err(RepositoryError::EntityDoesNotExist(format!("like {}", like.id)));
        }

        db::adjust_likes_count(tx.conn(), target.content_type, target.id, -1).await?;
        tx.commit().await?;

        debug!(like_id = like.id, user_id = like.user_id, %target, "Deleted like");
        Ok(())
    }

    /// # Errors
    ///
    /// Returns `EntityDoesNotExist` if the user does not like the item.
    pub async fn get_like(&self, user_id: i64, target: ContentKey) -> Result<Like, RepositoryError> {
        db::get_like(&self.pool, user_id, target)
            .await
            .map_err(RepositoryError::failed("failed to load like"))?
            .ok_or_else(|| {
                RepositoryError::EntityDoesNotExist(format!("like by user {user_id} on {target}"))
            })
    }
}
