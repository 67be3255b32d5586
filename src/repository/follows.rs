use tracing::debug;

use super::Repository;
use crate::db;
use crate::domain::{Follow, NewFollow};
use crate::error::{is_foreign_key_violation, is_unique_violation, RepositoryError};

impl Repository {
    /// # Errors
    ///
    /// Returns `EntityAlreadyExists` for a duplicate follow and
    /// `EntityDoesNotExist` if either user is missing.
    pub async fn follow(&self, follow: &NewFollow) -> Result<Follow, RepositoryError> {
        db::insert_follow(&self.pool, follow).await.map_err(|e| {
            if is_unique_violation(&e) {
                RepositoryError::EntityAlreadyExists(format!(
                    "user {} already follows user {}",
                    follow.follower_id, follow.following_id
                ))
            } else if is_foreign_key_violation(&e) {
                RepositoryError::EntityDoesNotExist(format!(
                    "user {} or user {}",
                    follow.follower_id, follow.following_id
                ))
            } else {
                RepositoryError::failed("failed to create follow")(e)
            }
        })?;

        debug!(follower_id = follow.follower_id, following_id = follow.following_id, "Created follow");
        db::get_follow(&self.pool, follow.follower_id, follow.following_id)
            .await
            .map_err(RepositoryError::failed("failed to load follow"))?
            .ok_or_else(|| RepositoryError::EntityDoesNotExist("follow".to_string()))
    }

    /// # Errors
    ///
    /// Returns `EntityDoesNotExist` if the follow edge is missing.
    pub async fn unfollow(&self, follower_id: i64, following_id: i64) -> Result<(), RepositoryError> {
        let rows = db::delete_follow(&self.pool, follower_id, following_id)
            .await
            .map_err(RepositoryError::failed("failed to delete follow"))?;
        if rows == 0 {
            return Err(RepositoryError::EntityDoesNotExist(format!(
                "user {follower_id} does not follow user {following_id}"
            )));
        }
        Ok(())
    }

    /// # Errors
    ///
    /// Returns `EntityOperationFailed` if the query fails.
    pub async fn list_following_ids(&self, follower_id: i64) -> Result<Vec<i64>, RepositoryError> {
        db::get_following_ids(&self.pool, follower_id)
            .await
            .map_err(RepositoryError::failed("failed to list follows"))
    }
}
