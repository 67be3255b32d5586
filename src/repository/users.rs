use tracing::info;

use super::Repository;
use crate::db;
use crate::domain::{NewUser, User};
use crate::error::{is_unique_violation, RepositoryError};

impl Repository {
    /// # Errors
    ///
    /// Returns `EntityAlreadyExists` if the username or email is taken.
    pub async fn create_user(&self, user: &NewUser) -> Result<User, RepositoryError> {
        let id = db::insert_user(&self.pool, user).await.map_err(|e| {
            if is_unique_violation(&e) {
                RepositoryError::EntityAlreadyExists(format!(
                    "username or email already registered: {}",
                    user.username
                ))
            } else {
                RepositoryError::failed("failed to create user")(e)
            }
        })?;

        info!(user_id = id, username = %user.username, "Created user");
        self.get_user(id).await
    }

    /// # Errors
    ///
    /// Returns `EntityDoesNotExist` if there is no such user.
    pub async fn get_user(&self, id: i64) -> Result<User, RepositoryError> {
        db::get_user(&self.pool, id)
            .await
            .map_err(RepositoryError::failed("failed to load user"))?
            .ok_or_else(|| RepositoryError::EntityDoesNotExist(format!("user {id}")))
    }
}
