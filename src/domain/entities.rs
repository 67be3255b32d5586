use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::content::{ContentKey, ContentType};
use crate::error::DomainValidationError;

pub const MAX_CONTENT_CHARS: usize = 255;

static EMAIL_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[\w.-]+@[\w.-]+\.\w+$").expect("valid email regex"));

/// A registered user.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub created_at: String,
}

/// A top-level post.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Post {
    pub id: i64,
    pub author_id: i64,
    pub content: String,
    pub likes_count: i64,
    pub comments_count: i64,
    pub reposts_count: i64,
    pub is_repost: bool,
    pub repost_of: Option<i64>,
    pub repost_of_content_type: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// A comment on a post, optionally replying to another comment of the same post.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Comment {
    pub id: i64,
    pub author_id: i64,
    pub content: String,
    pub likes_count: i64,
    pub comments_count: i64,
    pub reposts_count: i64,
    pub is_repost: bool,
    pub repost_of: Option<i64>,
    pub repost_of_content_type: Option<String>,
    pub parent_post_id: i64,
    pub parent_comment_id: Option<i64>,
    pub created_at: String,
    pub updated_at: String,
}

/// Resolve the stored repost columns into the original item's key.
fn repost_origin(
    is_repost: bool,
    repost_of: Option<i64>,
    repost_of_content_type: Option<&str>,
) -> Option<ContentKey> {
    if !is_repost {
        return None;
    }
    let id = repost_of?;
    let content_type = ContentType::parse(repost_of_content_type?).ok()?;
    Some(ContentKey::new(content_type, id))
}

impl Post {
    #[must_use]
    pub fn key(&self) -> ContentKey {
        ContentKey::post(self.id)
    }

    /// The item this post reposts, if any.
    #[must_use]
    pub fn repost_origin(&self) -> Option<ContentKey> {
        repost_origin(
            self.is_repost,
            self.repost_of,
            self.repost_of_content_type.as_deref(),
        )
    }

    /// Only the author may edit or delete a post.
    ///
    /// # Errors
    ///
    /// Returns an error if `user_id` is not the author.
    pub fn verify_author(&self, user_id: i64) -> Result<(), DomainValidationError> {
        verify_author(self.author_id, user_id)
    }
}

impl Comment {
    #[must_use]
    pub fn key(&self) -> ContentKey {
        ContentKey::comment(self.id)
    }

    #[must_use]
    pub fn repost_origin(&self) -> Option<ContentKey> {
        repost_origin(
            self.is_repost,
            self.repost_of,
            self.repost_of_content_type.as_deref(),
        )
    }

    /// Only the author may edit or delete a comment.
    ///
    /// # Errors
    ///
    /// Returns an error if `user_id` is not the author.
    pub fn verify_author(&self, user_id: i64) -> Result<(), DomainValidationError> {
        verify_author(self.author_id, user_id)
    }
}

fn verify_author(author_id: i64, user_id: i64) -> Result<(), DomainValidationError> {
    if author_id == user_id {
        Ok(())
    } else {
        Err(DomainValidationError::new("only the author may modify this content"))
    }
}

/// A like on a post or comment.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Like {
    pub id: i64,
    pub user_id: i64,
    pub content_item_id: i64,
    pub content_type: String,
}

impl Like {
    /// Key of the liked item.
    ///
    /// # Errors
    ///
    /// Returns an error if the stored content type is not recognised.
    pub fn target(&self) -> Result<ContentKey, crate::error::RepositoryError> {
        Ok(ContentKey::new(
            ContentType::parse(&self.content_type)?,
            self.content_item_id,
        ))
    }

    /// Only the liker may remove a like.
    ///
    /// # Errors
    ///
    /// Returns an error if `user_id` did not create this like.
    pub fn verify_deletable_by(&self, user_id: i64) -> Result<(), DomainValidationError> {
        if self.user_id == user_id {
            Ok(())
        } else {
            Err(DomainValidationError::new("only the liker may remove this like"))
        }
    }
}

/// A follow edge between two users.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Follow {
    pub id: i64,
    pub follower_id: i64,
    pub following_id: i64,
    pub created_at: String,
}

/// Validate user-supplied text for a post or comment.
///
/// # Errors
///
/// Returns an error if the content is empty or longer than 255 characters.
pub fn validate_content(content: &str) -> Result<(), DomainValidationError> {
    let chars = content.chars().count();
    if chars == 0 {
        return Err(DomainValidationError::new("content cannot be empty"));
    }
    if chars > MAX_CONTENT_CHARS {
        return Err(DomainValidationError::new(format!(
            "content cannot exceed {MAX_CONTENT_CHARS} characters"
        )));
    }
    Ok(())
}

/// Data for inserting a new user.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
}

impl NewUser {
    /// # Errors
    ///
    /// Returns an error if the username is not 5-15 ASCII alphanumerics or the
    /// email is malformed.
    pub fn new(
        username: impl Into<String>,
        email: impl Into<String>,
    ) -> Result<Self, DomainValidationError> {
        let username = username.into();
        let email = email.into();

        if username.len() < 5 {
            return Err(DomainValidationError::new(
                "username must be at least 5 characters",
            ));
        }
        if username.len() > 15 {
            return Err(DomainValidationError::new(
                "username cannot exceed 15 characters",
            ));
        }
        if !username.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(DomainValidationError::new(
                "username may only contain letters and digits",
            ));
        }
        if !EMAIL_PATTERN.is_match(&email) {
            return Err(DomainValidationError::new("invalid email address"));
        }

        Ok(Self { username, email })
    }
}

/// Data for inserting a new post or a repost-as-post.
#[derive(Debug, Clone)]
pub struct NewPost {
    pub author_id: i64,
    pub content: String,
    pub repost_of: Option<ContentKey>,
}

impl NewPost {
    /// # Errors
    ///
    /// Returns an error if the content is invalid.
    pub fn new(author_id: i64, content: impl Into<String>) -> Result<Self, DomainValidationError> {
        let content = content.into();
        validate_content(&content)?;
        Ok(Self {
            author_id,
            content,
            repost_of: None,
        })
    }

    /// # Errors
    ///
    /// Returns an error if the content is invalid.
    pub fn repost(
        author_id: i64,
        content: impl Into<String>,
        original: ContentKey,
    ) -> Result<Self, DomainValidationError> {
        let mut post = Self::new(author_id, content)?;
        post.repost_of = Some(original);
        Ok(post)
    }
}

/// Data for inserting a new comment or a repost-as-comment.
#[derive(Debug, Clone)]
pub struct NewComment {
    pub author_id: i64,
    pub content: String,
    pub parent_post_id: i64,
    pub parent_comment_id: Option<i64>,
    pub repost_of: Option<ContentKey>,
}

impl NewComment {
    /// # Errors
    ///
    /// Returns an error if the content is invalid.
    pub fn new(
        author_id: i64,
        content: impl Into<String>,
        parent_post_id: i64,
        parent_comment_id: Option<i64>,
    ) -> Result<Self, DomainValidationError> {
        let content = content.into();
        validate_content(&content)?;
        Ok(Self {
            author_id,
            content,
            parent_post_id,
            parent_comment_id,
            repost_of: None,
        })
    }

    /// # Errors
    ///
    /// Returns an error if the content is invalid.
    pub fn repost(
        author_id: i64,
        content: impl Into<String>,
        parent_post_id: i64,
        parent_comment_id: Option<i64>,
        original: ContentKey,
    ) -> Result<Self, DomainValidationError> {
        let mut comment = Self::new(author_id, content, parent_post_id, parent_comment_id)?;
        comment.repost_of = Some(original);
        Ok(comment)
    }
}

/// Data for a new follow edge.
#[derive(Debug, Clone, Copy)]
pub struct NewFollow {
    pub follower_id: i64,
    pub following_id: i64,
}

impl NewFollow {
    /// # Errors
    ///
    /// Returns an error if a user tries to follow themselves.
    pub fn new(follower_id: i64, following_id: i64) -> Result<Self, DomainValidationError> {
        if follower_id == following_id {
            return Err(DomainValidationError::new("users cannot follow themselves"));
        }
        Ok(Self {
            follower_id,
            following_id,
        })
    }
}
