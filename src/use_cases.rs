//! Application commands. Each builds and validates its entity, calls the
//! repository, and reports failures as [`UseCaseError`].

use serde::Serialize;
use tracing::info;

use crate::domain::{
    Comment, ContentKey, ContentType, Follow, Like, NewComment, NewFollow, NewPost, Post,
};
use crate::error::UseCaseError;
use crate::repository::Repository;

/// A post or a comment.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "content_type", rename_all = "lowercase")]
pub enum ContentItem {
    Post(Post),
    Comment(Comment),
}

impl ContentItem {
    #[must_use]
    pub fn key(&self) -> ContentKey {
        match self {
            Self::Post(post) => post.key(),
            Self::Comment(comment) => comment.key(),
        }
    }
}

fn unauthorized(e: crate::error::DomainValidationError) -> UseCaseError {
    UseCaseError::Unauthorized(e.0)
}

fn parse_content_type(tag: &str) -> Result<ContentType, UseCaseError> {
    Ok(ContentType::parse(tag)?)
}

async fn load_content(repo: &Repository, key: ContentKey) -> Result<ContentItem, UseCaseError> {
    Ok(match key.content_type {
        ContentType::Post => ContentItem::Post(repo.get_post(key.id).await?),
        ContentType::Comment => ContentItem::Comment(repo.get_comment(key.id).await?),
    })
}

pub struct CreateLike {
    repo: Repository,
}

impl CreateLike {
    #[must_use]
    pub fn new(repo: Repository) -> Self {
        Self { repo }
    }

    /// # Errors
    ///
    /// `AlreadyExist` if the user already likes the item, `NotFound` if the
    /// item is missing, `InvalidObject` for an unknown content type.
    pub async fn execute(
        &self,
        user_id: i64,
        content_type: &str,
        content_id: i64,
    ) -> Result<Like, UseCaseError> {
        let target = ContentKey::new(parse_content_type(content_type)?, content_id);
        Ok(self.repo.create_like(user_id, target).await?)
    }
}

pub struct DeleteLike {
    repo: Repository,
}

impl DeleteLike {
    #[must_use]
    pub fn new(repo: Repository) -> Self {
        Self { repo }
    }

    /// # Errors
    ///
    /// `NotFound` if the user does not like the item.
    pub async fn execute(
        &self,
        user_id: i64,
        content_type: &str,
        content_id: i64,
    ) -> Result<(), UseCaseError> {
        let target = ContentKey::new(parse_content_type(content_type)?, content_id);
        let like = self.repo.get_like(user_id, target).await?;
        like.verify_deletable_by(user_id).map_err(unauthorized)?;
        Ok(self.repo.delete_like(&like).await?)
    }
}

pub struct CreatePost {
    repo: Repository,
}

impl CreatePost {
    #[must_use]
    pub fn new(repo: Repository) -> Self {
        Self { repo }
    }

    /// # Errors
    ///
    /// `InvalidObject` for invalid content, `NotFound` for an unknown author.
    pub async fn execute(&self, author_id: i64, content: &str) -> Result<Post, UseCaseError> {
        let post = NewPost::new(author_id, content)?;
        Ok(self.repo.create_post(&post).await?)
    }
}

pub struct DeletePost {
    repo: Repository,
}

impl DeletePost {
    #[must_use]
    pub fn new(repo: Repository) -> Self {
        Self { repo }
    }

    /// # Errors
    ///
    /// `NotFound` if the post is missing, `Unauthorized` if `user_id` is not
    /// its author.
    pub async fn execute(&self, user_id: i64, post_id: i64) -> Result<(), UseCaseError> {
        let post = self.repo.get_post(post_id).await?;
        post.verify_author(user_id).map_err(unauthorized)?;
        Ok(self.repo.delete_post(post_id).await?)
    }
}

pub struct CreateComment {
    repo: Repository,
}

impl CreateComment {
    #[must_use]
    pub fn new(repo: Repository) -> Self {
        Self { repo }
    }

    /// # Errors
    ///
    /// `InvalidObject` for invalid content or a parent comment on another
    /// post, `NotFound` if a parent is missing.
    pub async fn execute(
        &self,
        author_id: i64,
        content: &str,
        parent_post_id: i64,
        parent_comment_id: Option<i64>,
    ) -> Result<Comment, UseCaseError> {
        let comment = NewComment::new(author_id, content, parent_post_id, parent_comment_id)?;
        Ok(self.repo.create_comment(&comment).await?)
    }
}

pub struct DeleteComment {
    repo: Repository,
}

impl DeleteComment {
    #[must_use]
    pub fn new(repo: Repository) -> Self {
        Self { repo }
    }

    /// # Errors
    ///
    /// `NotFound` if the comment is missing, `Unauthorized` if `user_id` is
    /// not its author.
    pub async fn execute(&self, user_id: i64, comment_id: i64) -> Result<(), UseCaseError> {
        let comment = self.repo.get_comment(comment_id).await?;
        comment.verify_author(user_id).map_err(unauthorized)?;
        Ok(self.repo.delete_comment(comment_id).await?)
    }
}

/// Where a repost is placed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepostTarget {
    /// As a new top-level post.
    Post,
    /// As a comment under `post_id`, optionally replying to a comment.
    Comment {
        post_id: i64,
        parent_comment_id: Option<i64>,
    },
}

impl RepostTarget {
    /// Build a target from its wire form.
    ///
    /// # Errors
    ///
    /// `InvalidObject` for an unknown target type, or a comment target
    /// without a post id.
    pub fn parse(
        target_type: &str,
        post_id: Option<i64>,
        parent_comment_id: Option<i64>,
    ) -> Result<Self, UseCaseError> {
        match parse_content_type(target_type)? {
            ContentType::Post => Ok(Self::Post),
            ContentType::Comment => {
                let post_id = post_id.ok_or_else(|| {
                    UseCaseError::InvalidObject(
                        "reposting as a comment requires a target post id".to_string(),
                    )
                })?;
                Ok(Self::Comment {
                    post_id,
                    parent_comment_id,
                })
            }
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RepostResult {
    pub repost: ContentItem,
    /// The original as stored once the repost has committed.
    pub original: ContentItem,
}

pub struct RepostContent {
    repo: Repository,
}

impl RepostContent {
    #[must_use]
    pub fn new(repo: Repository) -> Self {
        Self { repo }
    }

    /// # Errors
    ///
    /// `InvalidObject` for invalid content or an unknown content type,
    /// `NotFound` if the original or the target post is missing.
    pub async fn execute(
        &self,
        author_id: i64,
        content: &str,
        repost_of: i64,
        repost_of_content_type: &str,
        target: RepostTarget,
    ) -> Result<RepostResult, UseCaseError> {
        let original = ContentKey::new(parse_content_type(repost_of_content_type)?, repost_of);

        let repost = match target {
            RepostTarget::Post => {
                let post = NewPost::repost(author_id, content, original)?;
                ContentItem::Post(self.repo.repost_as_post(&post).await?)
            }
            RepostTarget::Comment {
                post_id,
                parent_comment_id,
            } => {
                let comment =
                    NewComment::repost(author_id, content, post_id, parent_comment_id, original)?;
                ContentItem::Comment(self.repo.repost_as_comment(&comment).await?)
            }
        };

        info!(repost = %repost.key(), %original, "Reposted content");
        let original = load_content(&self.repo, original).await?;
        Ok(RepostResult { repost, original })
    }
}

pub struct FollowUser {
    repo: Repository,
}

impl FollowUser {
    #[must_use]
    pub fn new(repo: Repository) -> Self {
        Self { repo }
    }

    /// # Errors
    ///
    /// `InvalidObject` for a self-follow, `AlreadyExist` for a duplicate,
    /// `NotFound` if either user is missing.
    pub async fn execute(&self, follower_id: i64, following_id: i64) -> Result<Follow, UseCaseError> {
        let follow = NewFollow::new(follower_id, following_id)?;
        Ok(self.repo.follow(&follow).await?)
    }
}
