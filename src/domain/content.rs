use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::RepositoryError;

/// The two kinds of content item that carry cached counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Post,
    Comment,
}

impl ContentType {
    pub const ALL: [Self; 2] = [Self::Post, Self::Comment];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Post => "post",
            Self::Comment => "comment",
        }
    }

    /// Resolve a stable string tag.
    ///
    /// # Errors
    ///
    /// Returns `InvalidEntityInput` for any tag other than `post` or `comment`.
    pub fn parse(tag: &str) -> Result<Self, RepositoryError> {
        match tag {
            "post" => Ok(Self::Post),
            "comment" => Ok(Self::Comment),
            other => Err(RepositoryError::InvalidEntityInput(format!(
                "unsupported content type: {other}"
            ))),
        }
    }

    /// Table holding rows of this type.
    #[must_use]
    pub fn table(self) -> &'static str {
        match self {
            Self::Post => "posts",
            Self::Comment => "comments",
        }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContentType {
    type Err = RepositoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// A cached counter column on a content row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CounterField {
    LikesCount,
    CommentsCount,
    RepostsCount,
}

impl CounterField {
    pub const ALL: [Self; 3] = [Self::LikesCount, Self::CommentsCount, Self::RepostsCount];

    /// Fields that may hold pending deltas in the counter buffer.
    pub const BUFFERED: [Self; 2] = [Self::CommentsCount, Self::RepostsCount];

    /// Column name, also used as the buffer hash field.
    #[must_use]
    pub fn column(self) -> &'static str {
        match self {
            Self::LikesCount => "likes_count",
            Self::CommentsCount => "comments_count",
            Self::RepostsCount => "reposts_count",
        }
    }
}

impl fmt::Display for CounterField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column())
    }
}

/// Identity of one content item: `post:42`, `comment:7`.
///
/// Doubles as the counter buffer key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ContentKey {
    pub content_type: ContentType,
    pub id: i64,
}

impl ContentKey {
    #[must_use]
    pub const fn new(content_type: ContentType, id: i64) -> Self {
        Self { content_type, id }
    }

    #[must_use]
    pub const fn post(id: i64) -> Self {
        Self::new(ContentType::Post, id)
    }

    #[must_use]
    pub const fn comment(id: i64) -> Self {
        Self::new(ContentType::Comment, id)
    }

    /// Buffer scan pattern matching every key of one content type.
    #[must_use]
    pub fn pattern(content_type: ContentType) -> String {
        format!("{content_type}:*")
    }

    /// Parse a `{type}:{id}` key.
    ///
    /// # Errors
    ///
    /// Returns `InvalidEntityInput` if the tag is unknown or the id is not an integer.
    pub fn parse(key: &str) -> Result<Self, RepositoryError> {
        let (tag, id) = key.split_once(':').ok_or_else(|| {
            RepositoryError::InvalidEntityInput(format!("malformed content key: {key}"))
        })?;
        let content_type = ContentType::parse(tag)?;
        let id = id.parse::<i64>().map_err(|_| {
            RepositoryError::InvalidEntityInput(format!("malformed content id in key: {key}"))
        })?;
        Ok(Self::new(content_type, id))
    }
}

impl fmt::Display for ContentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.content_type, self.id)
    }
}
