//! Content lifecycle events and their translation into buffered deltas.

use std::sync::Arc;

use tracing::info;

use crate::buffer::{BufferError, CounterBuffer};
use crate::domain::{Comment, ContentKey, CounterField};

/// A committed change that moves a comment or repost counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    CommentCreated {
        parent_post_id: i64,
        parent_comment_id: Option<i64>,
    },
    CommentDeleted {
        parent_post_id: i64,
        parent_comment_id: Option<i64>,
    },
    RepostCreated {
        original: ContentKey,
    },
    RepostDeleted {
        original: ContentKey,
    },
}

impl LifecycleEvent {
    /// Events for removing an existing comment row.
    #[must_use]
    pub fn for_deleted_comment(comment: &Comment) -> Vec<Self> {
        let mut events = vec![Self::CommentDeleted {
            parent_post_id: comment.parent_post_id,
            parent_comment_id: comment.parent_comment_id,
        }];
        if let Some(original) = comment.repost_origin() {
            events.push(Self::RepostDeleted { original });
        }
        events
    }

    /// The counter this event moves.
    #[must_use]
    pub fn field(&self) -> CounterField {
        match self {
            Self::CommentCreated { .. } | Self::CommentDeleted { .. } => {
                CounterField::CommentsCount
            }
            Self::RepostCreated { .. } | Self::RepostDeleted { .. } => CounterField::RepostsCount,
        }
    }

    #[must_use]
    pub fn delta(&self) -> i64 {
        match self {
            Self::CommentCreated { .. } | Self::RepostCreated { .. } => 1,
            Self::CommentDeleted { .. } | Self::RepostDeleted { .. } => -1,
        }
    }

    /// Rows whose counter moves: the owning post and, for a reply, the parent
    /// comment; or the original item of a repost.
    #[must_use]
    pub fn targets(&self) -> Vec<ContentKey> {
        match *self {
            Self::CommentCreated {
                parent_post_id,
                parent_comment_id,
            }
            | Self::CommentDeleted {
                parent_post_id,
                parent_comment_id,
            } => {
                let mut targets = vec![ContentKey::post(parent_post_id)];
                if let Some(parent_comment_id) = parent_comment_id {
                    targets.push(ContentKey::comment(parent_comment_id));
                }
                targets
            }
            Self::RepostCreated { original } | Self::RepostDeleted { original } => vec![original],
        }
    }
}

/// Applies lifecycle events to the counter buffer.
#[derive(Clone)]
pub struct CounterHooks {
    buffer: Arc<dyn CounterBuffer>,
}

impl CounterHooks {
    #[must_use]
    pub fn new(buffer: Arc<dyn CounterBuffer>) -> Self {
        Self { buffer }
    }

    /// Push the event's deltas into the buffer.
    ///
    /// Every target of the event is incremented in one `incr_many`, so a
    /// reply never reaches the post without its parent comment.
    ///
    /// # Errors
    ///
    /// Returns the buffer error; in that case no target was incremented.
    pub async fn apply(&self, event: &LifecycleEvent) -> Result<(), BufferError> {
        let field = event.field();
        let delta = event.delta();

        let keys: Vec<String> = event.targets().iter().map(ToString::to_string).collect();
        let increments: Vec<(&str, &str, i64)> = keys
            .iter()
            .map(|key| (key.as_str(), field.column(), delta))
            .collect();

        let pending = self.buffer.incr_many(&increments).await?;
        for (key, pending) in keys.iter().zip(pending) {
            info!(key = %key, %field, delta, pending, "Buffered counter delta");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::MemoryBuffer;

    #[test]
    fn test_nested_comment_targets_post_and_parent() {
        let event = LifecycleEvent::CommentCreated {
            parent_post_id: 1,
            parent_comment_id: Some(5),
        };
        assert_eq!(
            event.targets(),
            vec![ContentKey::post(1), ContentKey::comment(5)]
        );
        assert_eq!(event.field(), CounterField::CommentsCount);
        assert_eq!(event.delta(), 1);
    }

    #[test]
    fn test_repost_targets_original() {
        let event = LifecycleEvent::RepostDeleted {
            original: ContentKey::comment(3),
        };
        assert_eq!(event.targets(), vec![ContentKey::comment(3)]);
        assert_eq!(event.field(), CounterField::RepostsCount);
        assert_eq!(event.delta(), -1);
    }

    #[tokio::test]
    async fn test_apply_buffers_deltas() {
        let buffer = Arc::new(MemoryBuffer::new());
        let hooks = CounterHooks::new(buffer.clone());

        for _ in 0..3 {
            hooks
                .apply(&LifecycleEvent::CommentCreated {
                    parent_post_id: 1,
                    parent_comment_id: None,
                })
                .await
                .unwrap();
        }
        hooks
            .apply(&LifecycleEvent::CommentDeleted {
                parent_post_id: 1,
                parent_comment_id: Some(2),
            })
            .await
            .unwrap();

        assert_eq!(buffer.get("post:1", "comments_count").await.unwrap(), 2);
        assert_eq!(buffer.get("comment:2", "comments_count").await.unwrap(), -1);
        assert_eq!(buffer.get("post:1", "reposts_count").await.unwrap(), 0);
    }
}
