//! Which write path owns each counter.
//!
//! A counter that is adjusted both in-transaction and through the buffer is
//! counted twice, so every counter kind is assigned exactly one path.

use std::fmt;
use std::str::FromStr;

use crate::domain::CounterField;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CounterPath {
    /// Adjusted inside the write transaction.
    Direct,
    /// Accumulated in the buffer after commit and reconciled later.
    Buffered,
}

impl CounterPath {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Direct => "direct",
            Self::Buffered => "buffered",
        }
    }
}

impl fmt::Display for CounterPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CounterPath {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "direct" => Ok(Self::Direct),
            "buffered" => Ok(Self::Buffered),
            _ => Err(format!("must be 'direct' or 'buffered', got '{s}'")),
        }
    }
}

/// Path assignment for the counters that support both paths.
///
/// `likes_count` has no buffered path and is always direct.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CounterPolicy {
    pub comments_count: CounterPath,
    pub reposts_count: CounterPath,
}

impl CounterPolicy {
    #[must_use]
    pub const fn all_direct() -> Self {
        Self {
            comments_count: CounterPath::Direct,
            reposts_count: CounterPath::Direct,
        }
    }

    #[must_use]
    pub const fn all_buffered() -> Self {
        Self {
            comments_count: CounterPath::Buffered,
            reposts_count: CounterPath::Buffered,
        }
    }

    #[must_use]
    pub fn path_for(&self, field: CounterField) -> CounterPath {
        match field {
            CounterField::LikesCount => CounterPath::Direct,
            CounterField::CommentsCount => self.comments_count,
            CounterField::RepostsCount => self.reposts_count,
        }
    }
}

impl Default for CounterPolicy {
    fn default() -> Self {
        Self::all_buffered()
    }
}
