//! Fast shared counter buffer.
//!
//! Holds pending, not-yet-reconciled counter deltas as hash fields under
//! `{content_type}:{content_id}` keys, plus the distributed lock used by the
//! reconciliation job. Two backends: Redis for deployments where writers and
//! reconcilers live in separate processes, and an in-process map.

mod memory;
mod redis;

pub use self::memory::MemoryBuffer;
pub use self::redis::RedisBuffer;

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use rand::{thread_rng, Rng};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BufferError {
    #[error("redis error: {0}")]
    Redis(#[from] ::redis::RedisError),
}

/// Proof of lock ownership; only the holder's token can release the lock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockToken(String);

impl LockToken {
    /// Generate a random token.
    #[must_use]
    pub fn generate() -> Self {
        let value: u128 = thread_rng().gen();
        Self(format!("{value:032x}"))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LockToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Operations the counter core needs from the buffer.
///
/// Every method is atomic with respect to concurrent callers on the same
/// key/field.
#[async_trait]
pub trait CounterBuffer: Send + Sync {
    /// Add `delta` to a field, creating it at zero if absent. Returns the new value.
    async fn incr(&self, key: &str, field: &str, delta: i64) -> Result<i64, BufferError>;

    /// Apply several increments as one unit: either every one lands or none
    /// does. Returns the new values in order.
    async fn incr_many(&self, increments: &[(&str, &str, i64)]) -> Result<Vec<i64>, BufferError>;

    /// Current value of a field, 0 if absent.
    async fn get(&self, key: &str, field: &str) -> Result<i64, BufferError>;

    /// Subtract an amount that has been applied to the store, deleting the
    /// field once it reaches zero. Increments that arrived after the amount
    /// was read are left in place. Returns the remaining value.
    async fn settle(&self, key: &str, field: &str, applied: i64) -> Result<i64, BufferError>;

    /// Keys matching a `prefix*` pattern (or an exact key).
    async fn scan(&self, pattern: &str) -> Result<Vec<String>, BufferError>;

    /// Take the named lock for `ttl` without waiting. `None` if another
    /// holder has it.
    async fn try_lock(&self, name: &str, ttl: Duration) -> Result<Option<LockToken>, BufferError>;

    /// Release the named lock if `token` still owns it.
    async fn unlock(&self, name: &str, token: &LockToken) -> Result<bool, BufferError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_tokens_are_unique() {
        let a = LockToken::generate();
        let b = LockToken::generate();
        assert_ne!(a, b);
        assert_eq!(a.as_str().len(), 32);
    }
}
