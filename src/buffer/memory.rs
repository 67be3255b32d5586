use std::collections::{BTreeMap, HashMap};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{BufferError, CounterBuffer, LockToken};

#[derive(Debug)]
struct HeldLock {
    token: LockToken,
    expires_at: Instant,
}

/// In-process buffer for single-process deployments and tests.
///
/// Each operation takes the mutex once, which makes it atomic in the same
/// sense as the corresponding Redis command.
#[derive(Debug, Default)]
pub struct MemoryBuffer {
    hashes: Mutex<BTreeMap<String, HashMap<String, i64>>>,
    locks: Mutex<HashMap<String, HeldLock>>,
}

impl MemoryBuffer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys currently holding at least one field.
    #[must_use]
    pub fn key_count(&self) -> usize {
        self.hashes.lock().len()
    }
}

fn add(hashes: &mut BTreeMap<String, HashMap<String, i64>>, key: &str, field: &str, delta: i64) -> i64 {
    let value = hashes
        .entry(key.to_string())
        .or_default()
        .entry(field.to_string())
        .or_insert(0);
    *value += delta;
    *value
}

fn matches_pattern(pattern: &str, key: &str) -> bool {
    pattern
        .strip_suffix('*')
        .map_or_else(|| pattern == key, |prefix| key.starts_with(prefix))
}

#[async_trait]
impl CounterBuffer for MemoryBuffer {
    async fn incr(&self, key: &str, field: &str, delta: i64) -> Result<i64, BufferError> {
        Ok(add(&mut self.hashes.lock(), key, field, delta))
    }

    async fn incr_many(&self, increments: &[(&str, &str, i64)]) -> Result<Vec<i64>, BufferError> {
        let mut hashes = self.hashes.lock();
        Ok(increments
            .iter()
            .map(|&(key, field, delta)| add(&mut hashes, key, field, delta))
            .collect())
    }

    async fn get(&self, key: &str, field: &str) -> Result<i64, BufferError> {
        let hashes = self.hashes.lock();
        Ok(hashes
            .get(key)
            .and_then(|fields| fields.get(field))
            .copied()
            .unwrap_or(0))
    }

    async fn settle(&self, key: &str, field: &str, applied: i64) -> Result<i64, BufferError> {
        let mut hashes = self.hashes.lock();
        let Some(fields) = hashes.get_mut(key) else {
            // Nothing to settle against; record the overdraw so it is not lost.
            if applied != 0 {
                hashes
                    .entry(key.to_string())
                    .or_default()
                    .insert(field.to_string(), -applied);
            }
            return Ok(-applied);
        };

        let value = fields.entry(field.to_string()).or_insert(0);
        *value -= applied;
        let remaining = *value;
        if remaining == 0 {
            fields.remove(field);
        }
        if fields.is_empty() {
            hashes.remove(key);
        }
        Ok(remaining)
    }

    async fn scan(&self, pattern: &str) -> Result<Vec<String>, BufferError> {
        let hashes = self.hashes.lock();
        Ok(hashes
            .keys()
            .filter(|key| matches_pattern(pattern, key))
            .cloned()
            .collect())
    }

    async fn try_lock(&self, name: &str, ttl: Duration) -> Result<Option<LockToken>, BufferError> {
        let mut locks = self.locks.lock();
        let now = Instant::now();
        if let Some(held) = locks.get(name) {
            if held.expires_at > now {
                return Ok(None);
            }
        }

        let token = LockToken::generate();
        locks.insert(
            name.to_string(),
            HeldLock {
                token: token.clone(),
                expires_at: now + ttl,
            },
        );
        Ok(Some(token))
    }

    async fn unlock(&self, name: &str, token: &LockToken) -> Result<bool, BufferError> {
        let mut locks = self.locks.lock();
        match locks.get(name) {
            Some(held) if held.token == *token => {
                locks.remove(name);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}
