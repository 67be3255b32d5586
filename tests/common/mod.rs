//! An in-memory buffer that can be told to fail or to pause mid-run.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use counter_sync::buffer::{BufferError, CounterBuffer, LockToken, MemoryBuffer};
use tokio::sync::Notify;

pub fn buffer_unreachable() -> BufferError {
    BufferError::Redis(redis::RedisError::from((
        redis::ErrorKind::IoError,
        "counter buffer unreachable",
    )))
}

/// Wraps a [`MemoryBuffer`] and injects failures on request.
pub struct FaultyBuffer {
    inner: MemoryBuffer,
    incr_calls: AtomicUsize,
    /// 1-based `incr` call that fails; 0 for none.
    failing_incr: usize,
    fail_incr_many: AtomicBool,
    fail_settle: AtomicBool,
    pause_next_scan: AtomicBool,
    /// Notified when a paused scan has started.
    pub scan_paused: Notify,
    /// Notify to let a paused scan continue.
    pub resume_scan: Notify,
}

impl FaultyBuffer {
    pub fn new() -> Self {
        Self::failing_incr(0)
    }

    /// A buffer whose `n`th single-field `incr` fails.
    pub fn failing_incr(n: usize) -> Self {
        Self {
            inner: MemoryBuffer::new(),
            incr_calls: AtomicUsize::new(0),
            failing_incr: n,
            fail_incr_many: AtomicBool::new(false),
            fail_settle: AtomicBool::new(false),
            pause_next_scan: AtomicBool::new(false),
            scan_paused: Notify::new(),
            resume_scan: Notify::new(),
        }
    }

    pub fn set_fail_incr_many(&self, fail: bool) {
        self.fail_incr_many.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_settle(&self, fail: bool) {
        self.fail_settle.store(fail, Ordering::SeqCst);
    }

    /// Park the next `scan` until `resume_scan` is notified.
    pub fn pause_next_scan(&self) {
        self.pause_next_scan.store(true, Ordering::SeqCst);
    }

    pub fn key_count(&self) -> usize {
        self.inner.key_count()
    }
}

#[async_trait]
impl CounterBuffer for FaultyBuffer {
    async fn incr(&self, key: &str, field: &str, delta: i64) -> Result<i64, BufferError> {
        let call = self.incr_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call == self.failing_incr {
            return Err(buffer_unreachable());
        }
        self.inner.incr(key, field, delta).await
    }

    async fn incr_many(&self, increments: &[(&str, &str, i64)]) -> Result<Vec<i64>, BufferError> {
        if self.fail_incr_many.load(Ordering::SeqCst) {
            return Err(buffer_unreachable());
        }
        self.inner.incr_many(increments).await
    }

    async fn get(&self, key: &str, field: &str) -> Result<i64, BufferError> {
        self.inner.get(key, field).await
    }

    async fn settle(&self, key: &str, field: &str, applied: i64) -> Result<i64, BufferError> {
        if self.fail_settle.load(Ordering::SeqCst) {
            return Err(buffer_unreachable());
        }
        self.inner.settle(key, field, applied).await
    }

    async fn scan(&self, pattern: &str) -> Result<Vec<String>, BufferError> {
        if self.pause_next_scan.swap(false, Ordering::SeqCst) {
            self.scan_paused.notify_one();
            self.resume_scan.notified().await;
        }
        self.inner.scan(pattern).await
    }

    async fn try_lock(&self, name: &str, ttl: Duration) -> Result<Option<LockToken>, BufferError> {
        self.inner.try_lock(name, ttl).await
    }

    async fn unlock(&self, name: &str, token: &LockToken) -> Result<bool, BufferError> {
        self.inner.unlock(name, token).await
    }
}
