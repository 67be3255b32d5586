//! Reconciliation job: drains buffered counter deltas into the database.
//!
//! Runs under a distributed lock so that at most one instance flushes at a
//! time across every process sharing the buffer. A run that cannot take the
//! lock returns immediately; the next scheduled run picks up whatever is
//! still pending.

mod scheduler;

pub use scheduler::{run_reconcile_worker, ReconcileScheduler, ReconcileTrigger};

use std::sync::Arc;
use std::time::Duration;

use sqlx::SqlitePool;
use thiserror::Error;
use tracing::{debug, error, warn};

use crate::buffer::{BufferError, CounterBuffer};
use crate::db::increment_counter;
use crate::domain::{ContentKey, ContentType, CounterField};
use crate::error::RepositoryError;

/// Lock name shared by every reconciler instance.
pub const FLUSH_LOCK: &str = "lock:flush_counts";

pub const DEFAULT_LOCK_TTL: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("counter buffer error: {0}")]
    Buffer(#[from] BufferError),

    #[error("failed to apply {field} delta {delta} to {key}: {source}")]
    Store {
        key: ContentKey,
        field: CounterField,
        delta: i64,
        #[source]
        source: RepositoryError,
    },

    /// The delta reached the database but could not be taken out of the buffer.
    #[error("applied {field} delta {delta} to {key} but failed to settle the buffer: {source}")]
    Settle {
        key: ContentKey,
        field: CounterField,
        delta: i64,
        #[source]
        source: BufferError,
    },
}

/// What one run did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushReport {
    pub keys_scanned: usize,
    pub fields_applied: usize,
    /// Deltas whose target row no longer exists.
    pub rows_missing: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
    /// Another instance holds the flush lock.
    Skipped,
    Flushed(FlushReport),
}

#[derive(Clone)]
pub struct Reconciler {
    pool: SqlitePool,
    buffer: Arc<dyn CounterBuffer>,
    lock_ttl: Duration,
}

impl Reconciler {
    #[must_use]
    pub fn new(pool: SqlitePool, buffer: Arc<dyn CounterBuffer>, lock_ttl: Duration) -> Self {
        Self {
            pool,
            buffer,
            lock_ttl,
        }
    }

    /// Flush every pending delta once.
    ///
    /// # Errors
    ///
    /// Returns an error if the buffer is unreachable or a store update fails.
    /// Deltas applied before the failure stay applied and settled; the rest
    /// remain buffered for the next run.
    pub async fn run_once(&self) -> Result<FlushOutcome, ReconcileError> {
        let Some(token) = self.buffer.try_lock(FLUSH_LOCK, self.lock_ttl).await? else {
            debug!("Flush lock held elsewhere, skipping run");
            return Ok(FlushOutcome::Skipped);
        };

        let result = self.flush().await;

        match self.buffer.unlock(FLUSH_LOCK, &token).await {
            Ok(true) => {}
            Ok(false) => warn!(
                ttl_secs = self.lock_ttl.as_secs(),
                "Flush lock expired before the run finished"
            ),
            Err(e) => warn!("Failed to release flush lock, it will expire on its own: {e}"),
        }

        result.map(FlushOutcome::Flushed)
    }

    async fn flush(&self) -> Result<FlushReport, ReconcileError> {
        let mut report = FlushReport::default();

        for content_type in ContentType::ALL {
            let keys = self.buffer.scan(&ContentKey::pattern(content_type)).await?;

            for raw_key in keys {
                debug!(key = %raw_key, "Flush sees key");
                let key = match ContentKey::parse(&raw_key) {
                    Ok(key) => key,
                    Err(e) => {
                        warn!(key = %raw_key, "Skipping unrecognised buffer key: {e}");
                        continue;
                    }
                };
                report.keys_scanned += 1;

                for field in CounterField::BUFFERED {
                    self.flush_field(&raw_key, key, field, &mut report).await?;
                }
            }
        }

        Ok(report)
    }

    async fn flush_field(
        &self,
        raw_key: &str,
        key: ContentKey,
        field: CounterField,
        report: &mut FlushReport,
    ) -> Result<(), ReconcileError> {
        let delta = self.buffer.get(raw_key, field.column()).await?;
        if delta == 0 {
            // Drop a field that netted out to zero, unless something just landed in it
            self.buffer.settle(raw_key, field.column(), 0).await?;
            return Ok(());
        }

        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| ReconcileError::Store {
                key,
                field,
                delta,
                source: RepositoryError::failed("failed to acquire connection")(e),
            })?;

        let rows = increment_counter(&mut *conn, key.content_type, key.id, field, delta)
            .await
            .map_err(|source| ReconcileError::Store {
                key,
                field,
                delta,
                source,
            })?;
        drop(conn);

        if rows == 0 {
            report.rows_missing += 1;
            debug!(key = %key, %field, delta, "Target row gone, discarding delta");
        }

        if let Err(source) = self.buffer.settle(raw_key, field.column(), delta).await {
            // The next run would apply this delta a second time
            error!(key = %key, %field, delta, "Delta applied but not settled: {source}");
            return Err(ReconcileError::Settle {
                key,
                field,
                delta,
                source,
            });
        }

        report.fields_applied += 1;
        debug!(key = %key, %field, delta, "Flushed counter delta");
        Ok(())
    }
}
