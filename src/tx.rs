//! Write transactions that route counter changes to their assigned path.

use std::sync::Arc;

use sqlx::{Sqlite, SqliteConnection, SqlitePool, Transaction};
use tracing::{debug, error};

use crate::buffer::CounterBuffer;
use crate::db::{adjust_comments_count, adjust_reposts_count};
use crate::error::RepositoryError;
use crate::hooks::{CounterHooks, LifecycleEvent};
use crate::policy::{CounterPath, CounterPolicy};
use crate::reconcile::ReconcileScheduler;

/// Everything a write needs to keep counters consistent.
#[derive(Clone)]
pub struct CounterContext {
    policy: CounterPolicy,
    hooks: CounterHooks,
    scheduler: ReconcileScheduler,
}

impl CounterContext {
    #[must_use]
    pub fn new(
        policy: CounterPolicy,
        buffer: Arc<dyn CounterBuffer>,
        scheduler: ReconcileScheduler,
    ) -> Self {
        Self {
            policy,
            hooks: CounterHooks::new(buffer),
            scheduler,
        }
    }
}

/// A database transaction plus the counter events it produced.
///
/// Direct-path events are applied on the open transaction as they are
/// emitted. Buffered-path events are held until [`WriteTx::commit`] and
/// dropped with the transaction if it never commits.
pub struct WriteTx<'a> {
    tx: Transaction<'static, Sqlite>,
    ctx: &'a CounterContext,
    pending: Vec<LifecycleEvent>,
    flush_scheduled: bool,
}

impl<'a> WriteTx<'a> {
    /// Open a transaction.
    ///
    /// # Errors
    ///
    /// Returns `EntityOperationFailed` if the transaction cannot be started.
    pub async fn begin(pool: &SqlitePool, ctx: &'a CounterContext) -> Result<Self, RepositoryError> {
        let tx = pool
            .begin()
            .await
            .map_err(RepositoryError::failed("failed to begin transaction"))?;

        Ok(Self {
            tx,
            ctx,
            pending: Vec::new(),
            flush_scheduled: false,
        })
    }

    /// The underlying connection for row queries.
    pub fn conn(&mut self) -> &mut SqliteConnection {
        &mut self.tx
    }

    /// Record a counter-moving event.
    ///
    /// # Errors
    ///
    /// Propagates direct adjustment failures; the caller must abandon the
    /// transaction.
    pub async fn emit(&mut self, event: LifecycleEvent) -> Result<(), RepositoryError> {
        match self.ctx.policy.path_for(event.field()) {
            CounterPath::Direct => apply_direct(&mut self.tx, &event).await,
            CounterPath::Buffered => {
                self.pending.push(event);
                self.flush_scheduled = true;
                Ok(())
            }
        }
    }

    /// Commit, then push buffered events and request one reconciliation run.
    ///
    /// Buffer failures after the commit are logged; the committed write stands.
    ///
    /// # Errors
    ///
    /// Returns `EntityOperationFailed` if the commit fails, in which case no
    /// buffered event is applied.
    pub async fn commit(self) -> Result<(), RepositoryError> {
        self.tx
            .commit()
            .await
            .map_err(RepositoryError::failed("failed to commit transaction"))?;

        for event in &self.pending {
            if let Err(e) = self.ctx.hooks.apply(event).await {
                error!(?event, "Failed to buffer counter delta after commit: {e}");
            }
        }

        if self.flush_scheduled {
            debug!(events = self.pending.len(), "Requesting reconciliation after commit");
            self.ctx.scheduler.schedule();
        }

        Ok(())
    }

    /// Abandon the write. Queued events are discarded.
    ///
    /// # Errors
    ///
    /// Returns `EntityOperationFailed` if the rollback itself fails.
    pub async fn rollback(self) -> Result<(), RepositoryError> {
        if !self.pending.is_empty() {
            debug!(events = self.pending.len(), "Discarding buffered events on rollback");
        }
        self.tx
            .rollback()
            .await
            .map_err(RepositoryError::failed("failed to roll back transaction"))
    }

    #[must_use]
    pub fn pending_events(&self) -> &[LifecycleEvent] {
        &self.pending
    }
}

async fn apply_direct(
    conn: &mut SqliteConnection,
    event: &LifecycleEvent,
) -> Result<(), RepositoryError> {
    match *event {
        LifecycleEvent::CommentCreated {
            parent_post_id,
            parent_comment_id,
        }
        | LifecycleEvent::CommentDeleted {
            parent_post_id,
            parent_comment_id,
        } => adjust_comments_count(conn, parent_post_id, parent_comment_id, event.delta()).await,
        LifecycleEvent::RepostCreated { original } | LifecycleEvent::RepostDeleted { original } => {
            adjust_reposts_count(conn, original.id, original.content_type, event.delta()).await
        }
    }
}
