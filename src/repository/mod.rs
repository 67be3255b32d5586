//! Repositories for users, content, likes, and follows.
//!
//! Every write runs in one [`WriteTx`] so that counter adjustments commit or
//! roll back together with the row change that caused them.

mod comments;
mod follows;
mod likes;
mod posts;
mod users;

use sqlx::SqlitePool;

use crate::error::RepositoryError;
use crate::tx::{CounterContext, WriteTx};

#[derive(Clone)]
pub struct Repository {
    pool: SqlitePool,
    counters: CounterContext,
}

impl Repository {
    #[must_use]
    pub fn new(pool: SqlitePool, counters: CounterContext) -> Self {
        Self { pool, counters }
    }

    #[must_use]
    pub const fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn begin(&self) -> Result<WriteTx<'_>, RepositoryError> {
        WriteTx::begin(&self.pool, &self.counters).await
    }
}
