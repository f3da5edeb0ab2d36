//! Query execution wrapper
//!
//! Host code and the request log store run their statements through
//! [`TracedPool`], which times each one and reports it to the configured
//! [`QueryHook`].

use crate::tracer::{QueryEvent, QueryHook, QueryTracer, SlowQueryLogger};
use sqlx::query::Query;
use sqlx::sqlite::{Sqlite, SqliteArguments, SqlitePool, SqliteQueryResult, SqliteRow};
use sqlx::Execute;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

type SqliteQuery<'q> = Query<'q, Sqlite, SqliteArguments<'q>>;

/// SQLite pool whose queries are reported to a [`QueryHook`]
#[derive(Clone)]
pub struct TracedPool {
    pool: SqlitePool,
    hook: Arc<dyn QueryHook>,
}

impl TracedPool {
    pub fn new(pool: SqlitePool, hook: Arc<dyn QueryHook>) -> Self {
        Self { pool, hook }
    }

    /// Pool with the capturing tracer around a slow-query logger.
    pub fn capturing(pool: SqlitePool, slow_threshold: Duration) -> Self {
        Self::new(
            pool,
            Arc::new(QueryTracer::new(SlowQueryLogger::new(slow_threshold))),
        )
    }

    /// Underlying pool, for statements that should not be traced
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn execute<'q>(&self, query: SqliteQuery<'q>) -> Result<SqliteQueryResult, sqlx::Error> {
        let statement = query.sql();
        self.observe(statement, query.execute(&self.pool), |result| {
            result.rows_affected()
        })
        .await
    }

    pub async fn fetch_all<'q>(&self, query: SqliteQuery<'q>) -> Result<Vec<SqliteRow>, sqlx::Error> {
        let statement = query.sql();
        self.observe(statement, query.fetch_all(&self.pool), |rows| rows.len() as u64)
            .await
    }

    pub async fn fetch_optional<'q>(
        &self,
        query: SqliteQuery<'q>,
    ) -> Result<Option<SqliteRow>, sqlx::Error> {
        let statement = query.sql();
        self.observe(statement, query.fetch_optional(&self.pool), |row| {
            u64::from(row.is_some())
        })
        .await
    }

    pub async fn fetch_one<'q>(&self, query: SqliteQuery<'q>) -> Result<SqliteRow, sqlx::Error> {
        let statement = query.sql();
        self.observe(statement, query.fetch_one(&self.pool), |_| 1).await
    }

    async fn observe<T, F>(
        &self,
        statement: &str,
        fut: F,
        rows: impl FnOnce(&T) -> u64,
    ) -> Result<T, sqlx::Error>
    where
        F: Future<Output = Result<T, sqlx::Error>>,
    {
        let started_at = Instant::now();
        let result = fut.await;
        let elapsed = started_at.elapsed();

        let (rows_affected, error) = match &result {
            Ok(value) => (rows(value), None),
            Err(e) => (0, Some(e)),
        };

        self.hook.trace(&QueryEvent {
            statement,
            started_at,
            elapsed,
            rows_affected,
            error,
        });

        result
    }
}

impl std::fmt::Debug for TracedPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TracedPool").field("pool", &self.pool).finish_non_exhaustive()
    }
}
