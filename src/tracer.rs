//! SQL query hooks
//!
//! [`TracedPool`](crate::storage::TracedPool) reports every statement it runs
//! to a [`QueryHook`]. The default hook is [`SlowQueryLogger`]; the capture
//! layer wraps it in a [`QueryTracer`], which forwards every event and also
//! appends it to the trace buffer of the request being handled.

use crate::capture::{CapturedQuery, TraceContext};
use std::time::{Duration, Instant};

/// Outcome of one statement execution
#[derive(Debug)]
pub struct QueryEvent<'a> {
    pub statement: &'a str,
    pub started_at: Instant,
    pub elapsed: Duration,
    /// Rows affected by a write, or rows returned by a read
    pub rows_affected: u64,
    pub error: Option<&'a sqlx::Error>,
}

impl QueryEvent<'_> {
    pub fn to_captured(&self) -> CapturedQuery {
        CapturedQuery::new(
            self.statement,
            self.elapsed,
            self.rows_affected,
            self.error.map(ToString::to_string),
        )
    }
}

/// Diagnostic hook invoked after every query
pub trait QueryHook: Send + Sync {
    fn trace(&self, event: &QueryEvent<'_>);
}

/// Base hook: logs failed and slow statements, everything else at debug
#[derive(Debug, Clone)]
pub struct SlowQueryLogger {
    slow_threshold: Duration,
}

impl SlowQueryLogger {
    pub fn new(slow_threshold: Duration) -> Self {
        Self { slow_threshold }
    }
}

impl Default for SlowQueryLogger {
    fn default() -> Self {
        Self::new(Duration::from_secs(1))
    }
}

impl QueryHook for SlowQueryLogger {
    fn trace(&self, event: &QueryEvent<'_>) {
        let elapsed_ms = event.elapsed.as_secs_f64() * 1000.0;

        match event.error {
            // Lookups that find nothing are not failures.
            Some(sqlx::Error::RowNotFound) | None => {}
            Some(error) => {
                tracing::error!(
                    target: "reqtrail::sql",
                    error = %error,
                    elapsed_ms,
                    rows = event.rows_affected,
                    sql = event.statement,
                    "Query failed"
                );
                return;
            }
        }

        if event.elapsed >= self.slow_threshold {
            tracing::warn!(
                target: "reqtrail::sql",
                elapsed_ms,
                threshold_ms = self.slow_threshold.as_millis() as u64,
                rows = event.rows_affected,
                sql = event.statement,
                "Slow query"
            );
        } else {
            tracing::debug!(
                target: "reqtrail::sql",
                elapsed_ms,
                rows = event.rows_affected,
                sql = event.statement,
                "Query executed"
            );
        }
    }
}

/// Capturing decorator around another hook
///
/// Always forwards to the wrapped hook first. If the calling task runs inside
/// a captured request, the event is then appended to that request's trace
/// buffer; otherwise nothing else happens.
#[derive(Debug, Clone)]
pub struct QueryTracer<H> {
    inner: H,
}

impl<H: QueryHook> QueryTracer<H> {
    pub fn new(inner: H) -> Self {
        Self { inner }
    }

    pub fn inner(&self) -> &H {
        &self.inner
    }
}

impl<H: QueryHook> QueryHook for QueryTracer<H> {
    fn trace(&self, event: &QueryEvent<'_>) {
        self.inner.trace(event);

        if let Some(ctx) = TraceContext::current() {
            ctx.record(event.to_captured());
            crate::metrics::record_captured_query();
        }
    }
}
