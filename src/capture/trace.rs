//! Request-scoped trace buffer
//!
//! A [`TraceContext`] is created by the capture middleware for every captured
//! request and bound to the handler future with a task-local scope. The query
//! tracer looks it up through [`TraceContext::current`]; there is no shared
//! registry, so one request can never see another request's buffer.

use super::model::CapturedQuery;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};

tokio::task_local! {
    static ACTIVE_TRACE: TraceContext;
}

/// Handle to the trace buffer of one in-flight request
///
/// Cloning the handle shares the same buffer. The middleware also stores a
/// clone in the request extensions so handlers can re-enter the scope from
/// tasks they spawn themselves.
#[derive(Clone, Debug, Default)]
pub struct TraceContext {
    queries: Arc<Mutex<Vec<CapturedQuery>>>,
}

impl TraceContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Trace context bound to the current task, if any
    pub fn current() -> Option<Self> {
        ACTIVE_TRACE.try_with(Clone::clone).ok()
    }

    /// Run `fut` with this context bound as the active trace.
    pub async fn scope<F>(&self, fut: F) -> F::Output
    where
        F: Future,
    {
        ACTIVE_TRACE.scope(self.clone(), fut).await
    }

    /// Append a query. Order of calls is preserved.
    pub fn record(&self, query: CapturedQuery) {
        self.lock().push(query);
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Drain the buffer, leaving it empty.
    pub fn take(&self) -> Vec<CapturedQuery> {
        std::mem::take(&mut *self.lock())
    }

    fn lock(&self) -> MutexGuard<'_, Vec<CapturedQuery>> {
        // A panic while holding the lock cannot leave the Vec half-written.
        self.queries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
