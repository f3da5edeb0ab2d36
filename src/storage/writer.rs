//! Fire-and-forget entry writer
//!
//! Every captured request spawns one write task. The request path never
//! waits on it: the task acquires a permit (bounding concurrent database
//! writes), persists the entry and reports failures through tracing and
//! metrics only.

use super::store::RequestLogStore;
use crate::capture::RequestLogEntry;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;

/// Async writer handle
#[derive(Clone, Debug)]
pub struct AsyncWriter {
    store: Arc<RequestLogStore>,
    permits: Arc<Semaphore>,
    max_concurrent_writes: usize,
}

impl AsyncWriter {
    /// `max_concurrent_writes` caps how many spawned writes may hold a
    /// database connection at once; further writes queue on the semaphore.
    pub fn new(store: Arc<RequestLogStore>, max_concurrent_writes: usize) -> Self {
        let max_concurrent_writes = max_concurrent_writes.max(1);
        Self {
            store,
            permits: Arc::new(Semaphore::new(max_concurrent_writes)),
            max_concurrent_writes,
        }
    }

    /// Hand `entry` to a background task and return immediately.
    pub fn dispatch(&self, entry: RequestLogEntry) {
        let store = self.store.clone();
        let permits = self.permits.clone();

        tokio::spawn(async move {
            let Ok(_permit) = permits.acquire_owned().await else {
                tracing::warn!(id = %entry.id, "Writer closed, dropping request log");
                return;
            };
            write_entry(&store, &entry).await;
        });
    }

    /// Writes currently holding a permit
    pub fn in_flight(&self) -> usize {
        self.max_concurrent_writes
            .saturating_sub(self.permits.available_permits())
    }
}

async fn write_entry(store: &RequestLogStore, entry: &RequestLogEntry) {
    let start = Instant::now();

    match store.create(entry).await {
        Ok(()) => {
            let elapsed = start.elapsed();
            tracing::debug!(
                id = %entry.id,
                method = %entry.method,
                url = %entry.url,
                queries = entry.query_count(),
                duration_ms = elapsed.as_millis() as u64,
                "Request log persisted"
            );
            crate::metrics::record_store_write("ok", elapsed);
        }
        Err(e) => {
            tracing::error!(
                error = %e,
                id = %entry.id,
                url = %entry.url,
                "Failed to persist request log"
            );
            crate::metrics::record_store_write("error", start.elapsed());
        }
    }
}
