//! Host integration
//!
//! ```ignore
//! let trail = Reqtrail::new(pool, &cfg.capture, &cfg.storage).await?;
//! let db = trail.traced_pool(); // hand this to your handlers
//! let app = trail.attach(Router::new().route("/users/:id", get(get_user)).with_state(db));
//! ```

use crate::capture::{capture_middleware, Collector, PathFilter};
use crate::config::{CaptureConfig, StorageConfig};
use crate::handlers::capture_api::{self, CaptureApiState};
use crate::storage::{run_migrations, AsyncWriter, RequestLogStore, TracedPool};
use anyhow::Result;
use axum::Router;
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;

/// Capture layer bound to one database
#[derive(Clone, Debug)]
pub struct Reqtrail {
    base_path: String,
    db: TracedPool,
    store: Arc<RequestLogStore>,
    collector: Collector,
}

impl Reqtrail {
    /// Run the request log migrations on `pool` and build the store, filter
    /// and background writer.
    pub async fn new(
        pool: SqlitePool,
        capture: &CaptureConfig,
        storage: &StorageConfig,
    ) -> Result<Self> {
        run_migrations(&pool).await?;

        let db = TracedPool::capturing(
            pool,
            Duration::from_millis(storage.slow_query_threshold_ms),
        );
        let store = Arc::new(RequestLogStore::new(db.clone()));
        let filter = Arc::new(PathFilter::with_defaults(
            capture.enabled,
            &capture.base_path,
            &capture.exclude_paths,
        ));
        let writer = AsyncWriter::new(store.clone(), capture.max_concurrent_writes);
        let collector = Collector::new(filter, writer, capture.max_body_bytes);

        tracing::info!(
            base_path = %capture.base_path,
            enabled = capture.enabled,
            excludes = ?collector.filter().excludes(),
            "Request capture initialized"
        );

        Ok(Self {
            base_path: capture.base_path.clone(),
            db,
            store,
            collector,
        })
    }

    /// Mount the admin API under `{base_path}/api` and wrap the whole router
    /// in the capture middleware.
    pub fn attach<S>(&self, router: Router<S>) -> Router<S>
    where
        S: Clone + Send + Sync + 'static,
    {
        let api = capture_api::routes(CaptureApiState {
            store: self.store.clone(),
            collector: self.collector.clone(),
        });

        router
            .nest(&self.api_path(), api)
            .layer(axum::middleware::from_fn_with_state(
                self.collector.clone(),
                capture_middleware,
            ))
    }

    /// Pool whose queries are correlated with the request being captured
    pub fn traced_pool(&self) -> TracedPool {
        self.db.clone()
    }

    pub fn store(&self) -> &Arc<RequestLogStore> {
        &self.store
    }

    pub fn filter(&self) -> &Arc<PathFilter> {
        self.collector.filter()
    }

    pub fn collector(&self) -> &Collector {
        &self.collector
    }

    pub fn base_path(&self) -> &str {
        &self.base_path
    }

    pub fn api_path(&self) -> String {
        format!("{}/api", self.base_path)
    }
}
