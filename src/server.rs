use anyhow::{Context, Result};
use axum::{extract::DefaultBodyLimit, routing::get, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use std::{net::SocketAddr, path::Path, sync::Arc};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::{
    config::Config,
    handlers, metrics,
    reqtrail::Reqtrail,
    signals::setup_signal_handlers,
    storage::{self, TracedPool},
};

/// Paths served by the sample host that are never captured
const SAMPLE_EXCLUDED_PATHS: &[&str] = &["/metrics"];

/// Start the sample host server with request capture installed
///
/// This function:
/// 1. Initializes metrics
/// 2. Opens the request log database and builds the capture layer
/// 3. Sets up signal handlers for graceful shutdown
/// 4. Serves the sample routes until a shutdown signal arrives
pub async fn start_server(config: Config) -> Result<()> {
    info!("Initializing Prometheus metrics...");
    let metrics_handle = Arc::new(metrics::init_metrics()?);

    let pool = open_database(&config).await?;

    let mut capture = config.capture.clone();
    for path in SAMPLE_EXCLUDED_PATHS {
        if !capture.exclude_paths.iter().any(|p| p == path) {
            capture.exclude_paths.push(path.to_string());
        }
    }

    let trail = Reqtrail::new(pool, &capture, &config.storage).await?;
    let db = trail.traced_pool();
    handlers::users::init_schema(&db).await?;

    let (shutdown_tx, signal_handle) = setup_signal_handlers();
    let mut shutdown_rx = shutdown_tx.subscribe();

    let app = create_router(&trail, db, metrics_handle);

    let addr = SocketAddr::from((
        config.server.host.parse::<std::net::IpAddr>()?,
        config.server.port,
    ));

    info!("Starting reqtrail sample server on {}", addr);
    info!(
        "Admin API at {}, capture {}",
        trail.api_path(),
        if trail.filter().is_enabled() { "enabled" } else { "disabled" }
    );

    let listener = tokio::net::TcpListener::bind(addr).await?;

    // ConnectInfo lets the middleware record the peer address.
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        let _ = shutdown_rx.recv().await;
        info!("Shutdown signal received, draining connections...");
    })
    .await?;

    signal_handle.await?;
    info!("Server stopped gracefully");

    Ok(())
}

/// Open the request log database, creating its parent directory if needed
pub async fn open_database(config: &Config) -> Result<sqlx::SqlitePool> {
    let path = &config.storage.database_path;

    if !path.starts_with("sqlite:") {
        if let Some(parent) = Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create database directory {}", parent.display())
                })?;
            }
        }
    }

    storage::connect(
        &storage::database_url(path),
        config.storage.max_connections,
    )
    .await
}

/// Sample routes, `/health`, `/metrics`, and the capture layer on top
fn create_router(
    trail: &Reqtrail,
    db: TracedPool,
    metrics_handle: Arc<PrometheusHandle>,
) -> Router {
    let app = Router::new()
        .route("/health", get(handlers::health::health_check))
        .route("/metrics", get(handlers::metrics_handler::metrics))
        .with_state(metrics_handle)
        .merge(handlers::users::routes(db));

    trail
        .attach(app)
        .layer(DefaultBodyLimit::max(10 * 1024 * 1024))
        .layer(TraceLayer::new_for_http())
}
