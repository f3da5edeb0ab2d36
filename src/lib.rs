//! Request/response capture for axum services with per-request SQL query
//! correlation.
//!
//! Install with [`Reqtrail::attach`]; run host queries through the
//! [`storage::TracedPool`] returned by [`Reqtrail::traced_pool`].

pub mod capture;
pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod reqtrail;
pub mod server;
pub mod signals;
pub mod storage;
pub mod tracer;

pub use reqtrail::Reqtrail;

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initialize tracing/logging
///
/// `RUST_LOG` overrides `level`. `format` is `text` or `json`.
/// This function can only be called once.
pub fn init_tracing(level: &str, format: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let registry = tracing_subscriber::registry().with(filter);

    if format == "json" {
        registry
            .with(fmt::layer().json().with_target(true))
            .init();
    } else {
        registry.with(fmt::layer().with_target(true)).init();
    }
}
