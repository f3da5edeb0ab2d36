//! Request capture pipeline
//!
//! ## Architecture
//!
//! ```text
//! request ─▶ PathFilter ─▶ capture_middleware ─┬─▶ handler chain
//!                                              │      └─ TracedPool ─▶ QueryTracer ─▶ TraceContext
//!                                              └─▶ RequestLogEntry ─▶ AsyncWriter (spawned)
//! ```
//!
//! The middleware never changes the response the handler chain produced and
//! never waits for the entry to be written.

pub mod filter;
pub mod middleware;
pub mod model;
pub mod trace;

pub use filter::{PathFilter, DEFAULT_EXCLUDED_PATHS};
pub use middleware::{capture_middleware, Collector};
pub use model::{
    CapturedQuery, HeaderMap, QueryTrace, RequestLogEntry, RequestLogEntryBuilder,
    RequestLogSummary,
};
pub use trace::TraceContext;
