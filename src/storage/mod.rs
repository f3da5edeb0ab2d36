//! Storage for captured requests
//!
//! ```text
//! capture middleware ──dispatch──▶ AsyncWriter ──spawn──▶ RequestLogStore
//!                                                             │
//!                                     admin API / CLI ◀───────┤
//!                                                             ▼
//!                                  TracedPool (QueryHook) ─▶ SQLite
//! ```

pub mod database;
pub mod store;
pub mod traced;
pub mod writer;

pub use database::{connect, database_url, run_migrations};
pub use store::{LogPage, RequestLogStore};
pub use traced::TracedPool;
pub use writer::AsyncWriter;
