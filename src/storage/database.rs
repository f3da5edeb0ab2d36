//! SQLite connection setup
//!
//! - Connection pooling
//! - Automatic migrations
//! - WAL mode for concurrent reads/writes

use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use std::time::Duration;

/// Open a pool for `database_url` (e.g. `sqlite:./data/reqtrail.db`).
///
/// In-memory databases live and die with their connection, so they are
/// pinned to a single connection that is never recycled.
pub async fn connect(database_url: &str, max_connections: u32) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(database_url)
        .with_context(|| format!("Invalid database URL: {}", database_url))?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal) // Write-Ahead Logging for concurrency
        .busy_timeout(Duration::from_secs(30)) // Wait up to 30s for locks
        .pragma("cache_size", "-64000") // 64MB cache
        .pragma("temp_store", "memory")
        .pragma("synchronous", "NORMAL");

    let in_memory = is_in_memory(database_url);

    let mut pool_options = SqlitePoolOptions::new().acquire_timeout(Duration::from_secs(30));
    pool_options = if in_memory {
        pool_options
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
    } else {
        pool_options.max_connections(max_connections.max(1))
    };

    let pool = pool_options
        .connect_with(options)
        .await
        .context("Failed to connect to request log database")?;

    tracing::debug!(database_url, in_memory, "Request log database connected");
    Ok(pool)
}

/// Run the request log migrations on `pool`.
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("Failed to run request log database migrations")?;

    tracing::info!("Request log database migrations completed");
    Ok(())
}

/// Build a SQLite URL from a file path, passing URLs through untouched.
pub fn database_url(path: &str) -> String {
    if path.starts_with("sqlite:") {
        path.to_string()
    } else {
        format!("sqlite:{}", path)
    }
}

fn is_in_memory(database_url: &str) -> bool {
    database_url.contains(":memory:") || database_url.contains("mode=memory")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_connect_and_migrate_in_memory() {
        let pool = connect("sqlite::memory:", 5).await.unwrap();
        run_migrations(&pool).await.unwrap();

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM request_logs")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn test_migrations_are_idempotent() {
        let pool = connect("sqlite::memory:", 1).await.unwrap();
        run_migrations(&pool).await.unwrap();
        run_migrations(&pool).await.unwrap();
    }

    #[test]
    fn test_database_url() {
        assert_eq!(database_url("./data/x.db"), "sqlite:./data/x.db");
        assert_eq!(database_url("sqlite::memory:"), "sqlite::memory:");
    }

    #[test]
    fn test_is_in_memory() {
        assert!(is_in_memory("sqlite::memory:"));
        assert!(is_in_memory("sqlite:file:test?mode=memory&cache=shared"));
        assert!(!is_in_memory("sqlite:./data/reqtrail.db"));
    }
}
