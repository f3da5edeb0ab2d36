//! Request log persistence
//!
//! One table, `request_logs`. Header maps and the query trace are stored as
//! JSON text; `created_at` is stored as Unix microseconds.

use super::traced::TracedPool;
use crate::capture::{HeaderMap, QueryTrace, RequestLogEntry, RequestLogSummary};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use uuid::Uuid;

/// A page of summaries plus the total number of stored entries
#[derive(Debug, Clone, Serialize)]
pub struct LogPage {
    pub entries: Vec<RequestLogSummary>,
    pub total: u64,
}

/// Request log store handle
#[derive(Debug, Clone)]
pub struct RequestLogStore {
    db: TracedPool,
}

impl RequestLogStore {
    pub fn new(db: TracedPool) -> Self {
        Self { db }
    }

    /// Persist one entry.
    pub async fn create(&self, entry: &RequestLogEntry) -> Result<()> {
        let headers = serde_json::to_string(&entry.headers)?;
        let response_headers = serde_json::to_string(&entry.response_headers)?;
        let sql_queries = entry
            .sql_queries
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        self.db
            .execute(
                sqlx::query(
                    "INSERT INTO request_logs
                        (id, method, url, headers, body, status_code, response_headers,
                         response_body, duration_us, ip, user_agent, sql_queries, created_at)
                     VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                )
                .bind(entry.id.to_string())
                .bind(&entry.method)
                .bind(&entry.url)
                .bind(headers)
                .bind(&entry.body)
                .bind(i64::from(entry.status_code))
                .bind(response_headers)
                .bind(&entry.response_body)
                .bind(entry.duration_us as i64)
                .bind(&entry.ip)
                .bind(&entry.user_agent)
                .bind(sql_queries)
                .bind(entry.created_at.timestamp_micros()),
            )
            .await
            .with_context(|| format!("Failed to insert request log {}", entry.id))?;

        Ok(())
    }

    /// Newest-first page of summaries. `page` is 1-based; both arguments are
    /// expected to be positive.
    pub async fn list(&self, page: u32, limit: u32) -> Result<LogPage> {
        let total = self.count().await?;
        let offset = i64::from(page.saturating_sub(1)) * i64::from(limit);

        let rows = self
            .db
            .fetch_all(
                sqlx::query(
                    "SELECT id, method, url, status_code, duration_us, created_at
                     FROM request_logs
                     ORDER BY created_at DESC, rowid DESC
                     LIMIT ? OFFSET ?",
                )
                .bind(i64::from(limit))
                .bind(offset),
            )
            .await
            .context("Failed to list request logs")?;

        let entries = rows
            .iter()
            .map(summary_from_row)
            .collect::<Result<Vec<_>>>()?;

        Ok(LogPage { entries, total })
    }

    /// Full entry for `id`, or `None`.
    pub async fn get_by_id(&self, id: Uuid) -> Result<Option<RequestLogEntry>> {
        let row = self
            .db
            .fetch_optional(
                sqlx::query(
                    "SELECT id, method, url, headers, body, status_code, response_headers,
                            response_body, duration_us, ip, user_agent, sql_queries, created_at
                     FROM request_logs
                     WHERE id = ?",
                )
                .bind(id.to_string()),
            )
            .await
            .with_context(|| format!("Failed to fetch request log {}", id))?;

        row.as_ref().map(entry_from_row).transpose()
    }

    /// Delete every entry. Returns the number of rows removed.
    pub async fn clear_all(&self) -> Result<u64> {
        let result = self
            .db
            .execute(sqlx::query("DELETE FROM request_logs"))
            .await
            .context("Failed to clear request logs")?;

        tracing::info!(deleted = result.rows_affected(), "Request logs cleared");
        Ok(result.rows_affected())
    }

    pub async fn count(&self) -> Result<u64> {
        let row = self
            .db
            .fetch_one(sqlx::query("SELECT COUNT(*) AS total FROM request_logs"))
            .await
            .context("Failed to count request logs")?;

        Ok(row.get::<i64, _>("total") as u64)
    }
}

fn summary_from_row(row: &SqliteRow) -> Result<RequestLogSummary> {
    Ok(RequestLogSummary {
        id: parse_id(row)?,
        method: row.get("method"),
        url: row.get("url"),
        status_code: row.get::<i64, _>("status_code") as u16,
        duration_us: row.get::<i64, _>("duration_us").max(0) as u64,
        created_at: parse_timestamp(row)?,
    })
}

fn entry_from_row(row: &SqliteRow) -> Result<RequestLogEntry> {
    let headers: String = row.get("headers");
    let response_headers: String = row.get("response_headers");
    let sql_queries: Option<String> = row.get("sql_queries");

    Ok(RequestLogEntry {
        id: parse_id(row)?,
        method: row.get("method"),
        url: row.get("url"),
        headers: serde_json::from_str::<HeaderMap>(&headers)
            .context("Corrupt request headers column")?,
        body: row.get("body"),
        status_code: row.get::<i64, _>("status_code") as u16,
        response_headers: serde_json::from_str::<HeaderMap>(&response_headers)
            .context("Corrupt response headers column")?,
        response_body: row.get("response_body"),
        duration_us: row.get::<i64, _>("duration_us").max(0) as u64,
        ip: row.get("ip"),
        user_agent: row.get("user_agent"),
        sql_queries: sql_queries
            .map(|raw| serde_json::from_str::<QueryTrace>(&raw))
            .transpose()
            .context("Corrupt sql_queries column")?,
        created_at: parse_timestamp(row)?,
    })
}

fn parse_id(row: &SqliteRow) -> Result<Uuid> {
    let raw: String = row.get("id");
    Uuid::parse_str(&raw).with_context(|| format!("Corrupt request log id: {}", raw))
}

fn parse_timestamp(row: &SqliteRow) -> Result<DateTime<Utc>> {
    let micros: i64 = row.get("created_at");
    DateTime::from_timestamp_micros(micros)
        .with_context(|| format!("Corrupt created_at value: {}", micros))
}
