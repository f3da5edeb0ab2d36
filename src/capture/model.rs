//! Captured request records
//!
//! Entries are built once by the capture middleware and never mutated after
//! they are handed to the writer.

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use uuid::Uuid;

/// Header snapshot: header name to its first value
pub type HeaderMap = BTreeMap<String, String>;

/// One SQL statement observed while a request was being handled
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapturedQuery {
    #[serde(rename = "sql")]
    pub statement: String,
    /// Execution time in microseconds
    pub elapsed_us: u64,
    pub rows_affected: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CapturedQuery {
    pub fn new(
        statement: impl Into<String>,
        elapsed: Duration,
        rows_affected: u64,
        error: Option<String>,
    ) -> Self {
        Self {
            statement: statement.into(),
            elapsed_us: elapsed.as_micros() as u64,
            rows_affected,
            error,
        }
    }

    pub fn elapsed(&self) -> Duration {
        Duration::from_micros(self.elapsed_us)
    }
}

/// Query payload attached to an entry, stored as `{"queries": [...]}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryTrace {
    pub queries: Vec<CapturedQuery>,
}

impl QueryTrace {
    /// Wrap the drained trace buffer; an empty buffer yields no payload.
    pub fn from_queries(queries: Vec<CapturedQuery>) -> Option<Self> {
        if queries.is_empty() {
            None
        } else {
            Some(Self { queries })
        }
    }

    pub fn len(&self) -> usize {
        self.queries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queries.is_empty()
    }
}

/// One persisted request/response cycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestLogEntry {
    pub id: Uuid,
    pub method: String,
    /// Path and query string as received
    pub url: String,
    pub headers: HeaderMap,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    pub status_code: u16,
    pub response_headers: HeaderMap,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_body: Option<String>,
    /// Handler chain duration in microseconds
    #[serde(rename = "duration")]
    pub duration_us: u64,
    pub ip: String,
    pub user_agent: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sql_queries: Option<QueryTrace>,
    pub created_at: DateTime<Utc>,
}

impl RequestLogEntry {
    /// Start a new entry with a fresh identifier and creation timestamp.
    pub fn builder(method: impl Into<String>, url: impl Into<String>) -> RequestLogEntryBuilder {
        RequestLogEntryBuilder::new(method.into(), url.into())
    }

    pub fn duration(&self) -> Duration {
        Duration::from_micros(self.duration_us)
    }

    pub fn query_count(&self) -> usize {
        self.sql_queries.as_ref().map_or(0, QueryTrace::len)
    }

    pub fn summary(&self) -> RequestLogSummary {
        RequestLogSummary {
            id: self.id,
            method: self.method.clone(),
            url: self.url.clone(),
            status_code: self.status_code,
            duration_us: self.duration_us,
            created_at: self.created_at,
        }
    }
}

/// Listing projection: never carries headers, bodies or queries
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestLogSummary {
    pub id: Uuid,
    pub method: String,
    pub url: String,
    pub status_code: u16,
    #[serde(rename = "duration")]
    pub duration_us: u64,
    pub created_at: DateTime<Utc>,
}

/// Builder used by the middleware to assemble an entry in two phases
/// (request snapshot before the handler, response snapshot after).
#[derive(Debug, Clone)]
pub struct RequestLogEntryBuilder {
    entry: RequestLogEntry,
}

impl RequestLogEntryBuilder {
    fn new(method: String, url: String) -> Self {
        Self {
            entry: RequestLogEntry {
                id: Uuid::new_v4(),
                method,
                url,
                headers: HeaderMap::new(),
                body: None,
                status_code: 0,
                response_headers: HeaderMap::new(),
                response_body: None,
                duration_us: 0,
                ip: String::new(),
                user_agent: String::new(),
                sql_queries: None,
                created_at: Utc::now(),
            },
        }
    }

    pub fn headers(mut self, headers: HeaderMap) -> Self {
        self.entry.headers = headers;
        self
    }

    /// Empty bodies are recorded as absent.
    pub fn body(mut self, body: Option<String>) -> Self {
        self.entry.body = body.filter(|b| !b.is_empty());
        self
    }

    pub fn client(mut self, ip: impl Into<String>, user_agent: impl Into<String>) -> Self {
        self.entry.ip = ip.into();
        self.entry.user_agent = user_agent.into();
        self
    }

    pub fn status(mut self, status_code: u16) -> Self {
        self.entry.status_code = status_code;
        self
    }

    pub fn response_headers(mut self, headers: HeaderMap) -> Self {
        self.entry.response_headers = headers;
        self
    }

    pub fn response_body(mut self, body: Option<String>) -> Self {
        self.entry.response_body = body.filter(|b| !b.is_empty());
        self
    }

    pub fn duration(mut self, duration: Duration) -> Self {
        self.entry.duration_us = duration.as_micros() as u64;
        self
    }

    pub fn queries(mut self, queries: Vec<CapturedQuery>) -> Self {
        self.entry.sql_queries = QueryTrace::from_queries(queries);
        self
    }

    /// Finish the entry. The creation timestamp is truncated to microseconds,
    /// the resolution it is stored with.
    pub fn build(mut self) -> RequestLogEntry {
        self.entry.created_at = Utc::now().trunc_subsecs(6);
        self.entry
    }
}
