//! Capture middleware
//!
//! Installed as the outermost layer of the host router. For every request
//! that passes the [`PathFilter`] it:
//!
//! 1. binds a fresh [`TraceContext`] around the handler chain,
//! 2. snapshots the request before the chain runs,
//! 3. snapshots the response after the chain returns,
//! 4. hands the assembled [`RequestLogEntry`] to the [`AsyncWriter`]
//!    without waiting for it to be stored.
//!
//! Bodies are buffered so they can be recorded and then re-attached; the
//! handler chain and the client see the same bytes they would have without
//! the middleware. A body that turns out to be larger than the capture limit
//! is replayed as a stream and the request goes unrecorded.

use super::filter::PathFilter;
use super::model::{HeaderMap, RequestLogEntry};
use super::trace::TraceContext;
use crate::storage::AsyncWriter;
use axum::body::{Body, Bytes, HttpBody};
use axum::extract::{ConnectInfo, Request, State};
use axum::http::{header, HeaderMap as HttpHeaderMap, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use futures::stream::{self, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

/// Failures while snapshotting a request
#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("failed to read request body: {0}")]
    RequestBody(#[source] axum::Error),
}

impl IntoResponse for CaptureError {
    fn into_response(self) -> Response {
        match self {
            // The stream is partly consumed and cannot be handed on.
            Self::RequestBody(_) => (StatusCode::BAD_REQUEST, self.to_string()).into_response(),
        }
    }
}

/// Result of reading a body up to the capture limit
enum Buffered {
    /// The whole body, within the limit
    Complete(Bytes),
    /// The limit was crossed; replays the chunks read so far, then the rest
    Overflow(Body),
    /// The stream failed after `read` was received
    Failed { read: Vec<Bytes>, error: axum::Error },
}

impl Buffered {
    /// Body yielding the chunks that were read, then `error`.
    fn replay_failure(read: Vec<Bytes>, error: axum::Error) -> Body {
        let chunks = read.into_iter().map(Ok::<_, axum::Error>);
        Body::from_stream(stream::iter(chunks).chain(stream::once(async move { Err(error) })))
    }
}

/// Read `body` chunk by chunk, stopping as soon as more than `limit` bytes
/// have arrived.
async fn buffer_body(body: Body, limit: usize) -> Buffered {
    let mut data = body.into_data_stream();
    let mut read: Vec<Bytes> = Vec::new();
    let mut size = 0usize;

    while let Some(chunk) = data.next().await {
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(error) => return Buffered::Failed { read, error },
        };
        size += chunk.len();
        read.push(chunk);

        if size > limit {
            let replay = stream::iter(read.into_iter().map(Ok::<_, axum::Error>)).chain(data);
            return Buffered::Overflow(Body::from_stream(replay));
        }
    }

    if read.len() == 1 {
        return Buffered::Complete(read.remove(0));
    }
    let mut bytes = Vec::with_capacity(size);
    for chunk in &read {
        bytes.extend_from_slice(chunk);
    }
    Buffered::Complete(Bytes::from(bytes))
}

/// Middleware state shared by every request
#[derive(Clone, Debug)]
pub struct Collector {
    filter: Arc<PathFilter>,
    writer: AsyncWriter,
    max_body_bytes: usize,
}

impl Collector {
    pub fn new(filter: Arc<PathFilter>, writer: AsyncWriter, max_body_bytes: usize) -> Self {
        Self {
            filter,
            writer,
            max_body_bytes,
        }
    }

    pub fn filter(&self) -> &Arc<PathFilter> {
        &self.filter
    }

    pub fn writer(&self) -> &AsyncWriter {
        &self.writer
    }

    async fn capture(&self, req: Request, next: Next) -> Response {
        let start = Instant::now();
        let trace = TraceContext::new();

        let (mut parts, body) = req.into_parts();

        if body.size_hint().lower() > self.max_body_bytes as u64 {
            tracing::debug!(
                path = %parts.uri.path(),
                limit = self.max_body_bytes,
                "Request body over capture limit, not capturing"
            );
            return next.run(Request::from_parts(parts, body)).await;
        }

        let request_bytes = match buffer_body(body, self.max_body_bytes).await {
            Buffered::Complete(bytes) => bytes,
            Buffered::Overflow(body) => {
                tracing::debug!(
                    path = %parts.uri.path(),
                    limit = self.max_body_bytes,
                    "Streamed request body over capture limit, not capturing"
                );
                return next.run(Request::from_parts(parts, body)).await;
            }
            Buffered::Failed { error, .. } => {
                let error = CaptureError::RequestBody(error);
                tracing::warn!(error = %error, path = %parts.uri.path(), "Request capture failed");
                return error.into_response();
            }
        };

        let builder = RequestLogEntry::builder(parts.method.as_str(), request_url(&parts.uri))
            .headers(header_snapshot(&parts.headers))
            .body(body_text(&request_bytes))
            .client(client_ip(&parts), user_agent(&parts.headers));

        parts.extensions.insert(trace.clone());
        let req = Request::from_parts(parts, Body::from(request_bytes));

        let response = trace.scope(next.run(req)).await;
        let elapsed = start.elapsed();

        let (parts, body) = response.into_parts();
        let status = parts.status;
        let response_headers = header_snapshot(&parts.headers);

        let (response_body, body) = match body.size_hint().upper() {
            Some(size) if size <= self.max_body_bytes as u64 => {
                match buffer_body(body, self.max_body_bytes).await {
                    Buffered::Complete(bytes) => (body_text(&bytes), Body::from(bytes)),
                    Buffered::Overflow(body) => (None, body),
                    Buffered::Failed { read, error } => {
                        // Hand the client the same failure, unrecorded.
                        tracing::warn!(error = %error, "Response capture failed");
                        return Response::from_parts(parts, Buffered::replay_failure(read, error));
                    }
                }
            }
            // Streamed or oversized: leave the body alone.
            _ => (None, body),
        };

        let entry = builder
            .status(status.as_u16())
            .response_headers(response_headers)
            .response_body(response_body)
            .duration(elapsed)
            .queries(trace.take())
            .build();

        crate::metrics::record_capture(&entry.method, entry.status_code);
        tracing::trace!(
            id = %entry.id,
            method = %entry.method,
            url = %entry.url,
            status = entry.status_code,
            queries = entry.query_count(),
            "Request captured"
        );
        self.writer.dispatch(entry);

        Response::from_parts(parts, body)
    }
}

/// Capture middleware, installed with
/// `axum::middleware::from_fn_with_state(collector, capture_middleware)`.
pub async fn capture_middleware(
    State(collector): State<Collector>,
    req: Request,
    next: Next,
) -> Response {
    if !collector.filter.should_capture(req.uri().path()) {
        return next.run(req).await;
    }

    collector.capture(req, next).await
}

fn request_url(uri: &axum::http::Uri) -> String {
    uri.path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| uri.path().to_string())
}

/// First value of every header
fn header_snapshot(headers: &HttpHeaderMap) -> HeaderMap {
    headers
        .keys()
        .filter_map(|name| {
            headers.get(name).map(|value| {
                (
                    name.as_str().to_string(),
                    String::from_utf8_lossy(value.as_bytes()).into_owned(),
                )
            })
        })
        .collect()
}

fn body_text(bytes: &Bytes) -> Option<String> {
    if bytes.is_empty() {
        None
    } else {
        Some(String::from_utf8_lossy(bytes).into_owned())
    }
}

fn client_ip(parts: &axum::http::request::Parts) -> String {
    if let Some(ConnectInfo(addr)) = parts.extensions.get::<ConnectInfo<SocketAddr>>() {
        return addr.ip().to_string();
    }

    parts
        .headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|ip| ip.trim().to_string())
        .unwrap_or_default()
}

fn user_agent(headers: &HttpHeaderMap) -> String {
    headers
        .get(header::USER_AGENT)
        .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned())
        .unwrap_or_default()
}
