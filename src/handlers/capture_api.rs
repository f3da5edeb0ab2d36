//! Request log admin API
//!
//! Mounted under `{base_path}/api`, which the path filter always excludes.

use crate::capture::{Collector, RequestLogEntry, RequestLogSummary};
use crate::error::AppError;
use crate::storage::RequestLogStore;
use axum::extract::{Path, Query, State};
use axum::response::Json;
use axum::routing::{get, post};
use axum::Router;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

pub const DEFAULT_PAGE: u32 = 1;
pub const DEFAULT_LIMIT: u32 = 20;
pub const MAX_LIMIT: u32 = 100;

/// Shared state for the admin API
#[derive(Clone)]
pub struct CaptureApiState {
    pub store: Arc<RequestLogStore>,
    pub collector: Collector,
}

pub fn routes<S>(state: CaptureApiState) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    Router::new()
        .route("/list", get(list_entries).delete(clear_entries))
        .route("/detail/:id", get(get_entry))
        .route("/toggle", post(toggle_capture))
        .route("/status", get(capture_status))
        .route(
            "/excludes",
            get(list_excludes)
                .post(add_exclude)
                .delete(remove_exclude)
                .put(replace_excludes),
        )
        .with_state(state)
}

/// Query parameters for the list endpoint. Kept as raw strings so that
/// unparsable values fall back to the defaults instead of rejecting.
#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    pub page: Option<String>,
    pub limit: Option<String>,
}

impl ListParams {
    /// `page < 1` becomes 1, `limit` outside `1..=100` becomes 20.
    pub fn resolve(&self) -> (u32, u32) {
        let page = parse_number(self.page.as_deref())
            .map(|page| page.clamp(1, i64::from(u32::MAX)) as u32)
            .unwrap_or(DEFAULT_PAGE);

        let limit = parse_number(self.limit.as_deref())
            .filter(|limit| (1..=i64::from(MAX_LIMIT)).contains(limit))
            .map(|limit| limit as u32)
            .unwrap_or(DEFAULT_LIMIT);

        (page, limit)
    }
}

fn parse_number(raw: Option<&str>) -> Option<i64> {
    raw.and_then(|value| value.trim().parse::<i64>().ok())
}

#[derive(Debug, Serialize)]
pub struct ListResponse {
    pub entries: Vec<RequestLogSummary>,
    pub total: u64,
    pub page: u32,
    pub limit: u32,
}

#[derive(Debug, Serialize)]
pub struct ClearResponse {
    pub message: String,
    pub deleted: u64,
}

#[derive(Debug, Serialize)]
pub struct ToggleResponse {
    pub enabled: bool,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub enabled: bool,
    pub exclude_paths: Vec<String>,
    /// Writes currently holding a database permit
    pub in_flight_writes: usize,
}

#[derive(Debug, Serialize)]
pub struct ExcludesResponse {
    pub exclude_paths: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub changed: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct ExcludeRequest {
    pub path: String,
}

#[derive(Debug, Deserialize)]
pub struct ReplaceExcludesRequest {
    pub paths: Vec<String>,
}

/// GET /list - Newest-first page of summaries
///
/// Example: GET /reqtrail/api/list?page=2&limit=50
pub async fn list_entries(
    State(state): State<CaptureApiState>,
    Query(params): Query<ListParams>,
) -> Result<Json<ListResponse>, AppError> {
    let (page, limit) = params.resolve();
    let result = state.store.list(page, limit).await?;

    Ok(Json(ListResponse {
        entries: result.entries,
        total: result.total,
        page,
        limit,
    }))
}

/// GET /detail/:id - Full entry
pub async fn get_entry(
    State(state): State<CaptureApiState>,
    Path(id): Path<String>,
) -> Result<Json<RequestLogEntry>, AppError> {
    // A malformed id cannot match any stored entry.
    let Ok(uuid) = Uuid::parse_str(&id) else {
        return Err(AppError::NotFound(format!("Request log {} not found", id)));
    };

    state
        .store
        .get_by_id(uuid)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("Request log {} not found", id)))
}

/// DELETE /list - Remove every entry
pub async fn clear_entries(
    State(state): State<CaptureApiState>,
) -> Result<Json<ClearResponse>, AppError> {
    let deleted = state.store.clear_all().await?;

    Ok(Json(ClearResponse {
        message: "All request logs cleared".to_string(),
        deleted,
    }))
}

/// POST /toggle - Flip the enable switch
pub async fn toggle_capture(State(state): State<CaptureApiState>) -> Json<ToggleResponse> {
    Json(ToggleResponse {
        enabled: state.collector.filter().toggle(),
    })
}

pub async fn capture_status(State(state): State<CaptureApiState>) -> Json<StatusResponse> {
    let filter = state.collector.filter();

    Json(StatusResponse {
        enabled: filter.is_enabled(),
        exclude_paths: filter.excludes(),
        in_flight_writes: state.collector.writer().in_flight(),
    })
}

pub async fn list_excludes(State(state): State<CaptureApiState>) -> Json<ExcludesResponse> {
    Json(ExcludesResponse {
        exclude_paths: state.collector.filter().excludes(),
        changed: None,
    })
}

pub async fn add_exclude(
    State(state): State<CaptureApiState>,
    Json(request): Json<ExcludeRequest>,
) -> Result<Json<ExcludesResponse>, AppError> {
    validate_prefix(&request.path)?;

    let filter = state.collector.filter();
    let changed = filter.add_exclude(request.path.clone());
    if changed {
        tracing::info!(path = %request.path, "Exclude path added");
    }

    Ok(Json(ExcludesResponse {
        exclude_paths: filter.excludes(),
        changed: Some(changed),
    }))
}

pub async fn remove_exclude(
    State(state): State<CaptureApiState>,
    Json(request): Json<ExcludeRequest>,
) -> Result<Json<ExcludesResponse>, AppError> {
    let filter = state.collector.filter();
    if !filter.remove_exclude(&request.path) {
        return Err(AppError::NotFound(format!(
            "Exclude path {} not found",
            request.path
        )));
    }
    tracing::info!(path = %request.path, "Exclude path removed");

    Ok(Json(ExcludesResponse {
        exclude_paths: filter.excludes(),
        changed: Some(true),
    }))
}

pub async fn replace_excludes(
    State(state): State<CaptureApiState>,
    Json(request): Json<ReplaceExcludesRequest>,
) -> Result<Json<ExcludesResponse>, AppError> {
    for path in &request.paths {
        validate_prefix(path)?;
    }

    let filter = state.collector.filter();
    filter.set_excludes(request.paths);
    tracing::info!(excludes = ?filter.excludes(), "Exclude paths replaced");

    Ok(Json(ExcludesResponse {
        exclude_paths: filter.excludes(),
        changed: Some(true),
    }))
}

fn validate_prefix(path: &str) -> Result<(), AppError> {
    if path.starts_with('/') {
        Ok(())
    } else {
        Err(AppError::BadRequest(format!(
            "Exclude path '{}' must start with '/'",
            path
        )))
    }
}
