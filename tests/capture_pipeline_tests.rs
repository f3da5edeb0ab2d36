//! End-to-end capture tests: a host router with the layer attached, driven
//! through `tower::ServiceExt::oneshot`.

use axum::body::{Body, Bytes};
use axum::extract::{Path, State};
use axum::http::{Request, StatusCode};
use axum::response::{Json, Response};
use axum::routing::{get, post};
use axum::Router;
use reqtrail::config::{CaptureConfig, StorageConfig};
use reqtrail::storage::{connect, TracedPool};
use reqtrail::Reqtrail;
use serde_json::{json, Value};
use std::time::{Duration, Instant};
use tower::ServiceExt;

async fn setup(capture: CaptureConfig) -> (Router, Reqtrail) {
    let pool = connect("sqlite::memory:", 1).await.unwrap();
    let trail = Reqtrail::new(pool, &capture, &StorageConfig::default())
        .await
        .unwrap();

    let db = trail.traced_pool();
    db.execute(sqlx::query(
        "CREATE TABLE users (id INTEGER PRIMARY KEY, visits INTEGER NOT NULL DEFAULT 0)",
    ))
    .await
    .unwrap();
    db.execute(sqlx::query("INSERT INTO users (id) VALUES (42), (43)"))
        .await
        .unwrap();

    let host = Router::new()
        .route("/users/:id", get(visit_user))
        .route("/batch", get(batch))
        .route("/slow", get(slow))
        .route("/health", get(|| async { "ok" }))
        .route("/upload", post(|body: Bytes| async move { body.len().to_string() }))
        .with_state(db);

    (trail.attach(host), trail)
}

/// One UPDATE affecting one row
async fn visit_user(State(db): State<TracedPool>, Path(id): Path<i64>) -> Json<Value> {
    db.execute(sqlx::query("UPDATE users SET visits = visits + 1 WHERE id = ?").bind(id))
        .await
        .unwrap();
    Json(json!({ "id": id }))
}

/// Three statements in a known order
async fn batch(State(db): State<TracedPool>) -> &'static str {
    db.fetch_all(sqlx::query("SELECT id FROM users ORDER BY id"))
        .await
        .unwrap();
    db.execute(sqlx::query("UPDATE users SET visits = 0"))
        .await
        .unwrap();
    db.fetch_one(sqlx::query("SELECT COUNT(*) FROM users"))
        .await
        .unwrap();
    "done"
}

async fn slow() -> StatusCode {
    tokio::time::sleep(Duration::from_millis(60)).await;
    StatusCode::ACCEPTED
}

fn get_request(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn json_body(response: Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

/// Entries are written by a background task; poll until they land.
async fn wait_for_entries(trail: &Reqtrail, expected: u64) -> u64 {
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        let count = trail.store().count().await.unwrap();
        if count >= expected || Instant::now() > deadline {
            return count;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[tokio::test]
async fn test_get_user_is_captured_with_its_query() {
    let (app, trail) = setup(CaptureConfig::default()).await;

    let response = app.oneshot(get_request("/users/42")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await, json!({"id": 42}));

    assert_eq!(wait_for_entries(&trail, 1).await, 1);

    let page = trail.store().list(1, 20).await.unwrap();
    let entry = trail
        .store()
        .get_by_id(page.entries[0].id)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(entry.method, "GET");
    assert_eq!(entry.url, "/users/42");
    assert!(entry.body.is_none());
    assert_eq!(entry.status_code, 200);
    assert_eq!(entry.response_body.as_deref(), Some(r#"{"id":42}"#));

    let trace = entry.sql_queries.expect("queries captured");
    assert_eq!(trace.len(), 1);
    assert_eq!(trace.queries[0].rows_affected, 1);
    assert!(trace.queries[0].statement.starts_with("UPDATE users"));
    assert!(trace.queries[0].error.is_none());
}

#[tokio::test]
async fn test_queries_are_captured_in_execution_order() {
    let (app, trail) = setup(CaptureConfig::default()).await;

    let response = app.oneshot(get_request("/batch")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(wait_for_entries(&trail, 1).await, 1);

    let page = trail.store().list(1, 1).await.unwrap();
    let entry = trail
        .store()
        .get_by_id(page.entries[0].id)
        .await
        .unwrap()
        .unwrap();

    let statements: Vec<_> = entry
        .sql_queries
        .unwrap()
        .queries
        .into_iter()
        .map(|q| q.statement)
        .collect();
    assert_eq!(
        statements,
        vec![
            "SELECT id FROM users ORDER BY id",
            "UPDATE users SET visits = 0",
            "SELECT COUNT(*) FROM users",
        ]
    );
}

#[tokio::test]
async fn test_request_without_queries_has_no_trace() {
    let (app, trail) = setup(CaptureConfig::default()).await;

    let response = app.oneshot(get_request("/slow")).await.unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    assert_eq!(wait_for_entries(&trail, 1).await, 1);

    let page = trail.store().list(1, 1).await.unwrap();
    let summary = &page.entries[0];
    assert_eq!(summary.status_code, 202);
    assert!(summary.duration_us >= 60_000);

    let entry = trail.store().get_by_id(summary.id).await.unwrap().unwrap();
    assert!(entry.sql_queries.is_none());
    assert!(entry.response_body.is_none());
}

#[tokio::test]
async fn test_concurrent_requests_keep_queries_apart() {
    let (app, trail) = setup(CaptureConfig::default()).await;

    let mut handles = Vec::new();
    for uri in ["/users/42", "/batch", "/users/43", "/batch"] {
        let app = app.clone();
        handles.push(tokio::spawn(async move {
            app.oneshot(get_request(uri)).await.unwrap().status()
        }));
    }
    for handle in handles {
        assert_eq!(handle.await.unwrap(), StatusCode::OK);
    }

    assert_eq!(wait_for_entries(&trail, 4).await, 4);
    let page = trail.store().list(1, 20).await.unwrap();
    for summary in page.entries {
        let entry = trail.store().get_by_id(summary.id).await.unwrap().unwrap();
        let expected = if entry.url == "/batch" { 3 } else { 1 };
        assert_eq!(entry.query_count(), expected, "url {}", entry.url);
    }
}

#[tokio::test]
async fn test_excluded_and_disabled_requests_are_not_captured() {
    let capture = CaptureConfig {
        exclude_paths: vec!["/users/43".to_string()],
        ..CaptureConfig::default()
    };
    let (app, trail) = setup(capture).await;

    let response = app
        .clone()
        .oneshot(get_request("/health"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .clone()
        .oneshot(get_request("/users/43"))
        .await
        .unwrap();
    assert_eq!(json_body(response).await, json!({"id": 43}));

    trail.filter().set_enabled(false);
    let response = app.oneshot(get_request("/users/42")).await.unwrap();
    assert_eq!(json_body(response).await, json!({"id": 42}));

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(trail.store().count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_admin_api_round_trip() {
    let (app, trail) = setup(CaptureConfig::default()).await;

    let empty = json_body(
        app.clone()
            .oneshot(get_request("/reqtrail/api/list"))
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(empty["total"], 0);
    assert_eq!(empty["entries"], json!([]));

    app.clone()
        .oneshot(get_request("/users/42"))
        .await
        .unwrap();
    assert_eq!(wait_for_entries(&trail, 1).await, 1);

    // Admin calls are excluded, so they never add entries of their own.
    let listed = json_body(
        app.clone()
            .oneshot(get_request("/reqtrail/api/list?page=0&limit=500"))
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(listed["total"], 1);
    assert_eq!(listed["page"], 1);
    assert_eq!(listed["limit"], 20);
    let id = listed["entries"][0]["id"].as_str().unwrap().to_string();

    let detail = app
        .clone()
        .oneshot(get_request(&format!("/reqtrail/api/detail/{}", id)))
        .await
        .unwrap();
    assert_eq!(detail.status(), StatusCode::OK);
    let detail = json_body(detail).await;
    assert_eq!(detail["url"], "/users/42");
    assert_eq!(detail["sql_queries"]["queries"][0]["rows_affected"], 1);

    let cleared = app
        .clone()
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri("/reqtrail/api/list")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(json_body(cleared).await["deleted"], 1);

    let missing = app
        .oneshot(get_request(&format!("/reqtrail/api/detail/{}", id)))
        .await
        .unwrap();
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
    assert_eq!(trail.store().count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_toggle_through_admin_api_stops_capture() {
    let (app, trail) = setup(CaptureConfig::default()).await;

    let toggled = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/reqtrail/api/toggle")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(json_body(toggled).await["enabled"], false);

    app.oneshot(get_request("/users/42")).await.unwrap();

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(trail.store().count().await.unwrap(), 0);
}

#[tokio::test]
async fn test_chunked_upload_over_capture_limit_reaches_handler_unrecorded() {
    let capture = CaptureConfig {
        max_body_bytes: 16,
        ..CaptureConfig::default()
    };
    let (app, trail) = setup(capture).await;

    // No content-length, so the size is only known once the stream is read.
    let chunks = futures::stream::iter(vec![
        Ok::<_, std::io::Error>(Bytes::from_static(b"0123456789")),
        Ok(Bytes::from_static(b"abcdefghij")),
    ]);
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/upload")
                .body(Body::from_stream(chunks))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(&bytes[..], b"20");

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(trail.store().count().await.unwrap(), 0);
}
