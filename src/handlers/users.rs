//! Sample host endpoints served by `reqtrail start`
//!
//! A tiny user directory whose queries run through the [`TracedPool`], so
//! every captured request carries the SQL it executed.

use crate::error::AppError;
use crate::storage::TracedPool;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Json;
use axum::routing::get;
use axum::Router;
use serde::{Deserialize, Serialize};
use sqlx::Row;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct User {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateUser {
    pub name: String,
}

pub fn routes(db: TracedPool) -> Router {
    Router::new()
        .route("/users", get(list_users).post(create_user))
        .route("/users/:id", get(get_user))
        .with_state(db)
}

/// Create the sample table if it does not exist.
pub async fn init_schema(db: &TracedPool) -> anyhow::Result<()> {
    db.execute(sqlx::query(
        "CREATE TABLE IF NOT EXISTS users (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL
        )",
    ))
    .await?;
    Ok(())
}

/// GET /users
pub async fn list_users(State(db): State<TracedPool>) -> Result<Json<Vec<User>>, AppError> {
    let rows = db
        .fetch_all(sqlx::query("SELECT id, name FROM users ORDER BY id"))
        .await?;

    Ok(Json(
        rows.iter()
            .map(|row| User {
                id: row.get("id"),
                name: row.get("name"),
            })
            .collect(),
    ))
}

/// GET /users/:id
pub async fn get_user(
    State(db): State<TracedPool>,
    Path(id): Path<i64>,
) -> Result<Json<User>, AppError> {
    let row = db
        .fetch_optional(sqlx::query("SELECT id, name FROM users WHERE id = ?").bind(id))
        .await?
        .ok_or_else(|| AppError::NotFound(format!("User {} not found", id)))?;

    Ok(Json(User {
        id: row.get("id"),
        name: row.get("name"),
    }))
}

/// POST /users
pub async fn create_user(
    State(db): State<TracedPool>,
    Json(request): Json<CreateUser>,
) -> Result<(StatusCode, Json<User>), AppError> {
    let name = request.name.trim();
    if name.is_empty() {
        return Err(AppError::BadRequest("name cannot be empty".to_string()));
    }

    let result = db
        .execute(sqlx::query("INSERT INTO users (name) VALUES (?)").bind(name))
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(User {
            id: result.last_insert_rowid(),
            name: name.to_string(),
        }),
    ))
}
