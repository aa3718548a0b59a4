use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::Arc;

use super::{ApiError, AppState};

#[derive(Deserialize)]
pub struct CreateUserRequest {
    pub username: String,
    pub password: String,

    #[serde(default)]
    pub is_admin: bool,
}

#[derive(Deserialize)]
pub struct UpdateUserRequest {
    #[serde(default)]
    pub password: String,

    #[serde(default)]
    pub is_admin: bool,

    #[serde(default)]
    pub is_active: bool,
}

/// POST /admin/users
pub async fn create_user(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<CreateUserRequest>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    if payload.username.is_empty() || payload.password.is_empty() {
        return Err(ApiError::validation("Username and password are required"));
    }

    let existing = state
        .store
        .get_user_by_username(&payload.username)
        .await
        .map_err(|e| ApiError::database(e.to_string()))?;

    if existing.is_some() {
        return Err(ApiError::validation("Username already registered"));
    }

    let user = state
        .store
        .create_user(&payload.username, &payload.password, payload.is_admin)
        .await
        .map_err(|e| ApiError::internal(format!("Failed to create user: {e}")))?;

    tracing::info!(username = %user.username, "User created");

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "id": user.id,
            "username": user.username,
            "is_admin": user.is_admin,
            "message": "User created successfully",
        })),
    ))
}

/// GET /admin/users
pub async fn list_users(State(state): State<Arc<AppState>>) -> Result<Json<Value>, ApiError> {
    let users = state
        .store
        .list_users()
        .await
        .map_err(|e| ApiError::database(e.to_string()))?;

    let response: Vec<Value> = users
        .into_iter()
        .map(|user| {
            json!({
                "id": user.id,
                "username": user.username,
                "is_admin": user.is_admin,
                "is_active": user.is_active,
                "created_at": user.created_at,
                "last_login_at": user.last_login_at,
            })
        })
        .collect();

    Ok(Json(Value::Array(response)))
}

/// PUT /admin/users/{id}
pub async fn update_user(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
    Json(payload): Json<UpdateUserRequest>,
) -> Result<Json<Value>, ApiError> {
    let password = (!payload.password.is_empty()).then_some(payload.password.as_str());

    let user = state
        .store
        .update_user(id, password, payload.is_admin, payload.is_active)
        .await
        .map_err(|e| ApiError::database(e.to_string()))?
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;

    tracing::info!(username = %user.username, "User updated");

    Ok(Json(json!({
        "id": user.id,
        "username": user.username,
        "is_admin": user.is_admin,
        "is_active": user.is_active,
        "message": "User updated successfully",
    })))
}

/// DELETE /admin/users/{id}
pub async fn delete_user(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i32>,
) -> Result<Json<Value>, ApiError> {
    let deleted = state
        .store
        .delete_user(id)
        .await
        .map_err(|e| ApiError::database(e.to_string()))?;

    if !deleted {
        return Err(ApiError::NotFound("User not found".to_string()));
    }

    tracing::info!(user_id = id, "User deleted");

    Ok(Json(json!({ "message": "User deleted successfully" })))
}
