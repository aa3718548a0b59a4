use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
};
use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::Arc;

use super::auth::CurrentUser;
use super::{ApiError, AppState};
use crate::clients::panel::{PanelClient, PanelConfig};
use crate::db::PanelSettings;
use crate::entities::automation_tasks;
use crate::services::automation::{TaskKind, TaskParams, spawn_execute};

#[derive(Deserialize)]
pub struct TaskRequest {
    pub name: String,

    // Optional so a missing field produces a targeted error instead of a
    // generic deserialization failure.
    #[serde(default)]
    pub target_website: Option<String>,

    #[serde(flatten)]
    pub params: TaskParams,
}

#[derive(Deserialize)]
pub struct SettingsRequest {
    pub website_url: String,
    pub api_key: String,
    pub auth_user: String,
}

/// POST /automation/tasks
///
/// Creates the task row, kicks off execution in the background and returns
/// the pending row immediately. Clients poll for the outcome.
pub async fn create_task(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
    Json(payload): Json<TaskRequest>,
) -> Result<(StatusCode, Json<automation_tasks::Model>), ApiError> {
    let Some(kind) = TaskKind::parse(&payload.name) else {
        return Err(ApiError::validation("Invalid task name"));
    };

    let target_website = payload
        .target_website
        .as_deref()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| {
            ApiError::validation(
                "Panel URL is not configured. Please go to Settings and configure your Panel URL first.",
            )
        })?;

    let settings = state
        .store
        .get_panel_settings(current.0.id)
        .await
        .map_err(|e| ApiError::database(e.to_string()))?
        .ok_or_else(|| ApiError::NotFound("Settings not found".to_string()))?;

    let task = state
        .store
        .create_task(current.0.id, &payload.name, target_website)
        .await
        .map_err(|e| ApiError::internal(format!("Failed to create task: {e}")))?;

    let client = panel_client(&state, &settings);
    spawn_execute(state.store.clone(), client, task.id, kind, payload.params);

    Ok((StatusCode::CREATED, Json(task)))
}

/// GET /automation/tasks
pub async fn list_tasks(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
) -> Result<Json<Vec<automation_tasks::Model>>, ApiError> {
    let tasks = state
        .store
        .list_tasks(current.0.id)
        .await
        .map_err(|e| ApiError::database(e.to_string()))?;

    Ok(Json(tasks))
}

/// GET /automation/tasks/{id}
pub async fn get_task(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
    Path(id): Path<i32>,
) -> Result<Json<Value>, ApiError> {
    let task = state
        .store
        .get_task(id, current.0.id)
        .await
        .map_err(|e| ApiError::database(e.to_string()))?
        .ok_or_else(|| ApiError::NotFound("Task not found".to_string()))?;

    // A task that has not finished yet has no result; normalize to an empty
    // failure envelope so clients always see the same shape.
    let result = task
        .result
        .clone()
        .unwrap_or_else(|| json!({ "success": false, "data": {} }));

    Ok(Json(json!({
        "id": task.id,
        "user_id": task.user_id,
        "name": task.name,
        "target_website": task.target_website,
        "status": task.status,
        "created_at": task.created_at,
        "updated_at": task.updated_at,
        "completed_at": task.completed_at,
        "result": result,
    })))
}

/// GET /automation/settings
///
/// Returns empty fields rather than 404 when the user has no settings yet;
/// the settings page treats that as a blank form.
pub async fn get_settings(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
) -> Result<Json<Value>, ApiError> {
    let settings = state
        .store
        .get_panel_settings(current.0.id)
        .await
        .map_err(|e| ApiError::database(e.to_string()))?;

    let Some(settings) = settings else {
        return Ok(Json(json!({
            "website_url": "",
            "api_key": "",
            "auth_user": "",
        })));
    };

    Ok(Json(json!({
        "website_url": settings.panel_url,
        "api_key": settings.api_key,
        "auth_user": settings.auth_user,
        "created_at": settings.created_at,
        "updated_at": settings.updated_at,
    })))
}

/// PUT /automation/settings
pub async fn update_settings(
    State(state): State<Arc<AppState>>,
    Extension(current): Extension<CurrentUser>,
    Json(payload): Json<SettingsRequest>,
) -> Result<Json<Value>, ApiError> {
    if payload.website_url.is_empty() || payload.api_key.is_empty() || payload.auth_user.is_empty()
    {
        return Err(ApiError::validation(
            "website_url, api_key and auth_user are required",
        ));
    }

    let parsed = url::Url::parse(&payload.website_url)
        .map_err(|_| ApiError::validation("website_url must be a valid URL"))?;
    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        return Err(ApiError::validation(
            "website_url must be an HTTP or HTTPS URL",
        ));
    }

    let settings = PanelSettings {
        panel_url: payload.website_url,
        api_key: payload.api_key,
        auth_user: payload.auth_user,
        ..Default::default()
    };

    state
        .store
        .save_panel_settings(current.0.id, &settings)
        .await
        .map_err(|e| ApiError::internal(format!("Failed to save settings: {e}")))?;

    Ok(Json(json!({ "message": "Settings updated successfully" })))
}

fn panel_client(state: &AppState, settings: &PanelSettings) -> PanelClient {
    PanelClient::new(
        PanelConfig {
            base_url: settings.panel_url.trim_end_matches('/').to_string(),
            api_key: settings.api_key.clone(),
            auth_user: settings.auth_user.clone(),
        },
        state.config.panel.request_timeout_seconds,
    )
}
