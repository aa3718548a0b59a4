use axum::{
    Json,
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::{ApiError, AppState};
use crate::auth::verify_token;
use crate::db::User;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    pub username: String,
}

#[derive(Serialize)]
pub struct UserStatusResponse {
    pub is_active: bool,
    pub is_admin: bool,
    pub created_at: String,
}

/// The authenticated user, stashed in request extensions by the auth
/// middleware for handlers downstream.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

// ============================================================================
// Middleware
// ============================================================================

/// Authentication middleware: validates the bearer token, loads the user it
/// names and rejects inactive accounts. The user is attached to the request
/// extensions so handlers never hit the token path again.
pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = extract_bearer_token(&headers)?;

    let claims = verify_token(&token, &state.config.auth.secret_key)
        .map_err(|_| ApiError::Unauthorized("Invalid or expired token".to_string()))?;

    let user = state
        .store
        .get_user_by_username(&claims.sub)
        .await
        .map_err(|e| ApiError::internal(format!("Failed to load user: {e}")))?
        .ok_or_else(|| ApiError::Unauthorized("User not found".to_string()))?;

    if !user.is_active {
        return Err(ApiError::Unauthorized("User is inactive".to_string()));
    }

    request.extensions_mut().insert(CurrentUser(user));
    Ok(next.run(request).await)
}

/// Admin gate, layered after `auth_middleware` on the admin routes.
pub async fn admin_middleware(request: Request, next: Next) -> Result<Response, ApiError> {
    let user = request
        .extensions()
        .get::<CurrentUser>()
        .ok_or_else(|| ApiError::Unauthorized("User not authenticated".to_string()))?;

    if !user.0.is_admin {
        return Err(ApiError::Forbidden("Admin access required".to_string()));
    }

    Ok(next.run(request).await)
}

fn extract_bearer_token(headers: &HeaderMap) -> Result<String, ApiError> {
    let auth_header = headers
        .get("Authorization")
        .ok_or_else(|| ApiError::Unauthorized("Authorization header is required".to_string()))?;

    let auth_str = auth_header
        .to_str()
        .map_err(|_| ApiError::Unauthorized("Invalid Authorization header".to_string()))?;

    let mut parts = auth_str.splitn(2, ' ');
    let scheme = parts.next().unwrap_or_default();
    let token = parts.next().unwrap_or_default();

    if !scheme.eq_ignore_ascii_case("bearer") || token.is_empty() {
        return Err(ApiError::Unauthorized(
            "Authorization header format must be Bearer {token}".to_string(),
        ));
    }

    Ok(token.trim().to_string())
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /auth/token
/// Authenticate with username and password, returns a JWT on success.
pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<TokenResponse>, ApiError> {
    if payload.username.is_empty() || payload.password.is_empty() {
        return Err(ApiError::validation("Username and password are required"));
    }

    let is_valid = state
        .store
        .verify_user_password(&payload.username, &payload.password)
        .await
        .map_err(|e| ApiError::internal(format!("Authentication error: {e}")))?;

    if !is_valid {
        return Err(ApiError::Unauthorized(
            "Invalid username or password".to_string(),
        ));
    }

    let user = state
        .store
        .get_user_by_username(&payload.username)
        .await
        .map_err(|e| ApiError::internal(format!("Failed to get user: {e}")))?
        .ok_or_else(|| ApiError::Unauthorized("Invalid username or password".to_string()))?;

    if !user.is_active {
        return Err(ApiError::Unauthorized(
            "Account is inactive. Please contact administrator.".to_string(),
        ));
    }

    // A failed timestamp update should not fail the login.
    if let Err(e) = state.store.record_user_login(&user.username).await {
        tracing::warn!("Failed to update last login time: {e}");
    }

    let token = crate::auth::create_access_token(
        &user.username,
        &state.config.auth.secret_key,
        state.config.auth.token_expire_minutes,
    )
    .map_err(|e| ApiError::internal(format!("Failed to create token: {e}")))?;

    Ok(Json(TokenResponse {
        access_token: token,
        token_type: "bearer".to_string(),
        username: user.username,
    }))
}

/// GET /auth/status
/// Status flags for the authenticated user.
pub async fn user_status(
    axum::Extension(current): axum::Extension<CurrentUser>,
) -> Json<UserStatusResponse> {
    Json(UserStatusResponse {
        is_active: current.0.is_active,
        is_admin: current.0.is_admin,
        created_at: current.0.created_at,
    })
}
