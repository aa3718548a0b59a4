use axum::{
    Json, Router,
    http::HeaderValue,
    middleware,
    routing::{delete, get, post, put},
};
use serde_json::json;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::db::Store;

mod admin;
pub mod auth;
mod automation;
mod error;
mod security;

pub use error::ApiError;
pub use security::IpRateLimiter;

#[derive(Clone)]
pub struct AppState {
    pub config: Config,

    pub store: Store,

    pub rate_limiter: IpRateLimiter,
}

impl AppState {
    #[must_use]
    pub fn new(config: Config, store: Store) -> Arc<Self> {
        let rate_limiter = IpRateLimiter::new(
            config.rate_limit.requests_per_second,
            config.rate_limit.burst,
        );

        Arc::new(Self {
            config,
            store,
            rate_limiter,
        })
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    let cors_origins = state.config.server.cors_allowed_origins.clone();

    let protected_routes = Router::new()
        .route("/auth/status", get(auth::user_status))
        .route("/automation/tasks", post(automation::create_task))
        .route("/automation/tasks", get(automation::list_tasks))
        .route("/automation/tasks/{id}", get(automation::get_task))
        .route("/automation/settings", get(automation::get_settings))
        .route("/automation/settings", put(automation::update_settings))
        .merge(admin_routes())
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::auth_middleware,
        ));

    let cors_layer = if cors_origins.contains(&"*".to_string()) {
        CorsLayer::new().allow_origin(Any)
    } else {
        let origins: Vec<HeaderValue> =
            cors_origins.iter().filter_map(|s| s.parse().ok()).collect();
        CorsLayer::new().allow_origin(origins)
    };

    Router::new()
        .route("/", get(root))
        .route("/auth/token", post(auth::login))
        .merge(protected_routes)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            security::rate_limit_middleware,
        ))
        .layer(middleware::from_fn(security::security_headers))
        .layer(cors_layer.allow_methods(Any).allow_headers(Any))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn admin_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/admin/users", post(admin::create_user))
        .route("/admin/users", get(admin::list_users))
        .route("/admin/users/{id}", put(admin::update_user))
        .route("/admin/users/{id}", delete(admin::delete_user))
        .route_layer(middleware::from_fn(auth::admin_middleware))
}

/// GET /
async fn root() -> Json<serde_json::Value> {
    Json(json!({
        "message": "Welcome to Resellarr API",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
