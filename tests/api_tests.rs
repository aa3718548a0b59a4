use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode},
};
use http_body_util::BodyExt;
use resellarr::config::Config;
use resellarr::db::{Store, TaskStatus};
use tower::ServiceExt;

/// Default credentials seeded by the initial migration
const DEFAULT_USERNAME: &str = "admin";
const DEFAULT_PASSWORD: &str = "admin";

async fn spawn_app() -> Router {
    spawn_app_with_store().await.0
}

async fn spawn_app_with_store() -> (Router, Store) {
    let config = Config::default();

    // A single pooled connection keeps every query on the same in-memory
    // database.
    let store = Store::with_pool_options("sqlite::memory:", 1, 1)
        .await
        .expect("Failed to create store");

    let state = resellarr::api::AppState::new(config, store.clone());
    (resellarr::api::router(state), store)
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let body = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&body).unwrap()
}

async fn login(app: &Router, username: &str, password: &str) -> String {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/auth/token")
                .header("Content-Type", "application/json")
                .body(Body::from(
                    serde_json::json!({ "username": username, "password": password }).to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["token_type"], "bearer");
    body["access_token"].as_str().unwrap().to_string()
}

fn get(uri: &str, token: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header("Authorization", format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap()
}

fn json_request(method: &str, uri: &str, token: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("Authorization", format!("Bearer {token}"))
        .header("Content-Type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

/// Configure simulation-mode panel settings for whoever the token belongs to.
async fn configure_simulation_settings(app: &Router, token: &str) {
    let response = app
        .clone()
        .oneshot(json_request(
            "PUT",
            "/automation/settings",
            token,
            serde_json::json!({
                "website_url": "http://localhost:9999",
                "api_key": "test",
                "auth_user": "test",
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

/// Poll a task until it leaves the pending state.
async fn wait_for_task(app: &Router, token: &str, task_id: i64) -> serde_json::Value {
    for _ in 0..100 {
        let response = app
            .clone()
            .oneshot(get(&format!("/automation/tasks/{task_id}"), token))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        if body["status"] != "pending" {
            return body;
        }
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    }
    panic!("Task {task_id} did not finish in time");
}

#[tokio::test]
async fn test_root_is_public() {
    let app = spawn_app().await;

    let response = app
        .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert!(body["message"].as_str().unwrap().contains("Resellarr"));
}

#[tokio::test]
async fn test_login_and_status() {
    let app = spawn_app().await;

    let token = login(&app, DEFAULT_USERNAME, DEFAULT_PASSWORD).await;

    let response = app
        .clone()
        .oneshot(get("/auth/status", &token))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["is_active"], true);
    assert_eq!(body["is_admin"], true);
    assert!(body["created_at"].is_string());
}

#[tokio::test]
async fn test_login_rejects_bad_credentials() {
    let app = spawn_app().await;

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/auth/token")
                .header("Content-Type", "application/json")
                .body(Body::from(
                    serde_json::json!({ "username": "admin", "password": "wrong" }).to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = body_json(response).await;
    assert_eq!(body["error"], "Invalid username or password");
}

#[tokio::test]
async fn test_protected_routes_require_bearer_token() {
    let app = spawn_app().await;

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/auth/status")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/auth/status")
                .header("Authorization", "Basic abc123")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = app
        .clone()
        .oneshot(get("/auth/status", "not-a-real-token"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_admin_user_crud() {
    let app = spawn_app().await;
    let admin_token = login(&app, DEFAULT_USERNAME, DEFAULT_PASSWORD).await;

    // Create a regular user
    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/admin/users",
            &admin_token,
            serde_json::json!({
                "username": "alice",
                "password": "alice-password",
                "is_admin": false,
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let created = body_json(response).await;
    let alice_id = created["id"].as_i64().unwrap();
    assert_eq!(created["username"], "alice");
    assert_eq!(created["is_admin"], false);

    // Duplicate username is rejected
    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/admin/users",
            &admin_token,
            serde_json::json!({ "username": "alice", "password": "other" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // Listing includes both users
    let response = app
        .clone()
        .oneshot(get("/admin/users", &admin_token))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let users = body_json(response).await;
    let usernames: Vec<&str> = users
        .as_array()
        .unwrap()
        .iter()
        .map(|u| u["username"].as_str().unwrap())
        .collect();
    assert!(usernames.contains(&"admin"));
    assert!(usernames.contains(&"alice"));

    // A non-admin cannot reach admin routes
    let alice_token = login(&app, "alice", "alice-password").await;
    let response = app
        .clone()
        .oneshot(get("/admin/users", &alice_token))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let body = body_json(response).await;
    assert_eq!(body["error"], "Admin access required");

    // Update: promote alice, keep her active
    let response = app
        .clone()
        .oneshot(json_request(
            "PUT",
            &format!("/admin/users/{alice_id}"),
            &admin_token,
            serde_json::json!({ "is_admin": true, "is_active": true }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["is_admin"], true);

    // Deactivated users cannot log in
    let response = app
        .clone()
        .oneshot(json_request(
            "PUT",
            &format!("/admin/users/{alice_id}"),
            &admin_token,
            serde_json::json!({ "is_admin": true, "is_active": false }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/auth/token")
                .header("Content-Type", "application/json")
                .body(Body::from(
                    serde_json::json!({ "username": "alice", "password": "alice-password" })
                        .to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    // Delete, then deleting again is a 404
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri(format!("/admin/users/{alice_id}"))
                .header("Authorization", format!("Bearer {admin_token}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri(format!("/admin/users/{alice_id}"))
                .header("Authorization", format!("Bearer {admin_token}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_settings_roundtrip() {
    let app = spawn_app().await;
    let token = login(&app, DEFAULT_USERNAME, DEFAULT_PASSWORD).await;

    // No settings yet: blank form, not a 404
    let response = app
        .clone()
        .oneshot(get("/automation/settings", &token))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["website_url"], "");
    assert_eq!(body["api_key"], "");
    assert_eq!(body["auth_user"], "");

    // Invalid URL is rejected
    let response = app
        .clone()
        .oneshot(json_request(
            "PUT",
            "/automation/settings",
            &token,
            serde_json::json!({
                "website_url": "not a url",
                "api_key": "key",
                "auth_user": "user",
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // Save and read back
    let response = app
        .clone()
        .oneshot(json_request(
            "PUT",
            "/automation/settings",
            &token,
            serde_json::json!({
                "website_url": "https://panel.example.com",
                "api_key": "real-key",
                "auth_user": "reseller",
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["message"], "Settings updated successfully");

    let response = app
        .clone()
        .oneshot(get("/automation/settings", &token))
        .await
        .unwrap();
    let body = body_json(response).await;
    assert_eq!(body["website_url"], "https://panel.example.com");
    assert_eq!(body["api_key"], "real-key");
    assert_eq!(body["auth_user"], "reseller");
    assert!(body["created_at"].is_string());

    // Updating overwrites in place
    let response = app
        .clone()
        .oneshot(json_request(
            "PUT",
            "/automation/settings",
            &token,
            serde_json::json!({
                "website_url": "https://other.example.com",
                "api_key": "new-key",
                "auth_user": "reseller",
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .clone()
        .oneshot(get("/automation/settings", &token))
        .await
        .unwrap();
    let body = body_json(response).await;
    assert_eq!(body["website_url"], "https://other.example.com");
    assert_eq!(body["api_key"], "new-key");
}

#[tokio::test]
async fn test_create_account_task_lifecycle() {
    let app = spawn_app().await;
    let token = login(&app, DEFAULT_USERNAME, DEFAULT_PASSWORD).await;
    configure_simulation_settings(&app, &token).await;

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/automation/tasks",
            &token,
            serde_json::json!({
                "name": "create_account",
                "target_website": "http://localhost:9999",
                "username": "new_customer",
                "password": "Secret123!",
                "package": 103,
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::CREATED);
    let task = body_json(response).await;
    assert_eq!(task["status"], "pending");
    assert_eq!(task["name"], "create_account");
    let task_id = task["id"].as_i64().unwrap();

    let finished = wait_for_task(&app, &token, task_id).await;
    assert_eq!(finished["status"], "completed");
    assert_eq!(finished["result"]["success"], true);

    let data = &finished["result"]["data"];
    assert!(data["line_id"].as_str().unwrap().starts_with("sim-"));
    assert_eq!(data["username"], "new_customer");
    assert_eq!(data["transaction_amount"], 270.0);
    assert!(finished["completed_at"].is_string());

    // The task shows up in the listing
    let response = app
        .clone()
        .oneshot(get("/automation/tasks", &token))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let tasks = body_json(response).await;
    assert!(
        tasks
            .as_array()
            .unwrap()
            .iter()
            .any(|t| t["id"].as_i64() == Some(task_id))
    );
}

#[tokio::test]
async fn test_find_account_task_returns_lines() {
    let app = spawn_app().await;
    let token = login(&app, DEFAULT_USERNAME, DEFAULT_PASSWORD).await;
    configure_simulation_settings(&app, &token).await;

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/automation/tasks",
            &token,
            serde_json::json!({
                "name": "find_account",
                "target_website": "http://localhost:9999",
                "username": "existing_customer",
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let task_id = body_json(response).await["id"].as_i64().unwrap();

    let finished = wait_for_task(&app, &token, task_id).await;
    assert_eq!(finished["status"], "completed");
    assert_eq!(finished["result"]["success"], true);

    let lines = finished["result"]["data"].as_array().unwrap();
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0]["username"], "existing_customer");
}

#[tokio::test]
async fn test_extend_package_task_lifecycle() {
    let app = spawn_app().await;
    let token = login(&app, DEFAULT_USERNAME, DEFAULT_PASSWORD).await;
    configure_simulation_settings(&app, &token).await;

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/automation/tasks",
            &token,
            serde_json::json!({
                "name": "extend_package",
                "target_website": "http://localhost:9999",
                "username": "existing_customer",
                "package": 112,
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let task_id = body_json(response).await["id"].as_i64().unwrap();

    let finished = wait_for_task(&app, &token, task_id).await;
    assert_eq!(finished["status"], "completed");
    assert_eq!(finished["result"]["data"]["username"], "existing_customer");
    assert_eq!(finished["result"]["data"]["transaction_amount"], 950.0);
}

#[tokio::test]
async fn test_finished_task_status_never_regresses() {
    let (app, store) = spawn_app_with_store().await;
    let token = login(&app, DEFAULT_USERNAME, DEFAULT_PASSWORD).await;
    configure_simulation_settings(&app, &token).await;

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/automation/tasks",
            &token,
            serde_json::json!({
                "name": "create_account",
                "target_website": "http://localhost:9999",
                "username": "stable_customer",
                "password": "Secret123!",
                "package": 103,
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let task_id = body_json(response).await["id"].as_i64().unwrap();

    let finished = wait_for_task(&app, &token, task_id).await;
    assert_eq!(finished["status"], "completed");
    let original_result = finished["result"].clone();

    // A late failure report for an already-terminal task is a no-op
    let overwritten = store
        .finish_task(
            i32::try_from(task_id).unwrap(),
            TaskStatus::Failed,
            serde_json::json!({ "success": false, "error": "stale worker result" }),
        )
        .await
        .unwrap();
    assert!(!overwritten);

    let response = app
        .clone()
        .oneshot(get(&format!("/automation/tasks/{task_id}"), &token))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "completed");
    assert_eq!(body["result"], original_result);
}

#[tokio::test]
async fn test_task_creation_validation() {
    let app = spawn_app().await;
    let token = login(&app, DEFAULT_USERNAME, DEFAULT_PASSWORD).await;

    // Without settings the panel cannot be reached
    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/automation/tasks",
            &token,
            serde_json::json!({
                "name": "create_account",
                "target_website": "http://localhost:9999",
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = body_json(response).await;
    assert_eq!(body["error"], "Settings not found");

    configure_simulation_settings(&app, &token).await;

    // Unknown task names are rejected
    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/automation/tasks",
            &token,
            serde_json::json!({
                "name": "delete_account",
                "target_website": "http://localhost:9999",
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // Missing panel URL gets the targeted hint
    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/automation/tasks",
            &token,
            serde_json::json!({ "name": "create_account" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert!(
        body["error"]
            .as_str()
            .unwrap()
            .contains("Panel URL is not configured")
    );
}

#[tokio::test]
async fn test_tasks_are_scoped_per_user() {
    let app = spawn_app().await;
    let admin_token = login(&app, DEFAULT_USERNAME, DEFAULT_PASSWORD).await;
    configure_simulation_settings(&app, &admin_token).await;

    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/automation/tasks",
            &admin_token,
            serde_json::json!({
                "name": "find_account",
                "target_website": "http://localhost:9999",
                "username": "someone",
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let task_id = body_json(response).await["id"].as_i64().unwrap();

    // A different user sees neither the task nor its listing entry
    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/admin/users",
            &admin_token,
            serde_json::json!({ "username": "bob", "password": "bob-password" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let bob_token = login(&app, "bob", "bob-password").await;

    let response = app
        .clone()
        .oneshot(get(&format!("/automation/tasks/{task_id}"), &bob_token))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app
        .clone()
        .oneshot(get("/automation/tasks", &bob_token))
        .await
        .unwrap();
    let tasks = body_json(response).await;
    assert!(tasks.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_security_headers_present() {
    let app = spawn_app().await;

    let response = app
        .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
        .await
        .unwrap();

    let headers = response.headers();
    assert_eq!(headers.get("X-Content-Type-Options").unwrap(), "nosniff");
    assert_eq!(headers.get("X-Frame-Options").unwrap(), "DENY");
    assert!(headers.contains_key("Content-Security-Policy"));
}
