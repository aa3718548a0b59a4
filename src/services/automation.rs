use serde::Deserialize;
use serde_json::json;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::clients::panel::{
    CreateLineRequest, PanelClient, RenewLineRequest, sanitize_error_message,
};
use crate::db::{Store, TaskStatus};

/// The operations a task can run against the panel. Unknown names are
/// rejected at creation time, so a stored task always parses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    CreateAccount,
    FindAccount,
    ExtendPackage,
}

impl TaskKind {
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "create_account" => Some(Self::CreateAccount),
            "find_account" => Some(Self::FindAccount),
            "extend_package" => Some(Self::ExtendPackage),
            _ => None,
        }
    }
}

/// Parameters the client supplied alongside the task name.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TaskParams {
    #[serde(default)]
    pub username: Option<String>,

    #[serde(default)]
    pub password: Option<String>,

    #[serde(default)]
    pub package: i32,
}

/// Run a task in the background, detached from the request that created it.
///
/// The work itself runs in an inner spawn so a panic is caught as a
/// `JoinError` rather than taking down anything else; the outer task then
/// records the failure in the database. Either way the row ends up in a
/// terminal state.
pub fn spawn_execute(
    store: Store,
    client: PanelClient,
    task_id: i32,
    kind: TaskKind,
    params: TaskParams,
) {
    tokio::spawn(async move {
        let inner_store = store.clone();
        let handle =
            tokio::spawn(async move { execute(&inner_store, &client, task_id, kind, params).await });

        match handle.await {
            Ok(()) => {}
            Err(join_err) => {
                error!(task_id, "Task execution panicked: {join_err}");
                let result = json!({
                    "success": false,
                    "error": "Internal server error: task execution panicked",
                });
                if let Err(e) = store.finish_task(task_id, TaskStatus::Failed, result).await {
                    error!(task_id, "Failed to record panicked task: {e}");
                }
            }
        }
    });
}

async fn execute(
    store: &Store,
    client: &PanelClient,
    task_id: i32,
    kind: TaskKind,
    params: TaskParams,
) {
    let rid = Uuid::new_v4().to_string();
    let simulation = client.is_simulation_mode();
    info!(task_id, ?kind, simulation, "Executing automation task");

    let (status, result) = match kind {
        TaskKind::CreateAccount => run_create_account(client, &params, &rid).await,
        TaskKind::FindAccount => run_find_account(client, &params).await,
        TaskKind::ExtendPackage => run_extend_package(client, &params, &rid).await,
    };

    match store.finish_task(task_id, status, result).await {
        Ok(true) => info!(task_id, status = status.as_str(), "Task finished"),
        Ok(false) => warn!(task_id, "Task was no longer pending, result discarded"),
        Err(e) => error!(task_id, "Failed to store task result: {e}"),
    }
}

async fn run_create_account(
    client: &PanelClient,
    params: &TaskParams,
    rid: &str,
) -> (TaskStatus, serde_json::Value) {
    let req = CreateLineRequest {
        username: params.username.clone(),
        password: params.password.clone(),
        package: params.package,
        rid: rid.to_string(),
    };

    let result = if client.is_simulation_mode() {
        Ok(client.simulate_create_line(&req))
    } else {
        client.create_line(&req).await
    };

    match result {
        Ok(tx) => (
            TaskStatus::Completed,
            json!({
                "success": true,
                "data": {
                    "line_id": tx.line_id,
                    "username": params.username.clone().unwrap_or_default(),
                    "password": params.password.clone().unwrap_or_default(),
                    "expire_at": tx.expire_at,
                    "transaction_amount": tx.transaction_amount,
                    "rid": tx.rid,
                },
            }),
        ),
        Err(e) => failure(&e),
    }
}

async fn run_find_account(
    client: &PanelClient,
    params: &TaskParams,
) -> (TaskStatus, serde_json::Value) {
    let username = params.username.as_deref().unwrap_or_default();

    let result = if client.is_simulation_mode() {
        Ok(client.simulate_find_lines(username))
    } else {
        client.find_lines(username).await
    };

    match result {
        Ok(lines) => (
            TaskStatus::Completed,
            json!({ "success": true, "data": lines }),
        ),
        Err(e) => failure(&e),
    }
}

async fn run_extend_package(
    client: &PanelClient,
    params: &TaskParams,
    rid: &str,
) -> (TaskStatus, serde_json::Value) {
    let username = params.username.as_deref().unwrap_or_default();

    // Resolve the line first, then renew it.
    let lines = if client.is_simulation_mode() {
        Ok(client.simulate_find_lines(username))
    } else {
        client.find_lines(username).await
    };

    let lines = match lines {
        Ok(lines) => lines,
        Err(e) => return failure(&e),
    };

    let Some(line) = lines.first() else {
        return (
            TaskStatus::Failed,
            json!({
                "success": false,
                "error": "No accounts found with the provided username",
            }),
        );
    };

    let req = RenewLineRequest {
        package: params.package,
        rid: rid.to_string(),
    };

    let result = if client.is_simulation_mode() {
        Ok(client.simulate_renew_line(&line.line_id, &req))
    } else {
        client.renew_line(&line.line_id, &req).await
    };

    match result {
        Ok(tx) => (
            TaskStatus::Completed,
            json!({
                "success": true,
                "data": {
                    "line_id": tx.line_id,
                    "username": line.username,
                    "password": line.password,
                    "expire_at": tx.expire_at,
                    "transaction_amount": tx.transaction_amount,
                    "rid": tx.rid,
                },
            }),
        ),
        Err(e) => failure(&e),
    }
}

fn failure(err: &anyhow::Error) -> (TaskStatus, serde_json::Value) {
    let message = sanitize_error_message(&err.to_string());
    (
        TaskStatus::Failed,
        json!({ "success": false, "error": message }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_kind_parsing() {
        assert_eq!(TaskKind::parse("create_account"), Some(TaskKind::CreateAccount));
        assert_eq!(TaskKind::parse("find_account"), Some(TaskKind::FindAccount));
        assert_eq!(TaskKind::parse("extend_package"), Some(TaskKind::ExtendPackage));
        assert_eq!(TaskKind::parse("delete_account"), None);
        assert_eq!(TaskKind::parse(""), None);
    }

    #[test]
    fn test_failure_sanitizes_html() {
        let err = anyhow::anyhow!("<html><body>504 Gateway Timeout</body></html>");
        let (status, result) = failure(&err);
        assert_eq!(status, TaskStatus::Failed);
        let message = result["error"].as_str().unwrap();
        assert!(!message.contains("<html"));
    }
}
