use anyhow::{Context, Result};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
};

use crate::entities::automation_tasks;

/// Terminal and non-terminal task states. A task starts pending and moves to
/// exactly one of the terminal states, never back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    Pending,
    Completed,
    Failed,
}

impl TaskStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

pub struct TaskRepository {
    conn: DatabaseConnection,
}

impl TaskRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    pub async fn create(
        &self,
        user_id: i32,
        name: &str,
        target_website: &str,
    ) -> Result<automation_tasks::Model> {
        let now = chrono::Utc::now().to_rfc3339();

        let active = automation_tasks::ActiveModel {
            user_id: Set(user_id),
            name: Set(name.to_string()),
            target_website: Set(target_website.to_string()),
            status: Set(TaskStatus::Pending.as_str().to_string()),
            result: Set(None),
            created_at: Set(now.clone()),
            updated_at: Set(now),
            completed_at: Set(None),
            ..Default::default()
        };

        active
            .insert(&self.conn)
            .await
            .context("Failed to create automation task")
    }

    pub async fn list_for_user(&self, user_id: i32) -> Result<Vec<automation_tasks::Model>> {
        automation_tasks::Entity::find()
            .filter(automation_tasks::Column::UserId.eq(user_id))
            .order_by_desc(automation_tasks::Column::Id)
            .all(&self.conn)
            .await
            .context("Failed to list automation tasks")
    }

    /// Fetch a task only if it belongs to the given user. Ownership is checked
    /// in the query so another user's task IDs behave as not found.
    pub async fn get_for_user(
        &self,
        task_id: i32,
        user_id: i32,
    ) -> Result<Option<automation_tasks::Model>> {
        automation_tasks::Entity::find_by_id(task_id)
            .filter(automation_tasks::Column::UserId.eq(user_id))
            .one(&self.conn)
            .await
            .context("Failed to query automation task")
    }

    /// Move a pending task to a terminal state and attach its result. The
    /// update is filtered on the current status being "pending", so a task
    /// that already finished is left untouched and `false` is returned.
    pub async fn finish(
        &self,
        task_id: i32,
        status: TaskStatus,
        result: serde_json::Value,
    ) -> Result<bool> {
        let now = chrono::Utc::now().to_rfc3339();

        let update = automation_tasks::Entity::update_many()
            .filter(automation_tasks::Column::Id.eq(task_id))
            .filter(automation_tasks::Column::Status.eq(TaskStatus::Pending.as_str()))
            .col_expr(
                automation_tasks::Column::Status,
                sea_orm::sea_query::Expr::value(status.as_str()),
            )
            .col_expr(
                automation_tasks::Column::Result,
                sea_orm::sea_query::Expr::value(sea_orm::Value::Json(Some(Box::new(result)))),
            )
            .col_expr(
                automation_tasks::Column::CompletedAt,
                sea_orm::sea_query::Expr::value(now.clone()),
            )
            .col_expr(
                automation_tasks::Column::UpdatedAt,
                sea_orm::sea_query::Expr::value(now),
            )
            .exec(&self.conn)
            .await
            .context("Failed to finish automation task")?;

        Ok(update.rows_affected > 0)
    }
}
