use anyhow::Result;
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, Statement};
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::entities::automation_tasks;

pub mod migrator;
pub mod repositories;

pub use repositories::settings::PanelSettings;
pub use repositories::task::TaskStatus;
pub use repositories::user::User;

#[derive(Clone)]
pub struct Store {
    pub conn: DatabaseConnection,
}

impl Store {
    pub async fn new(db_url: &str) -> Result<Self> {
        Self::with_pool_options(db_url, 5, 1).await
    }

    pub async fn with_pool_options(
        db_url: &str,
        max_connections: u32,
        min_connections: u32,
    ) -> Result<Self> {
        use sea_orm_migration::MigratorTrait;

        if !db_url.contains(":memory:") {
            let path_str = db_url.trim_start_matches("sqlite:");
            if let Some(parent) = Path::new(path_str).parent() {
                tokio::fs::create_dir_all(parent).await.ok();
            }
            if !Path::new(path_str).exists() {
                std::fs::File::create(path_str)?;
            }
        }

        let mut opt = ConnectOptions::new(db_url.to_string());
        opt.max_connections(max_connections)
            .min_connections(min_connections)
            .connect_timeout(Duration::from_secs(10))
            .acquire_timeout(Duration::from_secs(10))
            .idle_timeout(Duration::from_secs(300))
            .max_lifetime(Duration::from_secs(600))
            .sqlx_logging(false);

        let conn = Database::connect(opt).await?;

        migrator::Migrator::up(&conn, None).await?;

        info!(
            "Database connected & migrations applied (pool: {}-{})",
            min_connections, max_connections
        );

        Ok(Self { conn })
    }

    pub async fn ping(&self) -> Result<()> {
        let backend = self.conn.get_database_backend();
        self.conn
            .query_one(Statement::from_string(backend, "SELECT 1".to_string()))
            .await?;
        Ok(())
    }

    fn user_repo(&self) -> repositories::user::UserRepository {
        repositories::user::UserRepository::new(self.conn.clone())
    }

    fn settings_repo(&self) -> repositories::settings::SettingsRepository {
        repositories::settings::SettingsRepository::new(self.conn.clone())
    }

    fn task_repo(&self) -> repositories::task::TaskRepository {
        repositories::task::TaskRepository::new(self.conn.clone())
    }

    // ========== User Repository Methods ==========

    pub async fn get_user_by_username(&self, username: &str) -> Result<Option<User>> {
        self.user_repo().get_by_username(username).await
    }

    pub async fn get_user_by_id(&self, id: i32) -> Result<Option<User>> {
        self.user_repo().get_by_id(id).await
    }

    pub async fn list_users(&self) -> Result<Vec<User>> {
        self.user_repo().list().await
    }

    pub async fn create_user(
        &self,
        username: &str,
        password: &str,
        is_admin: bool,
    ) -> Result<User> {
        self.user_repo().create(username, password, is_admin).await
    }

    pub async fn update_user(
        &self,
        id: i32,
        password: Option<&str>,
        is_admin: bool,
        is_active: bool,
    ) -> Result<Option<User>> {
        self.user_repo()
            .update(id, password, is_admin, is_active)
            .await
    }

    pub async fn delete_user(&self, id: i32) -> Result<bool> {
        self.user_repo().delete(id).await
    }

    pub async fn verify_user_password(&self, username: &str, password: &str) -> Result<bool> {
        self.user_repo().verify_password(username, password).await
    }

    pub async fn record_user_login(&self, username: &str) -> Result<()> {
        self.user_repo().record_login(username).await
    }

    // ========== Settings Repository Methods ==========

    pub async fn get_panel_settings(&self, user_id: i32) -> Result<Option<PanelSettings>> {
        self.settings_repo().get_for_user(user_id).await
    }

    pub async fn save_panel_settings(&self, user_id: i32, settings: &PanelSettings) -> Result<()> {
        self.settings_repo().upsert_for_user(user_id, settings).await
    }

    // ========== Task Repository Methods ==========

    pub async fn create_task(
        &self,
        user_id: i32,
        name: &str,
        target_website: &str,
    ) -> Result<automation_tasks::Model> {
        self.task_repo().create(user_id, name, target_website).await
    }

    pub async fn list_tasks(&self, user_id: i32) -> Result<Vec<automation_tasks::Model>> {
        self.task_repo().list_for_user(user_id).await
    }

    pub async fn get_task(
        &self,
        task_id: i32,
        user_id: i32,
    ) -> Result<Option<automation_tasks::Model>> {
        self.task_repo().get_for_user(task_id, user_id).await
    }

    pub async fn finish_task(
        &self,
        task_id: i32,
        status: TaskStatus,
        result: serde_json::Value,
    ) -> Result<bool> {
        self.task_repo().finish(task_id, status, result).await
    }
}
