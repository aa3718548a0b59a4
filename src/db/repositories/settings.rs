use anyhow::{Context, Result};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set,
};

use crate::entities::user_settings;

/// Per-user panel connection settings. The timestamps are read-only and
/// ignored on write.
#[derive(Debug, Clone, Default)]
pub struct PanelSettings {
    pub panel_url: String,
    pub api_key: String,
    pub auth_user: String,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
}

impl From<user_settings::Model> for PanelSettings {
    fn from(model: user_settings::Model) -> Self {
        Self {
            panel_url: model.panel_url,
            api_key: model.api_key,
            auth_user: model.auth_user,
            created_at: Some(model.created_at),
            updated_at: Some(model.updated_at),
        }
    }
}

pub struct SettingsRepository {
    conn: DatabaseConnection,
}

impl SettingsRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    pub async fn get_for_user(&self, user_id: i32) -> Result<Option<PanelSettings>> {
        let settings = user_settings::Entity::find()
            .filter(user_settings::Column::UserId.eq(user_id))
            .one(&self.conn)
            .await
            .context("Failed to query user settings")?;

        Ok(settings.map(PanelSettings::from))
    }

    /// Insert or replace the settings row for a user. Each user has at most
    /// one row, enforced by the unique index on `user_id`.
    pub async fn upsert_for_user(&self, user_id: i32, settings: &PanelSettings) -> Result<()> {
        let now = chrono::Utc::now().to_rfc3339();

        let existing = user_settings::Entity::find()
            .filter(user_settings::Column::UserId.eq(user_id))
            .one(&self.conn)
            .await
            .context("Failed to query user settings for upsert")?;

        if let Some(existing) = existing {
            let mut active: user_settings::ActiveModel = existing.into();
            active.panel_url = Set(settings.panel_url.clone());
            active.api_key = Set(settings.api_key.clone());
            active.auth_user = Set(settings.auth_user.clone());
            active.updated_at = Set(now);
            active
                .update(&self.conn)
                .await
                .context("Failed to update user settings")?;
        } else {
            let active = user_settings::ActiveModel {
                user_id: Set(user_id),
                panel_url: Set(settings.panel_url.clone()),
                api_key: Set(settings.api_key.clone()),
                auth_user: Set(settings.auth_user.clone()),
                created_at: Set(now.clone()),
                updated_at: Set(now),
                ..Default::default()
            };
            active
                .insert(&self.conn)
                .await
                .context("Failed to insert user settings")?;
        }

        Ok(())
    }
}
