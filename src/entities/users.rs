use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "users")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    #[sea_orm(unique)]
    pub username: String,

    /// Argon2id password hash
    pub password_hash: String,

    pub is_active: bool,

    pub is_admin: bool,

    pub created_at: String,

    pub updated_at: String,

    pub last_login_at: Option<String>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::automation_tasks::Entity")]
    AutomationTasks,
    #[sea_orm(has_one = "super::user_settings::Entity")]
    Settings,
}

impl Related<super::automation_tasks::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::AutomationTasks.def()
    }
}

impl Related<super::user_settings::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Settings.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
