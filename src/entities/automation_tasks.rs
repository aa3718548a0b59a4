use sea_orm::entity::prelude::*;
use serde::Serialize;

/// One proxied panel operation. Status moves pending -> completed | failed,
/// never backwards; `result` is only meaningful once status is terminal.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize)]
#[sea_orm(table_name = "automation_tasks")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,

    pub user_id: i32,

    pub name: String,

    pub target_website: String,

    pub status: String,

    pub result: Option<Json>,

    pub created_at: String,

    pub updated_at: String,

    pub completed_at: Option<String>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::users::Entity",
        from = "Column::UserId",
        to = "super::users::Column::Id"
    )]
    User,
}

impl Related<super::users::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::User.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
