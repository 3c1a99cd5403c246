use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "watch_progress")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub user_id: String,
    pub content_id: String,
    pub unit_id: Option<String>,
    pub position_seconds: i64,
    pub duration_seconds: Option<i64>,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Column {
    /// Resolve a wire column name.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "id" => Some(Column::Id),
            "user_id" => Some(Column::UserId),
            "content_id" => Some(Column::ContentId),
            "unit_id" => Some(Column::UnitId),
            "position_seconds" => Some(Column::PositionSeconds),
            "duration_seconds" => Some(Column::DurationSeconds),
            "updated_at" => Some(Column::UpdatedAt),
            _ => None,
        }
    }
}
