//! Activity entity model
//!
//! Audit-style history entries attached to a group (notes, status changes,
//! assignments). No uniqueness constraint, so merges always move them.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde_json::Value as JsonValue;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "activities")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub project_id: i64,
    pub group_id: i64,
    /// Activity type (e.g., note, set_resolved, assigned)
    pub kind: String,
    pub ident: Option<String>,
    pub user_id: Option<i64>,
    #[sea_orm(column_type = "JsonBinary")]
    pub data: Option<JsonValue>,
    pub datetime: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
