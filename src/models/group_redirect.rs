//! GroupRedirect entity model
//!
//! Append-only mapping from the id of a merged-away group to the group that
//! absorbed it. `previous_group_id` is unique and never rewritten.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "group_redirects")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Group the previous id now resolves to
    pub group_id: i64,
    /// Id of the group that no longer exists
    pub previous_group_id: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
