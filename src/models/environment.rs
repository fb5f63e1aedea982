//! Environment entity model
//!
//! Environments are unique by (organization_id, name). The empty name stands
//! for events that did not declare an environment.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "environments")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub organization_id: i64,
    pub name: String,
    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::environment_project::Entity")]
    EnvironmentProject,
}

impl Related<super::environment_project::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::EnvironmentProject.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
