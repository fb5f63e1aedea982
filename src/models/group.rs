//! Group entity model
//!
//! This module contains the SeaORM entity model for the groups table. A group
//! aggregates every event that shares a grouping signature, together with the
//! counters and timestamps summarising them.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde_json::Value as JsonValue;

/// Status of a group that still shows up in listings
pub const STATUS_UNRESOLVED: &str = "unresolved";
/// Status of a group that was handed to the deletion pipeline
pub const STATUS_PENDING_DELETION: &str = "pending_deletion";

/// Group entity representing a cluster of events with one error signature
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "groups")]
pub struct Model {
    /// Unique identifier for the group (primary key)
    #[sea_orm(primary_key)]
    pub id: i64,

    /// Owning project
    pub project_id: i64,

    /// Lifecycle status (e.g., unresolved, resolved, ignored, pending_deletion)
    pub status: String,

    /// Message of the event that created the group
    pub message: String,

    /// Location in code the group is attributed to
    pub culprit: Option<String>,

    /// Logger name reported by the events
    pub logger: String,

    /// Severity level (e.g., error, warning)
    pub level: String,

    /// Platform of the events (e.g., python, javascript)
    pub platform: Option<String>,

    /// Timestamp of the earliest event
    pub first_seen: DateTimeWithTimeZone,

    /// Timestamp of the latest event
    pub last_seen: DateTimeWithTimeZone,

    /// Timestamp the group last became active; drives the new-groups listing
    pub active_at: Option<DateTimeWithTimeZone>,

    /// Number of events seen for the group
    pub times_seen: i32,

    /// Number of comments left on the group
    pub num_comments: i32,

    /// Ranking score used by listings
    pub score: i64,

    /// Opaque payload carried over to groups created during a rehash
    #[sea_orm(column_type = "JsonBinary")]
    pub data: Option<JsonValue>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::project::Entity",
        from = "Column::ProjectId",
        to = "super::project::Column::Id"
    )]
    Project,
}

impl Related<super::project::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Project.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

/// Ranking score for a group: logarithmic in volume, linear in recency.
pub fn score_for(times_seen: i32, last_seen: DateTimeWithTimeZone) -> i64 {
    let volume = f64::from(times_seen.max(1)).ln() * 600.0;
    volume as i64 + last_seen.timestamp()
}
