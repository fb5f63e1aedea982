//! Task entity model
//!
//! This module contains the SeaORM entity model for the tasks table, which
//! persists units of work (merge passes, rehash batches, deletion requests)
//! until a worker claims them.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde_json::Value as JsonValue;
use uuid::Uuid;

/// Task entity representing one queued unit of work
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "tasks")]
pub struct Model {
    /// Unique identifier for the task (primary key)
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Task kind (merge_group, rehash_group_events, delete_group)
    pub kind: String,

    /// Serialized unit-of-work descriptor
    #[sea_orm(column_type = "JsonBinary")]
    pub payload: JsonValue,

    /// Current status (queued, running, succeeded, failed)
    pub status: String,

    /// Number of attempts made for this task
    pub attempts: i32,

    /// Timestamp when the task becomes eligible to run
    pub scheduled_at: DateTimeWithTimeZone,

    /// Timestamp when the task becomes eligible for retry after backoff
    pub retry_after: Option<DateTimeWithTimeZone>,

    /// Timestamp when the current attempt started
    pub started_at: Option<DateTimeWithTimeZone>,

    /// Timestamp when the task finished
    pub finished_at: Option<DateTimeWithTimeZone>,

    /// Structured error details of the last failed attempt
    #[sea_orm(column_type = "JsonBinary")]
    pub error: Option<JsonValue>,

    pub created_at: DateTimeWithTimeZone,

    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
