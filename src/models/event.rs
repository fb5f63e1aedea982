//! Event entity model
//!
//! This module contains the SeaORM entity model for the events table. Each
//! event is owned by exactly one group at any instant; the raw payload in
//! `data` carries the fingerprint, tags and stack information that grouping
//! needs.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde_json::Value as JsonValue;

/// Event entity representing one stored occurrence of an error
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "events")]
pub struct Model {
    /// Storage identifier (primary key, insertion ordered)
    #[sea_orm(primary_key)]
    pub id: i64,

    /// Project that received the event
    pub project_id: i64,

    /// Group that currently owns the event
    pub group_id: i64,

    /// External event identifier reported by the client
    pub event_id: String,

    /// Event message
    pub message: String,

    /// Reporting platform
    pub platform: Option<String>,

    /// Timestamp the event occurred
    pub datetime: DateTimeWithTimeZone,

    /// Raw event payload (fingerprint, tags, exception data)
    #[sea_orm(column_type = "JsonBinary")]
    pub data: Option<JsonValue>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Tags stored on the event as `[[key, value], ...]` pairs.
    ///
    /// Entries that are not two-element string pairs are skipped.
    pub fn tags(&self) -> Vec<(String, String)> {
        let Some(JsonValue::Array(entries)) = self.data.as_ref().and_then(|data| data.get("tags"))
        else {
            return Vec::new();
        };

        entries
            .iter()
            .filter_map(|entry| match entry.as_array().map(Vec::as_slice) {
                Some([JsonValue::String(key), JsonValue::String(value)]) => {
                    Some((key.clone(), value.clone()))
                }
                _ => None,
            })
            .collect()
    }

    /// Value of the first tag named `key`, if any.
    pub fn get_tag(&self, key: &str) -> Option<String> {
        self.tags()
            .into_iter()
            .find(|(tag_key, _)| tag_key == key)
            .map(|(_, value)| value)
    }
}
