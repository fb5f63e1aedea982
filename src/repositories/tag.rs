//! # Tag Repository
//!
//! Per-group tag value counters, keyed by (group, environment, key, value).

use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DbErr, EntityTrait, QueryFilter, Set,
};
use sea_orm::prelude::DateTimeWithTimeZone;

use crate::error::is_unique_violation;
use crate::models::group;
use crate::models::group_tag_value::{ActiveModel, Column, Entity, Model};

/// Repository for group tag values
pub struct TagRepository;

impl TagRepository {
    /// Record one sighting of each `(key, value)` pair on `group` under
    /// `environment_id`, creating rows as needed.
    pub async fn add_tags<C: ConnectionTrait>(
        conn: &C,
        group: &group::Model,
        environment_id: i64,
        tags: &[(String, String)],
        seen_at: DateTimeWithTimeZone,
    ) -> Result<(), DbErr> {
        for (key, value) in tags {
            if let Some(existing) =
                Self::find(conn, group.id, environment_id, key, value).await?
            {
                Self::record_sighting(conn, existing, 1, seen_at, seen_at).await?;
                continue;
            }

            let inserted = ActiveModel {
                project_id: Set(group.project_id),
                group_id: Set(group.id),
                environment_id: Set(environment_id),
                key: Set(key.clone()),
                value: Set(value.clone()),
                times_seen: Set(1),
                first_seen: Set(seen_at),
                last_seen: Set(seen_at),
                ..Default::default()
            }
            .insert(conn)
            .await;

            match inserted {
                Ok(_) => {}
                Err(err) if is_unique_violation(&err) => {
                    // Lost an insert race; count against the winner's row.
                    let existing = Self::find(conn, group.id, environment_id, key, value)
                        .await?
                        .ok_or(err)?;
                    Self::record_sighting(conn, existing, 1, seen_at, seen_at).await?;
                }
                Err(err) => return Err(err),
            }
        }

        Ok(())
    }

    /// Fold the counters of `source` into the row with the same environment,
    /// key and value on `destination_group_id`. Returns false when no such row
    /// exists.
    pub async fn fold_into<C: ConnectionTrait>(
        conn: &C,
        source: &Model,
        destination_group_id: i64,
    ) -> Result<bool, DbErr> {
        let Some(destination) = Self::find(
            conn,
            destination_group_id,
            source.environment_id,
            &source.key,
            &source.value,
        )
        .await?
        else {
            return Ok(false);
        };

        Self::record_sighting(
            conn,
            destination,
            source.times_seen,
            source.first_seen,
            source.last_seen,
        )
        .await?;
        Ok(true)
    }

    pub async fn list_for_group<C: ConnectionTrait>(
        conn: &C,
        group_id: i64,
    ) -> Result<Vec<Model>, DbErr> {
        Entity::find()
            .filter(Column::GroupId.eq(group_id))
            .all(conn)
            .await
    }

    async fn find<C: ConnectionTrait>(
        conn: &C,
        group_id: i64,
        environment_id: i64,
        key: &str,
        value: &str,
    ) -> Result<Option<Model>, DbErr> {
        Entity::find()
            .filter(Column::GroupId.eq(group_id))
            .filter(Column::EnvironmentId.eq(environment_id))
            .filter(Column::Key.eq(key))
            .filter(Column::Value.eq(value))
            .one(conn)
            .await
    }

    async fn record_sighting<C: ConnectionTrait>(
        conn: &C,
        row: Model,
        count: i32,
        first_seen: DateTimeWithTimeZone,
        last_seen: DateTimeWithTimeZone,
    ) -> Result<(), DbErr> {
        let times_seen = match row.times_seen.checked_add(count) {
            Some(total) => total,
            None => {
                tracing::warn!(tag_value_id = row.id, "Tag value counter overflow; keeping prior count");
                row.times_seen
            }
        };
        let merged_first = row.first_seen.min(first_seen);
        let merged_last = row.last_seen.max(last_seen);

        let mut active: ActiveModel = row.into();
        active.times_seen = Set(times_seen);
        active.first_seen = Set(merged_first);
        active.last_seen = Set(merged_last);
        active.update(conn).await?;
        Ok(())
    }
}
