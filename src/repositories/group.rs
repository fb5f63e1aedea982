//! # Group Repository
//!
//! Lookups and status transitions for the groups table, plus the query behind
//! the new-groups listing.

use chrono::{DateTime, Duration, FixedOffset};
use sea_orm::prelude::Expr;
use sea_orm::{
    ColumnTrait, ConnectionTrait, DbErr, EntityTrait, JoinType, QueryFilter, QueryOrder,
    QuerySelect, RelationTrait,
};

use crate::models::group::{self, Column, Entity, Model};
use crate::models::project;

/// Default look-back window of the new-groups listing, in minutes.
pub const DEFAULT_NEW_GROUPS_MINUTES: i64 = 15;
/// Default page size of the new-groups listing.
pub const DEFAULT_NEW_GROUPS_LIMIT: u64 = 10;
/// Hard cap on the page size of the new-groups listing.
pub const MAX_NEW_GROUPS_LIMIT: u64 = 100;
/// Longest look-back window of the new-groups listing (30 days), in minutes.
pub const MAX_NEW_GROUPS_MINUTES: i64 = 30 * 24 * 60;

/// Repository for group database operations
pub struct GroupRepository;

impl GroupRepository {
    pub async fn find<C: ConnectionTrait>(conn: &C, id: i64) -> Result<Option<Model>, DbErr> {
        Entity::find_by_id(id).one(conn).await
    }

    /// Unresolved groups of the team's projects that became active within the
    /// last `minutes`, highest score first, ties broken by newest first_seen.
    pub async fn list_new_for_team<C: ConnectionTrait>(
        conn: &C,
        team_id: i64,
        minutes: i64,
        limit: u64,
        now: DateTime<FixedOffset>,
    ) -> Result<Vec<Model>, DbErr> {
        let cutoff = Duration::try_minutes(minutes)
            .and_then(|window| now.checked_sub_signed(window))
            .ok_or_else(|| {
                DbErr::Custom(format!("look-back window of {minutes} minutes is out of range"))
            })?;

        Entity::find()
            .join(JoinType::InnerJoin, group::Relation::Project.def())
            .filter(project::Column::TeamId.eq(team_id))
            .filter(Column::Status.eq(group::STATUS_UNRESOLVED))
            .filter(Column::ActiveAt.gte(cutoff))
            .order_by_desc(Column::Score)
            .order_by_desc(Column::FirstSeen)
            .limit(limit.min(MAX_NEW_GROUPS_LIMIT))
            .all(conn)
            .await
    }

    /// Move a group to `pending_deletion` unless it already is.
    ///
    /// Returns true only for the call that performed the transition.
    pub async fn mark_pending_deletion<C: ConnectionTrait>(
        conn: &C,
        id: i64,
    ) -> Result<bool, DbErr> {
        let result = Entity::update_many()
            .col_expr(Column::Status, Expr::value(group::STATUS_PENDING_DELETION))
            .filter(Column::Id.eq(id))
            .filter(Column::Status.ne(group::STATUS_PENDING_DELETION))
            .exec(conn)
            .await?;

        Ok(result.rows_affected == 1)
    }
}
