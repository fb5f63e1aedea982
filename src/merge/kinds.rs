//! Related record kinds and the operations the migrator performs on them.

use sea_orm::prelude::Expr;
use sea_orm::{
    ColumnTrait, ConnectionTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter, QueryOrder,
    QuerySelect, TransactionTrait,
};
use serde::{Deserialize, Serialize};

use crate::error::is_unique_violation;
use crate::models::{
    activity, event, event_mapping, group_assignee, group_hash, group_meta, group_redirect,
    group_rule_status, group_subscription, group_tag_value, user_report,
};
use crate::repositories::TagRepository;

/// Every kind of record owned by a group, in the order a merge drains them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelatedKind {
    GroupTagValue,
    Activity,
    GroupAssignee,
    GroupHash,
    GroupRuleStatus,
    GroupSubscription,
    EventMapping,
    Event,
    UserReport,
    GroupRedirect,
    GroupMeta,
}

impl RelatedKind {
    pub const DECLARED_ORDER: [RelatedKind; 11] = [
        RelatedKind::GroupTagValue,
        RelatedKind::Activity,
        RelatedKind::GroupAssignee,
        RelatedKind::GroupHash,
        RelatedKind::GroupRuleStatus,
        RelatedKind::GroupSubscription,
        RelatedKind::EventMapping,
        RelatedKind::Event,
        RelatedKind::UserReport,
        RelatedKind::GroupRedirect,
        RelatedKind::GroupMeta,
    ];

    /// Model name recorded in audit entries.
    pub fn model_name(self) -> &'static str {
        match self {
            RelatedKind::GroupTagValue => "GroupTagValue",
            RelatedKind::Activity => "Activity",
            RelatedKind::GroupAssignee => "GroupAssignee",
            RelatedKind::GroupHash => "GroupHash",
            RelatedKind::GroupRuleStatus => "GroupRuleStatus",
            RelatedKind::GroupSubscription => "GroupSubscription",
            RelatedKind::EventMapping => "EventMapping",
            RelatedKind::Event => "Event",
            RelatedKind::UserReport => "UserReport",
            RelatedKind::GroupRedirect => "GroupRedirect",
            RelatedKind::GroupMeta => "GroupMeta",
        }
    }

    /// Kinds whose counters are folded into the conflicting destination
    /// record before the source record is dropped.
    pub fn has_mergeable_counts(self) -> bool {
        matches!(self, RelatedKind::GroupTagValue)
    }
}

/// Columns the migrator needs from an entity owned by a group.
pub trait RelatedRecord: EntityTrait {
    const KIND: RelatedKind;

    fn id_column() -> Self::Column;

    fn group_column() -> Self::Column;

    /// Present when the table carries a project reference to scope by.
    fn project_column() -> Option<Self::Column>;
}

macro_rules! related_record {
    ($module:ident, $kind:ident, $group:ident, project) => {
        related_record!(@impl $module, $kind, $group, Some($module::Column::ProjectId));
    };
    ($module:ident, $kind:ident, $group:ident) => {
        related_record!(@impl $module, $kind, $group, None);
    };
    (@impl $module:ident, $kind:ident, $group:ident, $project:expr) => {
        impl RelatedRecord for $module::Entity {
            const KIND: RelatedKind = RelatedKind::$kind;

            fn id_column() -> Self::Column {
                $module::Column::Id
            }

            fn group_column() -> Self::Column {
                $module::Column::$group
            }

            fn project_column() -> Option<Self::Column> {
                $project
            }
        }
    };
}

related_record!(group_tag_value, GroupTagValue, GroupId, project);
related_record!(activity, Activity, GroupId, project);
related_record!(group_assignee, GroupAssignee, GroupId, project);
related_record!(group_hash, GroupHash, GroupId, project);
related_record!(group_rule_status, GroupRuleStatus, GroupId, project);
related_record!(group_subscription, GroupSubscription, GroupId, project);
related_record!(event_mapping, EventMapping, GroupId, project);
related_record!(event, Event, GroupId, project);
related_record!(user_report, UserReport, GroupId, project);
related_record!(group_redirect, GroupRedirect, GroupId);
related_record!(group_meta, GroupMeta, GroupId);

/// Run `$body` with `$entity` bound to the entity type of `$kind`.
macro_rules! with_related_entity {
    ($kind:expr, $entity:ident => $body:expr) => {
        match $kind {
            RelatedKind::GroupTagValue => {
                type $entity = group_tag_value::Entity;
                $body
            }
            RelatedKind::Activity => {
                type $entity = activity::Entity;
                $body
            }
            RelatedKind::GroupAssignee => {
                type $entity = group_assignee::Entity;
                $body
            }
            RelatedKind::GroupHash => {
                type $entity = group_hash::Entity;
                $body
            }
            RelatedKind::GroupRuleStatus => {
                type $entity = group_rule_status::Entity;
                $body
            }
            RelatedKind::GroupSubscription => {
                type $entity = group_subscription::Entity;
                $body
            }
            RelatedKind::EventMapping => {
                type $entity = event_mapping::Entity;
                $body
            }
            RelatedKind::Event => {
                type $entity = event::Entity;
                $body
            }
            RelatedKind::UserReport => {
                type $entity = user_report::Entity;
                $body
            }
            RelatedKind::GroupRedirect => {
                type $entity = group_redirect::Entity;
                $body
            }
            RelatedKind::GroupMeta => {
                type $entity = group_meta::Entity;
                $body
            }
        }
    };
}

/// Result of moving one record to the destination group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reassignment {
    /// The record now belongs to the destination.
    Moved,
    /// The record no longer belonged to the source when the update ran.
    Skipped,
    /// The destination already holds an equivalent record.
    Conflict,
}

/// Ids of up to `limit` records of `kind` owned by `group_id`, scoped by
/// project where the kind has one.
pub async fn owned_ids<C: ConnectionTrait>(
    conn: &C,
    kind: RelatedKind,
    group_id: i64,
    project_id: i64,
    limit: u64,
) -> Result<Vec<i64>, DbErr> {
    with_related_entity!(kind, E => owned_ids_of::<E, C>(conn, group_id, project_id, limit).await)
}

/// Move one record from `source_id` to `destination_id` in its own
/// transaction. Uniqueness conflicts are reported, not raised.
pub async fn reassign(
    db: &DatabaseConnection,
    kind: RelatedKind,
    record_id: i64,
    source_id: i64,
    destination_id: i64,
) -> Result<Reassignment, DbErr> {
    with_related_entity!(kind, E => reassign_one::<E>(db, record_id, source_id, destination_id).await)
}

/// Resolve a conflict: fold mergeable counters into the destination's
/// equivalent record, then delete the source record. Both happen in one
/// transaction.
pub async fn absorb_conflict(
    db: &DatabaseConnection,
    kind: RelatedKind,
    record_id: i64,
    destination_id: i64,
) -> Result<(), DbErr> {
    let txn = db.begin().await?;

    if kind.has_mergeable_counts()
        && let Some(source) = group_tag_value::Entity::find_by_id(record_id).one(&txn).await?
        && !TagRepository::fold_into(&txn, &source, destination_id).await?
    {
        tracing::debug!(record_id, destination_id, "No destination tag value to fold into");
    }

    with_related_entity!(kind, E => delete_one::<E, _>(&txn, record_id).await)?;
    txn.commit().await
}

async fn owned_ids_of<E, C>(
    conn: &C,
    group_id: i64,
    project_id: i64,
    limit: u64,
) -> Result<Vec<i64>, DbErr>
where
    E: RelatedRecord,
    C: ConnectionTrait,
{
    let mut query = E::find()
        .select_only()
        .column(E::id_column())
        .filter(E::group_column().eq(group_id));

    if let Some(project_column) = E::project_column() {
        query = query.filter(project_column.eq(project_id));
    }

    query
        .order_by_asc(E::id_column())
        .limit(limit)
        .into_tuple::<i64>()
        .all(conn)
        .await
}

async fn reassign_one<E: RelatedRecord>(
    db: &DatabaseConnection,
    record_id: i64,
    source_id: i64,
    destination_id: i64,
) -> Result<Reassignment, DbErr> {
    let txn = db.begin().await?;

    let result = E::update_many()
        .col_expr(E::group_column(), Expr::value(destination_id))
        .filter(E::id_column().eq(record_id))
        .filter(E::group_column().eq(source_id))
        .exec(&txn)
        .await;

    match result {
        Ok(update) => {
            txn.commit().await?;
            if update.rows_affected == 0 {
                Ok(Reassignment::Skipped)
            } else {
                Ok(Reassignment::Moved)
            }
        }
        Err(err) if is_unique_violation(&err) => {
            txn.rollback().await?;
            Ok(Reassignment::Conflict)
        }
        Err(err) => Err(err),
    }
}

async fn delete_one<E, C>(conn: &C, record_id: i64) -> Result<u64, DbErr>
where
    E: RelatedRecord,
    C: ConnectionTrait,
{
    let result = E::delete_many()
        .filter(E::id_column().eq(record_id))
        .exec(conn)
        .await?;
    Ok(result.rows_affected)
}
