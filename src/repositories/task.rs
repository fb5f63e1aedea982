//! # Task Repository
//!
//! Persistence for queued units of work: insertion, atomic claiming of due
//! rows (including rows whose lease expired), and the terminal/retry
//! transitions applied by the worker.

use chrono::{DateTime, Duration, FixedOffset, Utc};
use sea_orm::prelude::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, DatabaseConnection, DbErr, EntityTrait,
    QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::error::TaskError;
use crate::models::task::{ActiveModel, Column, Entity, Model};
use crate::queue::Task;

pub const STATUS_QUEUED: &str = "queued";
pub const STATUS_RUNNING: &str = "running";
pub const STATUS_SUCCEEDED: &str = "succeeded";
pub const STATUS_FAILED: &str = "failed";

/// Repository for task rows
pub struct TaskRepository;

impl TaskRepository {
    /// Insert a queued task that is due immediately.
    ///
    /// Generic over the connection so callers can enqueue inside their own
    /// transaction.
    pub async fn insert<C: ConnectionTrait>(conn: &C, task: &Task) -> Result<Model, TaskError> {
        let now = Utc::now().fixed_offset();
        let payload = serde_json::to_value(task)?;

        let row = ActiveModel {
            id: Set(Uuid::new_v4()),
            kind: Set(task.kind().to_string()),
            payload: Set(payload),
            status: Set(STATUS_QUEUED.to_string()),
            attempts: Set(0),
            scheduled_at: Set(now),
            retry_after: Set(None),
            started_at: Set(None),
            finished_at: Set(None),
            error: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        };

        Ok(row.insert(conn).await?)
    }

    /// Atomically move up to `limit` due tasks of the given kinds to `running`.
    ///
    /// A task left `running` for longer than `lease` belonged to a worker that
    /// crashed or was restarted mid-unit; it is claimed again. Returns only the
    /// rows this call transitioned.
    pub async fn claim_due(
        db: &DatabaseConnection,
        kinds: &[&str],
        limit: u64,
        lease: Duration,
    ) -> Result<Vec<Model>, DbErr> {
        let now = Utc::now().fixed_offset();
        let lease_expired_before = now - lease;
        let claimable = || {
            Condition::any()
                .add(
                    Column::Status
                        .eq(STATUS_QUEUED)
                        .and(Column::ScheduledAt.lte(now))
                        .and(
                            Column::RetryAfter
                                .is_null()
                                .or(Column::RetryAfter.lte(now)),
                        ),
                )
                .add(
                    Column::Status
                        .eq(STATUS_RUNNING)
                        .and(Column::StartedAt.lt(lease_expired_before)),
                )
        };

        let txn = db.begin().await?;

        let eligible = Entity::find()
            .select_only()
            .column(Column::Id)
            .column(Column::Status)
            .filter(Column::Kind.is_in(kinds.iter().copied()))
            .filter(claimable())
            .order_by_asc(Column::ScheduledAt)
            .order_by_asc(Column::CreatedAt)
            .limit(Some(limit))
            .into_tuple::<(Uuid, String)>()
            .all(&txn)
            .await?;

        if eligible.is_empty() {
            txn.commit().await?;
            return Ok(Vec::new());
        }

        let expired = eligible
            .iter()
            .filter(|(_, status)| status == STATUS_RUNNING)
            .count();
        if expired > 0 {
            tracing::warn!(expired, "Reclaiming tasks whose lease expired");
        }
        let ids: Vec<Uuid> = eligible.into_iter().map(|(id, _)| id).collect();

        let update = Entity::update_many()
            .col_expr(Column::Status, Expr::value(STATUS_RUNNING))
            .col_expr(Column::StartedAt, Expr::value(now))
            .col_expr(Column::UpdatedAt, Expr::value(now))
            .col_expr(Column::Attempts, Expr::col(Column::Attempts).add(1))
            .filter(Column::Id.is_in(ids.clone()))
            .filter(claimable()) // not claimed meanwhile
            .exec(&txn)
            .await?;

        let claimed = if update.rows_affected > 0 {
            Entity::find()
                .filter(Column::Id.is_in(ids))
                .filter(Column::Status.eq(STATUS_RUNNING))
                .filter(Column::StartedAt.eq(now))
                .order_by_asc(Column::ScheduledAt)
                .all(&txn)
                .await?
        } else {
            Vec::new()
        };

        txn.commit().await?;
        Ok(claimed)
    }

    pub async fn mark_succeeded(db: &DatabaseConnection, task: &Model) -> Result<(), DbErr> {
        let now = Utc::now().fixed_offset();
        let mut active: ActiveModel = task.clone().into();
        active.status = Set(STATUS_SUCCEEDED.to_string());
        active.finished_at = Set(Some(now));
        active.retry_after = Set(None);
        active.updated_at = Set(now);
        active.update(db).await?;
        Ok(())
    }

    /// Terminal failure; the task is never retried.
    pub async fn mark_failed(
        db: &DatabaseConnection,
        task: &Model,
        error: JsonValue,
    ) -> Result<(), DbErr> {
        let now = Utc::now().fixed_offset();
        let mut active: ActiveModel = task.clone().into();
        active.status = Set(STATUS_FAILED.to_string());
        active.finished_at = Set(Some(now));
        active.error = Set(Some(error));
        active.updated_at = Set(now);
        active.update(db).await?;
        Ok(())
    }

    /// Put a failed task back in the queue, eligible again at `retry_after`.
    pub async fn requeue(
        db: &DatabaseConnection,
        task: &Model,
        retry_after: DateTime<FixedOffset>,
        error: JsonValue,
    ) -> Result<(), DbErr> {
        let now = Utc::now().fixed_offset();
        let mut active: ActiveModel = task.clone().into();
        active.status = Set(STATUS_QUEUED.to_string());
        active.retry_after = Set(Some(retry_after));
        active.error = Set(Some(error));
        active.updated_at = Set(now);
        active.update(db).await?;
        Ok(())
    }

    /// Tasks of one kind in insertion order.
    pub async fn list_by_kind(db: &DatabaseConnection, kind: &str) -> Result<Vec<Model>, DbErr> {
        Entity::find()
            .filter(Column::Kind.eq(kind))
            .order_by_asc(Column::CreatedAt)
            .all(db)
            .await
    }
}
