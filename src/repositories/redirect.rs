//! # Redirect Repository
//!
//! Append-only mapping from the id of a group that no longer exists to the
//! group that absorbed it.

use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DbErr, EntityTrait, QueryFilter, Set,
    TransactionTrait,
};

use crate::error::is_unique_violation;
use crate::models::group;
use crate::models::group_redirect::{ActiveModel, Column, Entity};

/// Repository for group redirects
pub struct RedirectRepository;

impl RedirectRepository {
    /// Insert `previous_group_id -> group_id` unless a redirect for
    /// `previous_group_id` already exists.
    ///
    /// Runs in its own transaction (a savepoint when `conn` is already a
    /// transaction) so a duplicate never poisons the caller. An existing row
    /// is left untouched. Returns whether a row was inserted.
    pub async fn insert_if_absent<C>(
        conn: &C,
        previous_group_id: i64,
        group_id: i64,
    ) -> Result<bool, DbErr>
    where
        C: TransactionTrait,
    {
        let txn = conn.begin().await?;
        let redirect = ActiveModel {
            previous_group_id: Set(previous_group_id),
            group_id: Set(group_id),
            ..Default::default()
        };

        match redirect.insert(&txn).await {
            Ok(_) => {
                txn.commit().await?;
                Ok(true)
            }
            Err(err) if is_unique_violation(&err) => {
                txn.rollback().await?;
                tracing::debug!(previous_group_id, group_id, "Redirect already present");
                Ok(false)
            }
            Err(err) => Err(err),
        }
    }

    /// Group a previous id currently redirects to, if any.
    pub async fn find_target<C: ConnectionTrait>(
        conn: &C,
        previous_group_id: i64,
    ) -> Result<Option<i64>, DbErr> {
        Ok(Entity::find()
            .filter(Column::PreviousGroupId.eq(previous_group_id))
            .one(conn)
            .await?
            .map(|redirect| redirect.group_id))
    }

    /// Resolve a possibly merged group id to the id of a live group.
    pub async fn resolve<C: ConnectionTrait>(conn: &C, id: i64) -> Result<Option<i64>, DbErr> {
        if group::Entity::find_by_id(id).one(conn).await?.is_some() {
            return Ok(Some(id));
        }
        Self::find_target(conn, id).await
    }
}
