//! # Event Repository

use sea_orm::prelude::Expr;
use sea_orm::{ColumnTrait, ConnectionTrait, DbErr, EntityTrait, QueryFilter, QueryOrder, QuerySelect};

use crate::models::event::{Column, Entity, Model};

/// Repository for stored events
pub struct EventRepository;

impl EventRepository {
    /// Up to `limit` events owned by the group, oldest storage id first.
    pub async fn list_for_group<C: ConnectionTrait>(
        conn: &C,
        group_id: i64,
        limit: u64,
    ) -> Result<Vec<Model>, DbErr> {
        Entity::find()
            .filter(Column::GroupId.eq(group_id))
            .order_by_asc(Column::Id)
            .limit(limit)
            .all(conn)
            .await
    }

    pub async fn set_group<C: ConnectionTrait>(
        conn: &C,
        event_id: i64,
        group_id: i64,
    ) -> Result<(), DbErr> {
        Entity::update_many()
            .col_expr(Column::GroupId, Expr::value(group_id))
            .filter(Column::Id.eq(event_id))
            .exec(conn)
            .await?;
        Ok(())
    }
}
