//! # Group Hash Repository
//!
//! The (project, hash) -> group index consulted when assigning events.

use sea_orm::sea_query::OnConflict;
use sea_orm::{ColumnTrait, ConnectionTrait, DbErr, EntityTrait, QueryFilter, Set};

use crate::models::group_hash::{ActiveModel, Column, Entity, Model};

/// Repository for group hashes
pub struct GroupHashRepository;

impl GroupHashRepository {
    /// Remove every hash pointing at the group. Returns the number removed.
    pub async fn delete_for_group<C: ConnectionTrait>(
        conn: &C,
        group_id: i64,
    ) -> Result<u64, DbErr> {
        let result = Entity::delete_many()
            .filter(Column::GroupId.eq(group_id))
            .exec(conn)
            .await?;
        Ok(result.rows_affected)
    }

    /// Existing entries for any of `hashes` within the project.
    pub async fn find_existing<C: ConnectionTrait>(
        conn: &C,
        project_id: i64,
        hashes: &[String],
    ) -> Result<Vec<Model>, DbErr> {
        if hashes.is_empty() {
            return Ok(Vec::new());
        }

        Entity::find()
            .filter(Column::ProjectId.eq(project_id))
            .filter(Column::Hash.is_in(hashes.iter().cloned()))
            .all(conn)
            .await
    }

    /// Point each unclaimed hash at `group_id`. Hashes already claimed by any
    /// group are left alone.
    pub async fn claim<C: ConnectionTrait>(
        conn: &C,
        project_id: i64,
        hashes: &[String],
        group_id: i64,
    ) -> Result<(), DbErr> {
        for hash in hashes {
            Entity::insert(ActiveModel {
                project_id: Set(project_id),
                hash: Set(hash.clone()),
                group_id: Set(group_id),
                ..Default::default()
            })
            .on_conflict(
                OnConflict::columns([Column::ProjectId, Column::Hash])
                    .do_nothing()
                    .to_owned(),
            )
            .exec_without_returning(conn)
            .await?;
        }
        Ok(())
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
}
