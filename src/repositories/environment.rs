//! # Environment Repository
//!
//! Environments are organization-scoped names linked to projects.

use chrono::Utc;
use sea_orm::sea_query::OnConflict;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DbErr, EntityTrait, QueryFilter, QuerySelect,
    Set,
};

use crate::error::is_unique_violation;
use crate::models::environment::{self, Entity, Model};
use crate::models::{environment_project, project};

/// Repository for environment lookups
pub struct EnvironmentRepository;

impl EnvironmentRepository {
    pub async fn get_for_organization<C: ConnectionTrait>(
        conn: &C,
        organization_id: i64,
        name: &str,
    ) -> Result<Option<Model>, DbErr> {
        Entity::find()
            .filter(environment::Column::OrganizationId.eq(organization_id))
            .filter(environment::Column::Name.eq(name))
            .one(conn)
            .await
    }

    /// Fetch or create the named environment and make sure it is linked to
    /// `project`.
    pub async fn get_or_create<C: ConnectionTrait>(
        conn: &C,
        project: &project::Model,
        name: &str,
    ) -> Result<Model, DbErr> {
        let environment =
            match Self::get_for_organization(conn, project.organization_id, name).await? {
                Some(existing) => existing,
                None => {
                    let created = environment::ActiveModel {
                        organization_id: Set(project.organization_id),
                        name: Set(name.to_string()),
                        created_at: Set(Utc::now().fixed_offset()),
                        ..Default::default()
                    }
                    .insert(conn)
                    .await;

                    match created {
                        Ok(model) => model,
                        Err(err) if is_unique_violation(&err) => {
                            Self::get_for_organization(conn, project.organization_id, name)
                                .await?
                                .ok_or(err)?
                        }
                        Err(err) => return Err(err),
                    }
                }
            };

        environment_project::Entity::insert(environment_project::ActiveModel {
            environment_id: Set(environment.id),
            project_id: Set(project.id),
            ..Default::default()
        })
        .on_conflict(
            OnConflict::columns([
                environment_project::Column::ProjectId,
                environment_project::Column::EnvironmentId,
            ])
            .do_nothing()
            .to_owned(),
        )
        .exec_without_returning(conn)
        .await?;

        Ok(environment)
    }

    /// Ids of every environment tied to the project.
    pub async fn ids_for_project<C: ConnectionTrait>(
        conn: &C,
        project_id: i64,
    ) -> Result<Vec<i64>, DbErr> {
        environment_project::Entity::find()
            .select_only()
            .column(environment_project::Column::EnvironmentId)
            .filter(environment_project::Column::ProjectId.eq(project_id))
            .into_tuple::<i64>()
            .all(conn)
            .await
    }
}
