//! Test utilities for database testing.
//!
//! In-memory SQLite with migrations applied, fixture builders for the group
//! model, and a harness wiring the coordinators to recording collaborators.

use std::sync::Arc;

use anyhow::Result;
use chrono::{TimeZone, Utc};
use migration::{Migrator, MigratorTrait};
use regroup::audit::MemoryAuditSink;
use regroup::deletion::RecordingDeletionPipeline;
use regroup::features::InMemoryFeatureIndex;
use regroup::grouping::DefaultGroupingEngine;
use regroup::merge::{MergeCoordinator, MergeOutcome};
use regroup::models::{
    environment, environment_project, event, group, group_assignee, group_tag_value, project,
    team,
};
use regroup::queue::{MergeGroupTask, MemoryTaskQueue, Task};
use regroup::rehash::{RehashCoordinator, RehashOutcome};
use regroup::tsdb::InMemoryTimeSeriesStore;
use sea_orm::prelude::DateTimeWithTimeZone;
use sea_orm::{ActiveModelTrait, ConnectionTrait, Database, DatabaseConnection, Set, Statement};
use serde_json::Value as JsonValue;

/// Sets up an in-memory SQLite database with all migrations applied.
pub async fn setup_test_db() -> Result<DatabaseConnection> {
    let db = Database::connect("sqlite::memory:").await?;

    Migrator::up(&db, None).await?;

    // Fixtures reference rows that tests do not always create.
    db.execute(Statement::from_string(
        db.get_database_backend(),
        "PRAGMA foreign_keys = OFF".to_string(),
    ))
    .await?;

    Ok(db)
}

/// Midnight UTC on the given day of January 2024.
#[allow(dead_code)]
pub fn jan(day: u32) -> DateTimeWithTimeZone {
    Utc.with_ymd_and_hms(2024, 1, day, 0, 0, 0)
        .unwrap()
        .fixed_offset()
}

#[allow(dead_code)]
pub async fn create_team(db: &DatabaseConnection, organization_id: i64) -> Result<team::Model> {
    Ok(team::ActiveModel {
        organization_id: Set(organization_id),
        slug: Set("core".to_string()),
        name: Set("Core".to_string()),
        created_at: Set(Utc::now().fixed_offset()),
        ..Default::default()
    }
    .insert(db)
    .await?)
}

#[allow(dead_code)]
pub async fn create_project(db: &DatabaseConnection, team: &team::Model) -> Result<project::Model> {
    Ok(project::ActiveModel {
        organization_id: Set(team.organization_id),
        team_id: Set(team.id),
        slug: Set(format!("project-{}", uuid::Uuid::new_v4())),
        name: Set("Checkout".to_string()),
        created_at: Set(Utc::now().fixed_offset()),
        ..Default::default()
    }
    .insert(db)
    .await?)
}

/// Team and project in organization 1.
#[allow(dead_code)]
pub async fn create_default_project(db: &DatabaseConnection) -> Result<project::Model> {
    let team = create_team(db, 1).await?;
    create_project(db, &team).await
}

/// Scalar state of a fixture group.
#[derive(Debug, Clone)]
#[allow(dead_code)]
pub struct GroupSeed {
    pub first_seen: DateTimeWithTimeZone,
    pub last_seen: DateTimeWithTimeZone,
    pub times_seen: i32,
    pub num_comments: i32,
    pub status: &'static str,
    pub active_at: Option<DateTimeWithTimeZone>,
    pub score: i64,
}

impl Default for GroupSeed {
    fn default() -> Self {
        Self {
            first_seen: jan(1),
            last_seen: jan(1),
            times_seen: 1,
            num_comments: 0,
            status: group::STATUS_UNRESOLVED,
            active_at: None,
            score: 0,
        }
    }
}

#[allow(dead_code)]
pub async fn create_group(
    db: &DatabaseConnection,
    project: &project::Model,
    seed: GroupSeed,
) -> Result<group::Model> {
    Ok(group::ActiveModel {
        project_id: Set(project.id),
        status: Set(seed.status.to_string()),
        message: Set("TypeError: x is undefined".to_string()),
        culprit: Set(None),
        logger: Set("root".to_string()),
        level: Set("error".to_string()),
        platform: Set(Some("javascript".to_string())),
        first_seen: Set(seed.first_seen),
        last_seen: Set(seed.last_seen),
        active_at: Set(seed.active_at.or(Some(seed.first_seen))),
        times_seen: Set(seed.times_seen),
        num_comments: Set(seed.num_comments),
        score: Set(seed.score),
        data: Set(Some(serde_json::json!({"type": "error"}))),
        ..Default::default()
    }
    .insert(db)
    .await?)
}

#[allow(dead_code)]
pub async fn create_event(
    db: &DatabaseConnection,
    group: &group::Model,
    message: &str,
    data: Option<JsonValue>,
) -> Result<event::Model> {
    Ok(event::ActiveModel {
        project_id: Set(group.project_id),
        group_id: Set(group.id),
        event_id: Set(uuid::Uuid::new_v4().simple().to_string()),
        message: Set(message.to_string()),
        platform: Set(group.platform.clone()),
        datetime: Set(group.last_seen),
        data: Set(data),
        ..Default::default()
    }
    .insert(db)
    .await?)
}

#[allow(dead_code)]
pub async fn create_environment(
    db: &DatabaseConnection,
    project: &project::Model,
    name: &str,
) -> Result<environment::Model> {
    let environment = environment::ActiveModel {
        organization_id: Set(project.organization_id),
        name: Set(name.to_string()),
        created_at: Set(Utc::now().fixed_offset()),
        ..Default::default()
    }
    .insert(db)
    .await?;

    environment_project::ActiveModel {
        environment_id: Set(environment.id),
        project_id: Set(project.id),
        ..Default::default()
    }
    .insert(db)
    .await?;

    Ok(environment)
}

#[allow(dead_code)]
pub async fn create_tag_value(
    db: &DatabaseConnection,
    group: &group::Model,
    environment_id: i64,
    key: &str,
    value: &str,
    times_seen: i32,
) -> Result<group_tag_value::Model> {
    Ok(group_tag_value::ActiveModel {
        project_id: Set(group.project_id),
        group_id: Set(group.id),
        environment_id: Set(environment_id),
        key: Set(key.to_string()),
        value: Set(value.to_string()),
        times_seen: Set(times_seen),
        first_seen: Set(group.first_seen),
        last_seen: Set(group.last_seen),
        ..Default::default()
    }
    .insert(db)
    .await?)
}

#[allow(dead_code)]
pub async fn create_assignee(
    db: &DatabaseConnection,
    group: &group::Model,
    user_id: i64,
) -> Result<group_assignee::Model> {
    Ok(group_assignee::ActiveModel {
        project_id: Set(group.project_id),
        group_id: Set(group.id),
        user_id: Set(user_id),
        date_added: Set(Utc::now().fixed_offset()),
        ..Default::default()
    }
    .insert(db)
    .await?)
}

/// Coordinators wired to in-memory collaborators that tests can inspect.
#[allow(dead_code)]
pub struct Harness {
    pub db: DatabaseConnection,
    pub queue: Arc<MemoryTaskQueue>,
    pub audit: Arc<MemoryAuditSink>,
    pub tsdb: Arc<InMemoryTimeSeriesStore>,
    pub features: Arc<InMemoryFeatureIndex>,
    pub deletion: Arc<RecordingDeletionPipeline>,
}

#[allow(dead_code)]
impl Harness {
    pub fn new(db: DatabaseConnection) -> Self {
        Self {
            db,
            queue: Arc::new(MemoryTaskQueue::new()),
            audit: Arc::new(MemoryAuditSink::new()),
            tsdb: Arc::new(InMemoryTimeSeriesStore::new()),
            features: Arc::new(InMemoryFeatureIndex::new()),
            deletion: Arc::new(RecordingDeletionPipeline::new()),
        }
    }

    pub fn merge_coordinator(&self, batch_limit: u64) -> MergeCoordinator {
        MergeCoordinator::new(
            self.db.clone(),
            self.queue.clone(),
            self.tsdb.clone(),
            self.features.clone(),
            self.audit.clone(),
            batch_limit,
        )
    }

    pub fn rehash_coordinator(&self, batch_size: u64) -> RehashCoordinator {
        RehashCoordinator::new(
            self.db.clone(),
            self.queue.clone(),
            Arc::new(DefaultGroupingEngine::new(self.db.clone())),
            self.deletion.clone(),
            self.audit.clone(),
            batch_size,
        )
    }

    /// Run `task` and every continuation it submits; returns each unit's
    /// outcome in order.
    pub async fn drive_merge(
        &self,
        coordinator: &MergeCoordinator,
        task: MergeGroupTask,
    ) -> Result<Vec<MergeOutcome>> {
        let mut outcomes = vec![coordinator.run(task).await?];
        while let Some(next) = self.queue.pop() {
            match next {
                Task::MergeGroup(merge) => outcomes.push(coordinator.run(merge).await?),
                other => anyhow::bail!("unexpected task {:?}", other),
            }
        }
        Ok(outcomes)
    }

    pub async fn drive_rehash(
        &self,
        coordinator: &RehashCoordinator,
        group_id: i64,
    ) -> Result<Vec<RehashOutcome>> {
        let mut outcomes = vec![
            coordinator
                .run(regroup::queue::RehashGroupTask {
                    group_id,
                    transaction_token: Some("rehash-tx".to_string()),
                })
                .await?,
        ];
        while let Some(next) = self.queue.pop() {
            match next {
                Task::RehashGroupEvents(rehash) => outcomes.push(coordinator.run(rehash).await?),
                other => anyhow::bail!("unexpected task {:?}", other),
            }
        }
        Ok(outcomes)
    }
}
