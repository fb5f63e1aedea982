//! # Group Rehash
//!
//! Recomputes the grouping of every event owned by a group. The group's hash
//! index entries are dropped first so that no event can be assigned back to
//! it; events are then replayed through the [`GroupingEngine`] in batches.
//! Once a pass finds no events left, the stale group is handed to the
//! [`DeletionPipeline`].
//!
//! Hash entries are removed before any event moves. Events ingested for the
//! old signature in that window create a fresh group instead of joining the
//! stale one.

use std::collections::HashMap;
use std::sync::Arc;

use metrics::counter;
use sea_orm::{DatabaseConnection, DbErr, EntityTrait};

use crate::audit::{AuditEntry, AuditSink};
use crate::deletion::DeletionPipeline;
use crate::error::TaskError;
use crate::grouping::{GroupDefaults, GroupingEngine, event_fingerprint, generate_culprit};
use crate::models::{event, group, project};
use crate::queue::{RehashGroupTask, Task, TaskQueue};
use crate::repositories::{
    EnvironmentRepository, EventRepository, GroupHashRepository, GroupRepository, TagRepository,
};

/// How a rehash unit ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RehashOutcome {
    GroupNotFound,
    /// A batch of events was regrouped and a continuation was submitted.
    Rescheduled { processed: usize },
    /// No events remain; `enqueued` is false when an earlier delivery
    /// already handed the group off.
    Retired { enqueued: bool },
}

impl RehashOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            RehashOutcome::GroupNotFound => "group_not_found",
            RehashOutcome::Rescheduled { .. } => "rescheduled",
            RehashOutcome::Retired { .. } => "retired",
        }
    }
}

/// Executes rehash units.
#[derive(Clone)]
pub struct RehashCoordinator {
    db: DatabaseConnection,
    queue: Arc<dyn TaskQueue>,
    grouping: Arc<dyn GroupingEngine>,
    deletion: Arc<dyn DeletionPipeline>,
    audit: Arc<dyn AuditSink>,
    batch_size: u64,
}

impl RehashCoordinator {
    pub fn new(
        db: DatabaseConnection,
        queue: Arc<dyn TaskQueue>,
        grouping: Arc<dyn GroupingEngine>,
        deletion: Arc<dyn DeletionPipeline>,
        audit: Arc<dyn AuditSink>,
        batch_size: u64,
    ) -> Self {
        Self {
            db,
            queue,
            grouping,
            deletion,
            audit,
            batch_size,
        }
    }

    /// Run one rehash unit.
    pub async fn run(&self, task: RehashGroupTask) -> Result<RehashOutcome, TaskError> {
        let Some(group) = GroupRepository::find(&self.db, task.group_id).await? else {
            tracing::error!(old_object_id = task.group_id, "group.malformed.invalid_id");
            return Ok(RehashOutcome::GroupNotFound);
        };

        let removed = GroupHashRepository::delete_for_group(&self.db, group.id).await?;
        if removed > 0 {
            tracing::debug!(group_id = group.id, removed, "Dropped hash index entries");
        }

        let events = EventRepository::list_for_group(&self.db, group.id, self.batch_size).await?;

        if events.is_empty() {
            let enqueued = self.deletion.enqueue_delete(group.id).await?;
            if enqueued {
                self.audit.record(AuditEntry::bulk_deleted(
                    group.id,
                    task.transaction_token.as_deref(),
                    "GroupHash",
                ));
                counter!("regroup_rehash_retired_total").increment(1);
                tracing::info!(group_id = group.id, "Rehash finished; group retired");
            }
            return Ok(RehashOutcome::Retired { enqueued });
        }

        let processed = events.len();
        let mut regrouper = BatchRegrouper::new(self, &group);
        for event in events {
            regrouper.regroup(event).await?;
        }

        self.queue.submit(Task::RehashGroupEvents(task)).await?;
        counter!("regroup_rehash_rescheduled_total").increment(1);
        tracing::debug!(group_id = group.id, processed, "Rehash batch done");

        Ok(RehashOutcome::Rescheduled { processed })
    }
}

/// State shared by the events of one batch.
struct BatchRegrouper<'a> {
    coordinator: &'a RehashCoordinator,
    group: &'a group::Model,
    project: Option<project::Model>,
    /// Environment ids by name, filled lazily.
    environments: HashMap<String, i64>,
}

impl<'a> BatchRegrouper<'a> {
    fn new(coordinator: &'a RehashCoordinator, group: &'a group::Model) -> Self {
        Self {
            coordinator,
            group,
            project: None,
            environments: HashMap::new(),
        }
    }

    async fn regroup(&mut self, event: event::Model) -> Result<(), TaskError> {
        let grouping = self.coordinator.grouping.as_ref();
        let db = &self.coordinator.db;

        let fingerprint = event_fingerprint(event.data.as_ref());
        let hashes: Vec<String> = grouping
            .hashes_from_fingerprint(&event, &fingerprint)
            .iter()
            .map(|hash| grouping.normalize_hash(hash))
            .collect();

        let defaults = GroupDefaults {
            message: event.message.clone(),
            platform: event.platform.clone(),
            culprit: generate_culprit(event.data.as_ref()),
            logger: event
                .get_tag("logger")
                .unwrap_or_else(|| self.group.logger.clone()),
            level: self.group.level.clone(),
            first_seen: event.datetime,
            last_seen: event.datetime,
            data: self.group.data.clone(),
        };

        let assignment = grouping
            .assign_event_to_group(&event, &hashes, defaults)
            .await?;
        EventRepository::set_group(db, event.id, assignment.group.id).await?;

        let tags = event.tags();
        if tags.is_empty() {
            return Ok(());
        }

        let environment_name = event.get_tag("environment").unwrap_or_default();
        let environment_id = self.environment_id(&environment_name).await?;
        TagRepository::add_tags(db, &assignment.group, environment_id, &tags, event.datetime)
            .await?;

        Ok(())
    }

    async fn environment_id(&mut self, name: &str) -> Result<i64, TaskError> {
        if let Some(id) = self.environments.get(name) {
            return Ok(*id);
        }

        let db = &self.coordinator.db;
        let project = match &self.project {
            Some(project) => project.clone(),
            None => {
                let project = project::Entity::find_by_id(self.group.project_id)
                    .one(db)
                    .await?
                    .ok_or_else(|| {
                        DbErr::RecordNotFound(format!("project {}", self.group.project_id))
                    })?;
                self.project = Some(project.clone());
                project
            }
        };

        let environment =
            match EnvironmentRepository::get_for_organization(db, project.organization_id, name)
                .await?
            {
                Some(environment) => environment,
                None => {
                    tracing::warn!(
                        project_id = project.id,
                        environment = name,
                        "event.environment.does_not_exist"
                    );
                    EnvironmentRepository::get_or_create(db, &project, name).await?
                }
            };

        self.environments.insert(name.to_string(), environment.id);
        Ok(environment.id)
    }
}
