//! # Group Merge
//!
//! A merge moves every record owned by a source group onto a destination
//! group, one bounded batch per unit of work. Each unit either makes progress
//! and resubmits a continuation of itself, or finds nothing left and
//! finalizes: similarity features and time series are folded into the
//! destination, the source row is deleted, a redirect is recorded and the
//! destination's aggregates absorb the source's.
//!
//! Every step tolerates redelivery. A replayed unit for a pair that already
//! finalized finds no source group and ends as a logged no-op.

pub mod kinds;
pub mod migrator;
pub mod reconcile;

use std::sync::Arc;

use metrics::counter;
use sea_orm::{ActiveModelTrait, DatabaseConnection, EntityTrait, Set, TransactionTrait};

pub use kinds::{Reassignment, RelatedKind};
pub use migrator::{MigrationPass, RelatedRecordMigrator};
pub use reconcile::{Reconciliation, reconcile};

use crate::audit::{AuditEntry, AuditSink};
use crate::error::TaskError;
use crate::features::FeatureIndex;
use crate::models::group;
use crate::queue::{MergeGroupTask, Task, TaskQueue};
use crate::repositories::{EnvironmentRepository, GroupRepository, RedirectRepository};
use crate::tsdb::{TimeSeriesStore, TsdbModel};

/// How a merge unit ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeOutcome {
    /// Ids missing or identical; nothing was done.
    Malformed,
    /// Source or destination group does not exist; nothing was done.
    GroupNotFound,
    /// One batch was migrated and a continuation was submitted.
    Rescheduled { kind: RelatedKind, processed: u64 },
    /// The source is gone and the destination holds its aggregates.
    Finalized,
}

impl MergeOutcome {
    /// Metric label for the outcome.
    pub fn label(&self) -> &'static str {
        match self {
            MergeOutcome::Malformed => "malformed",
            MergeOutcome::GroupNotFound => "group_not_found",
            MergeOutcome::Rescheduled { .. } => "rescheduled",
            MergeOutcome::Finalized => "finalized",
        }
    }
}

/// Executes merge units.
#[derive(Clone)]
pub struct MergeCoordinator {
    db: DatabaseConnection,
    queue: Arc<dyn TaskQueue>,
    tsdb: Arc<dyn TimeSeriesStore>,
    features: Arc<dyn FeatureIndex>,
    audit: Arc<dyn AuditSink>,
    batch_limit: u64,
}

impl MergeCoordinator {
    pub fn new(
        db: DatabaseConnection,
        queue: Arc<dyn TaskQueue>,
        tsdb: Arc<dyn TimeSeriesStore>,
        features: Arc<dyn FeatureIndex>,
        audit: Arc<dyn AuditSink>,
        batch_limit: u64,
    ) -> Self {
        Self {
            db,
            queue,
            tsdb,
            features,
            audit,
            batch_limit,
        }
    }

    /// Run one merge unit.
    pub async fn run(&self, task: MergeGroupTask) -> Result<MergeOutcome, TaskError> {
        let (source_id, destination_id) = match (task.source_group_id, task.destination_group_id)
        {
            (Some(source), Some(destination)) if source != destination => (source, destination),
            _ => {
                tracing::error!(
                    old_group_id = ?task.source_group_id,
                    new_group_id = ?task.destination_group_id,
                    "group.malformed.missing_params"
                );
                return Ok(MergeOutcome::Malformed);
            }
        };

        let Some(source) = GroupRepository::find(&self.db, source_id).await? else {
            tracing::error!(old_object_id = source_id, "group.malformed.invalid_id");
            return Ok(MergeOutcome::GroupNotFound);
        };
        if GroupRepository::find(&self.db, destination_id).await?.is_none() {
            tracing::error!(old_object_id = destination_id, "group.malformed.invalid_id");
            return Ok(MergeOutcome::GroupNotFound);
        }

        if !task.resumed {
            tracing::info!(
                new_group_id = destination_id,
                old_group_id = source_id,
                "merge.queued"
            );
        }

        let migrator = RelatedRecordMigrator::new(&self.db, self.audit.as_ref(), self.batch_limit);
        let pass = migrator
            .run_pass(&source, destination_id, task.transaction_token.as_deref())
            .await?;

        if let Some(kind) = pass.kind {
            self.queue
                .submit(Task::MergeGroup(task.continuation()))
                .await?;
            counter!("regroup_merge_rescheduled_total").increment(1);
            return Ok(MergeOutcome::Rescheduled {
                kind,
                processed: pass.total(),
            });
        }

        self.finalize(source, destination_id, task.transaction_token.as_deref())
            .await
    }

    async fn finalize(
        &self,
        source: group::Model,
        destination_id: i64,
        transaction_token: Option<&str>,
    ) -> Result<MergeOutcome, TaskError> {
        self.features.merge(destination_id, &[source.id]).await?;
        self.merge_time_series(&source, destination_id).await?;

        let txn = self.db.begin().await?;

        let deleted = group::Entity::delete_by_id(source.id).exec(&txn).await?;
        if deleted.rows_affected == 0 {
            // Another delivery of this unit finalized first.
            txn.rollback().await?;
            tracing::error!(old_object_id = source.id, "group.malformed.invalid_id");
            return Ok(MergeOutcome::GroupNotFound);
        }

        RedirectRepository::insert_if_absent(&txn, source.id, destination_id).await?;

        let Some(destination) = GroupRepository::find(&txn, destination_id).await? else {
            txn.rollback().await?;
            tracing::error!(old_object_id = destination_id, "group.malformed.invalid_id");
            return Ok(MergeOutcome::GroupNotFound);
        };

        let merged = reconcile(&source, &destination);
        for counter_name in &merged.overflowed {
            tracing::warn!(
                group_id = destination_id,
                counter = *counter_name,
                "Counter overflow while merging; keeping prior value"
            );
            counter!("regroup_counter_overflows_total", "counter" => *counter_name).increment(1);
        }

        let mut active: group::ActiveModel = destination.into();
        active.first_seen = Set(merged.first_seen);
        active.last_seen = Set(merged.last_seen);
        active.times_seen = Set(merged.times_seen);
        active.num_comments = Set(merged.num_comments);
        active.update(&txn).await?;

        txn.commit().await?;

        self.audit
            .record(AuditEntry::deleted(source.id, transaction_token, "Group"));
        counter!("regroup_merge_finalized_total").increment(1);
        tracing::info!(
            old_group_id = source.id,
            new_group_id = destination_id,
            "Merge finalized"
        );

        Ok(MergeOutcome::Finalized)
    }

    async fn merge_time_series(
        &self,
        source: &group::Model,
        destination_id: i64,
    ) -> Result<(), TaskError> {
        let environment_ids =
            EnvironmentRepository::ids_for_project(&self.db, source.project_id).await?;
        let sources = [source.id];
        let scope = |model: TsdbModel| {
            model
                .supports_environments()
                .then_some(environment_ids.as_slice())
        };

        self.tsdb
            .merge(
                TsdbModel::Group,
                destination_id,
                &sources,
                scope(TsdbModel::Group),
            )
            .await?;
        self.tsdb
            .merge_distinct_counts(
                TsdbModel::UsersAffectedByGroup,
                destination_id,
                &sources,
                scope(TsdbModel::UsersAffectedByGroup),
            )
            .await?;
        for model in [
            TsdbModel::FrequentReleasesByGroup,
            TsdbModel::FrequentEnvironmentsByGroup,
        ] {
            self.tsdb
                .merge_frequencies(model, destination_id, &sources, scope(model))
                .await?;
        }

        Ok(())
    }
}
