//! Ordered, batched reassignment of related records between groups.

use metrics::counter;
use sea_orm::DatabaseConnection;

use super::kinds::{self, Reassignment, RelatedKind};
use crate::audit::{AuditEntry, AuditSink};
use crate::error::TaskError;
use crate::models::group;

/// Summary of one migrator pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MigrationPass {
    /// Kind drained by this pass; `None` when nothing was left.
    pub kind: Option<RelatedKind>,
    pub moved: u64,
    pub conflicts: u64,
    pub skipped: u64,
}

impl MigrationPass {
    /// Whether any record was touched. A pass that touched nothing proves
    /// the source is fully drained.
    pub fn processed(&self) -> bool {
        self.kind.is_some()
    }

    pub fn total(&self) -> u64 {
        self.moved + self.conflicts + self.skipped
    }
}

pub struct RelatedRecordMigrator<'a> {
    db: &'a DatabaseConnection,
    audit: &'a dyn AuditSink,
    batch_limit: u64,
}

impl<'a> RelatedRecordMigrator<'a> {
    pub fn new(db: &'a DatabaseConnection, audit: &'a dyn AuditSink, batch_limit: u64) -> Self {
        Self {
            db,
            audit,
            batch_limit,
        }
    }

    /// Move up to one batch of the first kind that still has records owned
    /// by `source`. Kinds after it are not looked at.
    pub async fn run_pass(
        &self,
        source: &group::Model,
        destination_id: i64,
        transaction_token: Option<&str>,
    ) -> Result<MigrationPass, TaskError> {
        for kind in RelatedKind::DECLARED_ORDER {
            let ids = kinds::owned_ids(
                self.db,
                kind,
                source.id,
                source.project_id,
                self.batch_limit,
            )
            .await?;

            if ids.is_empty() {
                continue;
            }

            let mut pass = MigrationPass {
                kind: Some(kind),
                ..Default::default()
            };

            for record_id in ids {
                match kinds::reassign(self.db, kind, record_id, source.id, destination_id).await? {
                    Reassignment::Moved => pass.moved += 1,
                    Reassignment::Skipped => pass.skipped += 1,
                    Reassignment::Conflict => {
                        kinds::absorb_conflict(self.db, kind, record_id, destination_id).await?;
                        self.audit.record(AuditEntry::deleted(
                            record_id,
                            transaction_token,
                            kind.model_name(),
                        ));
                        counter!("regroup_merge_conflicts_total", "kind" => kind.model_name())
                            .increment(1);
                        pass.conflicts += 1;
                    }
                }
            }

            tracing::debug!(
                kind = kind.model_name(),
                moved = pass.moved,
                conflicts = pass.conflicts,
                skipped = pass.skipped,
                old_group_id = source.id,
                new_group_id = destination_id,
                "Migrated related records"
            );

            return Ok(pass);
        }

        Ok(MigrationPass::default())
    }
}
