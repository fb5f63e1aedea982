//! Hand-off of retired groups to the cascading deletion consumer.

use std::sync::Mutex;

use async_trait::async_trait;
use sea_orm::{DatabaseConnection, TransactionTrait};

use crate::error::TaskError;
use crate::queue::{DeleteGroupTask, Task};
use crate::repositories::{GroupRepository, TaskRepository};

/// Boundary to the deletion pipeline.
#[async_trait]
pub trait DeletionPipeline: Send + Sync {
    /// Request deletion of `group_id`.
    ///
    /// Returns true when this call enqueued the group; false when it was
    /// already pending deletion or does not exist.
    async fn enqueue_delete(&self, group_id: i64) -> Result<bool, TaskError>;
}

/// Marks the group `pending_deletion` and submits a `delete_group` task in
/// the same transaction, so a group is enqueued at most once.
#[derive(Clone)]
pub struct QueueDeletionPipeline {
    db: DatabaseConnection,
}

impl QueueDeletionPipeline {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

#[async_trait]
impl DeletionPipeline for QueueDeletionPipeline {
    async fn enqueue_delete(&self, group_id: i64) -> Result<bool, TaskError> {
        if group_id <= 0 {
            return Err(TaskError::Deletion(format!("invalid group id {group_id}")));
        }

        let txn = self.db.begin().await?;

        if !GroupRepository::mark_pending_deletion(&txn, group_id).await? {
            txn.rollback().await?;
            tracing::debug!(group_id, "Group already pending deletion");
            return Ok(false);
        }

        let row = TaskRepository::insert(&txn, &Task::DeleteGroup(DeleteGroupTask { group_id }))
            .await
            .map_err(|err| {
                TaskError::Deletion(format!("failed to enqueue group {group_id}: {err}"))
            })?;
        txn.commit().await?;

        tracing::info!(group_id, task_id = %row.id, "Group enqueued for deletion");
        Ok(true)
    }
}

/// Records requested deletions without touching storage.
#[derive(Debug, Default)]
pub struct RecordingDeletionPipeline {
    requested: Mutex<Vec<i64>>,
}

impl RecordingDeletionPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn requested(&self) -> Vec<i64> {
        self.requested
            .lock()
            .map(|ids| ids.clone())
            .unwrap_or_else(|poison| poison.into_inner().clone())
    }
}

#[async_trait]
impl DeletionPipeline for RecordingDeletionPipeline {
    async fn enqueue_delete(&self, group_id: i64) -> Result<bool, TaskError> {
        let mut requested = self
            .requested
            .lock()
            .unwrap_or_else(|poison| poison.into_inner());
        if requested.contains(&group_id) {
            return Ok(false);
        }
        requested.push(group_id);
        Ok(true)
    }
}
