//! Units of work and the queue they travel through.
//!
//! A merge or rehash never suspends in-process: each pass either finishes or
//! submits an equivalent [`Task`] and returns. Tasks are persisted as rows in
//! the `tasks` table by [`DatabaseTaskQueue`]; [`MemoryTaskQueue`] keeps them
//! in memory for tests and for driving units inline.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use sea_orm::DatabaseConnection;
use serde::{Deserialize, Serialize};

use crate::error::TaskError;
use crate::repositories::TaskRepository;

/// Task kind stored for merge passes.
pub const KIND_MERGE_GROUP: &str = "merge_group";
/// Task kind stored for rehash passes.
pub const KIND_REHASH_GROUP_EVENTS: &str = "rehash_group_events";
/// Task kind stored for deletion requests; consumed outside this service.
pub const KIND_DELETE_GROUP: &str = "delete_group";

/// Merge `source_group_id` into `destination_group_id`.
///
/// The ids are optional so that a malformed trigger still deserializes and
/// can be rejected as a logged no-op instead of being retried forever.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeGroupTask {
    #[serde(default)]
    pub source_group_id: Option<i64>,
    #[serde(default)]
    pub destination_group_id: Option<i64>,
    #[serde(default)]
    pub transaction_token: Option<String>,
    /// Set on every continuation pass after the first.
    #[serde(default)]
    pub resumed: bool,
}

impl MergeGroupTask {
    pub fn new(source_group_id: i64, destination_group_id: i64, transaction_token: Option<String>) -> Self {
        Self {
            source_group_id: Some(source_group_id),
            destination_group_id: Some(destination_group_id),
            transaction_token,
            resumed: false,
        }
    }

    /// The continuation unit submitted after a pass that made progress.
    pub fn continuation(&self) -> Self {
        Self {
            resumed: true,
            ..self.clone()
        }
    }
}

/// Recompute grouping for every event of `group_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RehashGroupTask {
    pub group_id: i64,
    #[serde(default)]
    pub transaction_token: Option<String>,
}

/// Cascade deletion of a retired group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteGroupTask {
    pub group_id: i64,
}

/// A queued unit of work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Task {
    MergeGroup(MergeGroupTask),
    RehashGroupEvents(RehashGroupTask),
    DeleteGroup(DeleteGroupTask),
}

impl Task {
    pub fn kind(&self) -> &'static str {
        match self {
            Task::MergeGroup(_) => KIND_MERGE_GROUP,
            Task::RehashGroupEvents(_) => KIND_REHASH_GROUP_EVENTS,
            Task::DeleteGroup(_) => KIND_DELETE_GROUP,
        }
    }

    pub fn transaction_token(&self) -> Option<&str> {
        match self {
            Task::MergeGroup(task) => task.transaction_token.as_deref(),
            Task::RehashGroupEvents(task) => task.transaction_token.as_deref(),
            Task::DeleteGroup(_) => None,
        }
    }
}

/// Submission side of the task queue.
#[async_trait]
pub trait TaskQueue: Send + Sync {
    async fn submit(&self, task: Task) -> Result<(), TaskError>;
}

/// Queue backed by the `tasks` table.
#[derive(Clone)]
pub struct DatabaseTaskQueue {
    db: DatabaseConnection,
}

impl DatabaseTaskQueue {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

#[async_trait]
impl TaskQueue for DatabaseTaskQueue {
    async fn submit(&self, task: Task) -> Result<(), TaskError> {
        let row = TaskRepository::insert(&self.db, &task).await?;
        tracing::debug!(task_id = %row.id, kind = %row.kind, "Task submitted");
        Ok(())
    }
}

/// In-memory FIFO queue.
#[derive(Debug, Default)]
pub struct MemoryTaskQueue {
    tasks: Mutex<VecDeque<Task>>,
}

impl MemoryTaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pop(&self) -> Option<Task> {
        self.lock().pop_front()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Removes and returns every pending task.
    pub fn drain(&self) -> Vec<Task> {
        self.lock().drain(..).collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<Task>> {
        self.tasks
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
    }
}

#[async_trait]
impl TaskQueue for MemoryTaskQueue {
    async fn submit(&self, task: Task) -> Result<(), TaskError> {
        self.lock().push_back(task);
        Ok(())
    }
}
