//! Wiring of the merge and rehash collaborators from configuration.

use std::sync::Arc;

use sea_orm::DatabaseConnection;

use crate::audit::{AuditSink, TracingAuditSink};
use crate::config::{AppConfig, TsdbBackend};
use crate::deletion::QueueDeletionPipeline;
use crate::features::{DummyFeatureIndex, FeatureIndex, InMemoryFeatureIndex};
use crate::grouping::DefaultGroupingEngine;
use crate::merge::MergeCoordinator;
use crate::queue::{DatabaseTaskQueue, TaskQueue};
use crate::rehash::RehashCoordinator;
use crate::tsdb::build_store;
use crate::worker::Worker;

/// Everything a process needs to run or trigger units of work.
#[derive(Clone)]
pub struct Services {
    pub queue: Arc<dyn TaskQueue>,
    pub merge: MergeCoordinator,
    pub rehash: RehashCoordinator,
}

impl Services {
    /// Production wiring: database queue, tracing audit sink, and the
    /// configured time-series and feature backends.
    pub fn from_config(config: &AppConfig, db: DatabaseConnection) -> Self {
        let queue: Arc<dyn TaskQueue> = Arc::new(DatabaseTaskQueue::new(db.clone()));
        let audit: Arc<dyn AuditSink> = Arc::new(TracingAuditSink);
        let features: Arc<dyn FeatureIndex> = match config.tsdb_backend {
            TsdbBackend::Memory => Arc::new(InMemoryFeatureIndex::new()),
            TsdbBackend::Dummy => Arc::new(DummyFeatureIndex),
        };

        let merge = MergeCoordinator::new(
            db.clone(),
            Arc::clone(&queue),
            build_store(config.tsdb_backend),
            features,
            Arc::clone(&audit),
            config.merge_batch_limit,
        );
        let rehash = RehashCoordinator::new(
            db.clone(),
            Arc::clone(&queue),
            Arc::new(DefaultGroupingEngine::new(db.clone())),
            Arc::new(QueueDeletionPipeline::new(db)),
            audit,
            config.rehash_batch_size,
        );

        Self {
            queue,
            merge,
            rehash,
        }
    }

    pub fn worker(&self, config: &AppConfig, db: DatabaseConnection) -> Worker {
        Worker::new(
            db,
            self.merge.clone(),
            self.rehash.clone(),
            config.worker.clone(),
            config.retry_policy.clone(),
        )
    }
}
