//! Task Worker
//!
//! Background worker that claims due merge and rehash tasks, runs each one
//! inside a trace context keyed by its transaction token, and records the
//! result. Failed units go back to the queue with exponential backoff and
//! jitter; there is no attempt limit.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use metrics::{counter, histogram};
use rand::{Rng, thread_rng};
use sea_orm::DatabaseConnection;
use tokio::sync::Semaphore;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::config::{RetryPolicyConfig, WorkerConfig};
use crate::error::TaskError;
use crate::merge::MergeCoordinator;
use crate::models::task;
use crate::queue::{KIND_MERGE_GROUP, KIND_REHASH_GROUP_EVENTS, Task};
use crate::rehash::RehashCoordinator;
use crate::repositories::TaskRepository;
use crate::telemetry::{TraceContext, with_trace_context};

/// Task kinds this worker executes. `delete_group` rows belong to the
/// deletion consumer.
pub const CLAIMED_KINDS: [&str; 2] = [KIND_MERGE_GROUP, KIND_REHASH_GROUP_EVENTS];

/// Background worker for merge and rehash units
#[derive(Clone)]
pub struct Worker {
    db: DatabaseConnection,
    merge: MergeCoordinator,
    rehash: RehashCoordinator,
    config: WorkerConfig,
    retry_policy: RetryPolicyConfig,
}

impl Worker {
    pub fn new(
        db: DatabaseConnection,
        merge: MergeCoordinator,
        rehash: RehashCoordinator,
        config: WorkerConfig,
        retry_policy: RetryPolicyConfig,
    ) -> Self {
        Self {
            db,
            merge,
            rehash,
            config,
            retry_policy,
        }
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    /// Run the claim loop until `shutdown` is cancelled.
    pub async fn run(&self, shutdown: CancellationToken) {
        info!(config = ?self.config, "Starting task worker");

        loop {
            let start = Instant::now();

            match self.claim_and_run().await {
                Ok(count) if count > 0 => debug!(count, "Executed tasks"),
                Ok(_) => {}
                Err(err) => error!(error = %err, "Error executing tasks"),
            }

            let tick = Duration::from_millis(self.config.tick_ms);
            let remaining = tick.saturating_sub(start.elapsed());

            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Task worker shutting down");
                    return;
                }
                _ = sleep(remaining) => {}
            }
        }
    }

    /// Claim one batch of due tasks and run them with bounded concurrency.
    #[instrument(skip(self), fields(batch_size = self.config.claim_batch))]
    pub async fn claim_and_run(&self) -> Result<usize, TaskError> {
        let lease = chrono::Duration::seconds(self.config.lease_seconds as i64);
        let rows =
            TaskRepository::claim_due(&self.db, &CLAIMED_KINDS, self.config.claim_batch, lease)
                .await?;
        let count = rows.len();
        if rows.is_empty() {
            return Ok(0);
        }

        let semaphore = Arc::new(Semaphore::new(self.config.concurrency.max(1)));
        let mut handles = Vec::with_capacity(count);
        for row in rows {
            let worker = self.clone();
            let permit = semaphore
                .clone()
                .acquire_owned()
                .await
                .map_err(|_| TaskError::Queue("worker semaphore closed".to_string()))?;

            handles.push(tokio::spawn(async move {
                let _permit = permit;
                let task_id = row.id;
                if let Err(err) = worker.run_single(row).await {
                    error!(%task_id, error = %err, "Failed to record task result");
                }
            }));
        }

        for handle in handles {
            let _ = handle.await;
        }

        Ok(count)
    }

    /// Execute one claimed row and persist its outcome.
    pub async fn run_single(&self, row: task::Model) -> Result<(), TaskError> {
        let task = match serde_json::from_value::<Task>(row.payload.clone()) {
            Ok(task) => task,
            Err(err) => {
                warn!(task_id = %row.id, error = %err, "Undecodable task payload");
                counter!("regroup_tasks_undecodable_total").increment(1);
                TaskRepository::mark_failed(
                    &self.db,
                    &row,
                    serde_json::json!({
                        "message": err.to_string(),
                        "kind": "decode",
                        "timestamp": Utc::now().to_rfc3339(),
                    }),
                )
                .await?;
                return Ok(());
            }
        };

        let kind = task.kind();
        let context = TraceContext {
            trace_id: task
                .transaction_token()
                .map(str::to_string)
                .unwrap_or_else(|| row.id.to_string()),
        };

        let timer = Instant::now();
        let result = with_trace_context(context, self.execute(task)).await;
        histogram!("regroup_task_duration_seconds", "kind" => kind)
            .record(timer.elapsed().as_secs_f64());

        match result {
            Ok(outcome) => {
                counter!("regroup_tasks_total", "kind" => kind, "outcome" => outcome)
                    .increment(1);
                TaskRepository::mark_succeeded(&self.db, &row).await?;
            }
            Err(err) => {
                counter!("regroup_tasks_total", "kind" => kind, "outcome" => "failed")
                    .increment(1);
                self.handle_failure(&row, &err).await?;
            }
        }

        Ok(())
    }

    async fn execute(&self, task: Task) -> Result<&'static str, TaskError> {
        match task {
            Task::MergeGroup(merge) => Ok(self.merge.run(merge).await?.label()),
            Task::RehashGroupEvents(rehash) => Ok(self.rehash.run(rehash).await?.label()),
            Task::DeleteGroup(delete) => Err(TaskError::Queue(format!(
                "delete_group task for group {} is not handled by this worker",
                delete.group_id
            ))),
        }
    }

    async fn handle_failure(&self, row: &task::Model, err: &TaskError) -> Result<(), TaskError> {
        let now = Utc::now().fixed_offset();
        let attempts = row.attempts.max(0);
        let backoff_seconds = retry_backoff(&self.retry_policy, attempts.saturating_sub(1));
        let retry_after = now + chrono::Duration::seconds(backoff_seconds as i64);

        let details = serde_json::json!({
            "message": err.to_string(),
            "attempts": attempts,
            "backoff_seconds": backoff_seconds,
            "timestamp": now.to_rfc3339(),
        });
        TaskRepository::requeue(&self.db, row, retry_after, details).await?;

        warn!(
            task_id = %row.id,
            kind = %row.kind,
            attempts,
            backoff_seconds,
            error = %err,
            "Task failed; retrying"
        );
        Ok(())
    }
}

/// Delay in seconds before the next attempt after `prior_failures` failed
/// attempts: `base * 2^prior_failures`, capped at `max`, plus up to
/// `jitter_factor` of that on top.
pub fn retry_backoff(policy: &RetryPolicyConfig, prior_failures: i32) -> f64 {
    let base = policy.base_seconds as f64;
    let max = policy.max_seconds as f64;
    let backoff = (base * 2_f64.powi(prior_failures.clamp(0, 30))).min(max);

    let spread = policy.jitter_factor * backoff;
    if spread > 0.0 {
        backoff + thread_rng().gen_range(0.0..spread)
    } else {
        backoff
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(base_seconds: u64, max_seconds: u64, jitter_factor: f64) -> RetryPolicyConfig {
        RetryPolicyConfig {
            base_seconds,
            max_seconds,
            jitter_factor,
        }
    }

    #[test]
    fn test_retry_backoff_doubles_per_failure() {
        let policy = policy(300, 3600, 0.1);

        let first = retry_backoff(&policy, 0);
        assert!((300.0..330.0).contains(&first));

        let second = retry_backoff(&policy, 1);
        assert!((600.0..660.0).contains(&second));

        let third = retry_backoff(&policy, 2);
        assert!((1200.0..1320.0).contains(&third));
    }

    #[test]
    fn test_retry_backoff_is_capped() {
        let policy = policy(300, 3600, 0.1);
        let backoff = retry_backoff(&policy, 20);
        assert!(backoff >= 3600.0);
        assert!(backoff <= 3600.0 * 1.1);
    }

    #[test]
    fn test_retry_backoff_without_jitter_is_exact() {
        let policy = policy(5, 900, 0.0);
        assert_eq!(retry_backoff(&policy, 0), 5.0);
        assert_eq!(retry_backoff(&policy, 3), 40.0);
        // Negative counts behave like a first failure
        assert_eq!(retry_backoff(&policy, -2), 5.0);
    }

    #[test]
    fn test_worker_never_claims_deletions() {
        assert!(!CLAIMED_KINDS.contains(&crate::queue::KIND_DELETE_GROUP));
    }
}
