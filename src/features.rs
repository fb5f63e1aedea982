//! Similarity features (grouping signatures) kept per group.

use std::collections::{BTreeSet, HashMap};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::error::TaskError;

/// Index of similarity signatures keyed by group.
#[async_trait]
pub trait FeatureIndex: Send + Sync {
    /// Fold the signatures of `sources` into `destination` and forget the
    /// sources.
    async fn merge(&self, destination: i64, sources: &[i64]) -> Result<(), TaskError>;
}

#[derive(Debug, Default)]
pub struct InMemoryFeatureIndex {
    signatures: Mutex<HashMap<i64, BTreeSet<String>>>,
}

impl InMemoryFeatureIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn record(&self, group_id: i64, signature: &str) {
        self.signatures
            .lock()
            .await
            .entry(group_id)
            .or_default()
            .insert(signature.to_string());
    }

    pub async fn signatures(&self, group_id: i64) -> BTreeSet<String> {
        self.signatures
            .lock()
            .await
            .get(&group_id)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl FeatureIndex for InMemoryFeatureIndex {
    async fn merge(&self, destination: i64, sources: &[i64]) -> Result<(), TaskError> {
        if sources.contains(&destination) {
            return Err(TaskError::Features(format!(
                "group {destination} cannot absorb its own signatures"
            )));
        }

        let mut signatures = self.signatures.lock().await;
        for source in sources {
            if let Some(moved) = signatures.remove(source) {
                signatures.entry(destination).or_default().extend(moved);
            }
        }
        Ok(())
    }
}

/// Index that stores nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct DummyFeatureIndex;

#[async_trait]
impl FeatureIndex for DummyFeatureIndex {
    async fn merge(&self, destination: i64, sources: &[i64]) -> Result<(), TaskError> {
        tracing::debug!(destination, ?sources, "feature merge skipped");
        Ok(())
    }
}
