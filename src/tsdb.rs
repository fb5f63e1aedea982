//! Time-series boundary.
//!
//! Per-group metrics live outside the relational store. A merge folds the
//! source group's series into the destination through [`TimeSeriesStore`].

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::config::TsdbBackend;
use crate::error::TaskError;

/// Per-group metric families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TsdbModel {
    /// Raw event counts
    Group,
    /// Distinct users affected
    UsersAffectedByGroup,
    /// Release frequency table
    FrequentReleasesByGroup,
    /// Environment frequency table
    FrequentEnvironmentsByGroup,
}

impl TsdbModel {
    /// Whether the model keeps separate series per environment.
    pub fn supports_environments(self) -> bool {
        matches!(self, TsdbModel::Group | TsdbModel::UsersAffectedByGroup)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TsdbModel::Group => "group",
            TsdbModel::UsersAffectedByGroup => "users_affected_by_group",
            TsdbModel::FrequentReleasesByGroup => "frequent_releases_by_group",
            TsdbModel::FrequentEnvironmentsByGroup => "frequent_environments_by_group",
        }
    }
}

/// Store of time-bucketed per-group metrics.
///
/// `environment_ids` of `None` merges only the environment-less series;
/// `Some` additionally merges each listed environment's series.
#[async_trait]
pub trait TimeSeriesStore: Send + Sync {
    async fn merge(
        &self,
        model: TsdbModel,
        destination: i64,
        sources: &[i64],
        environment_ids: Option<&[i64]>,
    ) -> Result<(), TaskError>;

    async fn merge_distinct_counts(
        &self,
        model: TsdbModel,
        destination: i64,
        sources: &[i64],
        environment_ids: Option<&[i64]>,
    ) -> Result<(), TaskError>;

    async fn merge_frequencies(
        &self,
        model: TsdbModel,
        destination: i64,
        sources: &[i64],
        environment_ids: Option<&[i64]>,
    ) -> Result<(), TaskError>;
}

/// Build the configured store.
pub fn build_store(backend: TsdbBackend) -> Arc<dyn TimeSeriesStore> {
    match backend {
        TsdbBackend::Memory => Arc::new(InMemoryTimeSeriesStore::new()),
        TsdbBackend::Dummy => Arc::new(DummyTimeSeriesStore),
    }
}

type SeriesKey = (TsdbModel, i64, Option<i64>);

#[derive(Debug, Default)]
struct Series {
    counters: HashMap<SeriesKey, BTreeMap<i64, u64>>,
    distinct: HashMap<SeriesKey, BTreeMap<i64, HashSet<String>>>,
    frequencies: HashMap<SeriesKey, BTreeMap<i64, HashMap<String, u64>>>,
}

/// In-process store with bucketed counters, distinct sets and frequency
/// tables.
#[derive(Debug, Default)]
pub struct InMemoryTimeSeriesStore {
    series: Mutex<Series>,
}

impl InMemoryTimeSeriesStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn incr(
        &self,
        model: TsdbModel,
        key: i64,
        environment_id: Option<i64>,
        bucket: i64,
        count: u64,
    ) {
        let mut series = self.series.lock().await;
        let slot = series
            .counters
            .entry((model, key, environment_id))
            .or_default()
            .entry(bucket)
            .or_default();
        *slot = slot.saturating_add(count);
    }

    pub async fn record_distinct(
        &self,
        model: TsdbModel,
        key: i64,
        environment_id: Option<i64>,
        bucket: i64,
        value: &str,
    ) {
        let mut series = self.series.lock().await;
        series
            .distinct
            .entry((model, key, environment_id))
            .or_default()
            .entry(bucket)
            .or_default()
            .insert(value.to_string());
    }

    pub async fn record_frequency(
        &self,
        model: TsdbModel,
        key: i64,
        environment_id: Option<i64>,
        bucket: i64,
        member: &str,
        count: u64,
    ) {
        let mut series = self.series.lock().await;
        let slot = series
            .frequencies
            .entry((model, key, environment_id))
            .or_default()
            .entry(bucket)
            .or_default()
            .entry(member.to_string())
            .or_default();
        *slot = slot.saturating_add(count);
    }

    /// Sum of all buckets of a counter series.
    pub async fn total(&self, model: TsdbModel, key: i64, environment_id: Option<i64>) -> u64 {
        let series = self.series.lock().await;
        series
            .counters
            .get(&(model, key, environment_id))
            .map(|buckets| buckets.values().fold(0u64, |acc, v| acc.saturating_add(*v)))
            .unwrap_or(0)
    }

    /// Number of distinct values across all buckets of a series.
    pub async fn distinct_count(
        &self,
        model: TsdbModel,
        key: i64,
        environment_id: Option<i64>,
    ) -> usize {
        let series = self.series.lock().await;
        series
            .distinct
            .get(&(model, key, environment_id))
            .map(|buckets| {
                buckets
                    .values()
                    .flat_map(|values| values.iter())
                    .collect::<HashSet<_>>()
                    .len()
            })
            .unwrap_or(0)
    }

    /// Member totals across all buckets of a frequency series.
    pub async fn frequencies(
        &self,
        model: TsdbModel,
        key: i64,
        environment_id: Option<i64>,
    ) -> HashMap<String, u64> {
        let series = self.series.lock().await;
        let mut totals = HashMap::new();
        if let Some(buckets) = series.frequencies.get(&(model, key, environment_id)) {
            for members in buckets.values() {
                for (member, count) in members {
                    let slot: &mut u64 = totals.entry(member.clone()).or_default();
                    *slot = slot.saturating_add(*count);
                }
            }
        }
        totals
    }
}

fn ensure_distinct(destination: i64, sources: &[i64]) -> Result<(), TaskError> {
    if sources.contains(&destination) {
        return Err(TaskError::TimeSeries(format!(
            "group {destination} cannot be merged into itself"
        )));
    }
    Ok(())
}

fn scopes(environment_ids: Option<&[i64]>) -> Vec<Option<i64>> {
    std::iter::once(None)
        .chain(environment_ids.unwrap_or(&[]).iter().copied().map(Some))
        .collect()
}

#[async_trait]
impl TimeSeriesStore for InMemoryTimeSeriesStore {
    async fn merge(
        &self,
        model: TsdbModel,
        destination: i64,
        sources: &[i64],
        environment_ids: Option<&[i64]>,
    ) -> Result<(), TaskError> {
        ensure_distinct(destination, sources)?;
        let mut series = self.series.lock().await;
        for scope in scopes(environment_ids) {
            for source in sources {
                let Some(buckets) = series.counters.remove(&(model, *source, scope)) else {
                    continue;
                };
                let target = series.counters.entry((model, destination, scope)).or_default();
                for (bucket, count) in buckets {
                    let slot = target.entry(bucket).or_default();
                    *slot = slot.saturating_add(count);
                }
            }
        }
        Ok(())
    }

    async fn merge_distinct_counts(
        &self,
        model: TsdbModel,
        destination: i64,
        sources: &[i64],
        environment_ids: Option<&[i64]>,
    ) -> Result<(), TaskError> {
        ensure_distinct(destination, sources)?;
        let mut series = self.series.lock().await;
        for scope in scopes(environment_ids) {
            for source in sources {
                let Some(buckets) = series.distinct.remove(&(model, *source, scope)) else {
                    continue;
                };
                let target = series.distinct.entry((model, destination, scope)).or_default();
                for (bucket, values) in buckets {
                    target.entry(bucket).or_default().extend(values);
                }
            }
        }
        Ok(())
    }

    async fn merge_frequencies(
        &self,
        model: TsdbModel,
        destination: i64,
        sources: &[i64],
        environment_ids: Option<&[i64]>,
    ) -> Result<(), TaskError> {
        ensure_distinct(destination, sources)?;
        let mut series = self.series.lock().await;
        for scope in scopes(environment_ids) {
            for source in sources {
                let Some(buckets) = series.frequencies.remove(&(model, *source, scope)) else {
                    continue;
                };
                let target = series
                    .frequencies
                    .entry((model, destination, scope))
                    .or_default();
                for (bucket, members) in buckets {
                    let table = target.entry(bucket).or_default();
                    for (member, count) in members {
                        let slot = table.entry(member).or_default();
                        *slot = slot.saturating_add(count);
                    }
                }
            }
        }
        Ok(())
    }
}

/// Store that keeps nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct DummyTimeSeriesStore;

#[async_trait]
impl TimeSeriesStore for DummyTimeSeriesStore {
    async fn merge(
        &self,
        model: TsdbModel,
        destination: i64,
        sources: &[i64],
        _environment_ids: Option<&[i64]>,
    ) -> Result<(), TaskError> {
        tracing::debug!(model = model.as_str(), destination, ?sources, "tsdb merge skipped");
        Ok(())
    }

    async fn merge_distinct_counts(
        &self,
        model: TsdbModel,
        destination: i64,
        sources: &[i64],
        _environment_ids: Option<&[i64]>,
    ) -> Result<(), TaskError> {
        tracing::debug!(model = model.as_str(), destination, ?sources, "tsdb distinct merge skipped");
        Ok(())
    }

    async fn merge_frequencies(
        &self,
        model: TsdbModel,
        destination: i64,
        sources: &[i64],
        _environment_ids: Option<&[i64]>,
    ) -> Result<(), TaskError> {
        tracing::debug!(model = model.as_str(), destination, ?sources, "tsdb frequency merge skipped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn merge_moves_counts_per_scope() {
        let store = InMemoryTimeSeriesStore::new();
        store.incr(TsdbModel::Group, 1, None, 100, 3).await;
        store.incr(TsdbModel::Group, 1, Some(7), 100, 2).await;
        store.incr(TsdbModel::Group, 2, None, 100, 5).await;

        store
            .merge(TsdbModel::Group, 2, &[1], Some(&[7]))
            .await
            .unwrap();

        assert_eq!(store.total(TsdbModel::Group, 2, None).await, 8);
        assert_eq!(store.total(TsdbModel::Group, 2, Some(7)).await, 2);
        assert_eq!(store.total(TsdbModel::Group, 1, None).await, 0);
        assert_eq!(store.total(TsdbModel::Group, 1, Some(7)).await, 0);
    }

    #[tokio::test]
    async fn merge_into_itself_is_rejected() {
        let store = InMemoryTimeSeriesStore::new();
        store.incr(TsdbModel::Group, 4, None, 100, 3).await;

        let err = store
            .merge(TsdbModel::Group, 4, &[4], None)
            .await
            .unwrap_err();
        assert!(matches!(err, TaskError::TimeSeries(_)));
        assert_eq!(store.total(TsdbModel::Group, 4, None).await, 3);
    }

    #[tokio::test]
    async fn merge_without_environments_leaves_environment_series() {
        let store = InMemoryTimeSeriesStore::new();
        store.incr(TsdbModel::Group, 1, Some(7), 100, 2).await;

        store.merge(TsdbModel::Group, 2, &[1], None).await.unwrap();

        assert_eq!(store.total(TsdbModel::Group, 2, Some(7)).await, 0);
        assert_eq!(store.total(TsdbModel::Group, 1, Some(7)).await, 2);
    }

    #[tokio::test]
    async fn distinct_counts_union_values() {
        let store = InMemoryTimeSeriesStore::new();
        let model = TsdbModel::UsersAffectedByGroup;
        store.record_distinct(model, 1, None, 0, "alice").await;
        store.record_distinct(model, 1, None, 0, "bob").await;
        store.record_distinct(model, 2, None, 0, "bob").await;

        store.merge_distinct_counts(model, 2, &[1], None).await.unwrap();

        assert_eq!(store.distinct_count(model, 2, None).await, 2);
        assert_eq!(store.distinct_count(model, 1, None).await, 0);
    }

    #[tokio::test]
    async fn frequencies_sum_members() {
        let store = InMemoryTimeSeriesStore::new();
        let model = TsdbModel::FrequentReleasesByGroup;
        store.record_frequency(model, 1, None, 0, "1.0", 2).await;
        store.record_frequency(model, 2, None, 0, "1.0", 1).await;
        store.record_frequency(model, 2, None, 60, "2.0", 4).await;

        store.merge_frequencies(model, 2, &[1], None).await.unwrap();

        let totals = store.frequencies(model, 2, None).await;
        assert_eq!(totals.get("1.0"), Some(&3));
        assert_eq!(totals.get("2.0"), Some(&4));
    }

    #[test]
    fn only_counts_and_users_are_environment_scoped() {
        assert!(TsdbModel::Group.supports_environments());
        assert!(TsdbModel::UsersAffectedByGroup.supports_environments());
        assert!(!TsdbModel::FrequentReleasesByGroup.supports_environments());
        assert!(!TsdbModel::FrequentEnvironmentsByGroup.supports_environments());
    }
}
