use async_trait::async_trait;
use sea_orm::{ActiveModelTrait, DatabaseConnection, Set};
use sha2::{Digest, Sha256};

use super::fingerprint::is_default_var;
use super::{GroupAssignment, GroupDefaults, GroupingEngine};
use crate::error::TaskError;
use crate::models::{event, group};
use crate::repositories::{GroupHashRepository, GroupRepository};

/// Length of a normalized hash, in hex characters.
const NORMALIZED_HASH_LENGTH: usize = 32;
const COMPONENT_SEPARATOR: &str = "\u{1f}";

/// Database-backed grouping engine.
#[derive(Clone)]
pub struct DefaultGroupingEngine {
    db: DatabaseConnection,
}

impl DefaultGroupingEngine {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    async fn record_on_existing(
        &self,
        existing: group::Model,
        defaults: &GroupDefaults,
    ) -> Result<group::Model, TaskError> {
        let times_seen = existing.times_seen.checked_add(1).unwrap_or_else(|| {
            tracing::warn!(group_id = existing.id, "times_seen overflow; keeping prior count");
            existing.times_seen
        });
        let last_seen = existing.last_seen.max(defaults.last_seen);
        let first_seen = existing.first_seen.min(defaults.first_seen);

        let mut active: group::ActiveModel = existing.into();
        active.times_seen = Set(times_seen);
        active.last_seen = Set(last_seen);
        active.first_seen = Set(first_seen);
        active.score = Set(group::score_for(times_seen, last_seen));
        Ok(active.update(&self.db).await?)
    }

    async fn create_group(
        &self,
        project_id: i64,
        defaults: GroupDefaults,
    ) -> Result<group::Model, TaskError> {
        let created = group::ActiveModel {
            project_id: Set(project_id),
            status: Set(group::STATUS_UNRESOLVED.to_string()),
            message: Set(defaults.message),
            culprit: Set(defaults.culprit),
            logger: Set(defaults.logger),
            level: Set(defaults.level),
            platform: Set(defaults.platform),
            first_seen: Set(defaults.first_seen),
            last_seen: Set(defaults.last_seen),
            active_at: Set(Some(defaults.first_seen)),
            times_seen: Set(1),
            num_comments: Set(0),
            score: Set(group::score_for(1, defaults.last_seen)),
            data: Set(defaults.data),
            ..Default::default()
        }
        .insert(&self.db)
        .await?;

        Ok(created)
    }
}

#[async_trait]
impl GroupingEngine for DefaultGroupingEngine {
    fn hashes_from_fingerprint(&self, event: &event::Model, fingerprint: &[String]) -> Vec<String> {
        let components: Vec<&str> = fingerprint
            .iter()
            .map(|entry| {
                if is_default_var(entry) {
                    event.message.as_str()
                } else {
                    entry.as_str()
                }
            })
            .collect();

        vec![components.join(COMPONENT_SEPARATOR)]
    }

    fn normalize_hash(&self, hash: &str) -> String {
        let digest = hex::encode(Sha256::digest(hash.as_bytes()));
        digest[..NORMALIZED_HASH_LENGTH].to_string()
    }

    async fn assign_event_to_group(
        &self,
        event: &event::Model,
        hashes: &[String],
        defaults: GroupDefaults,
    ) -> Result<GroupAssignment, TaskError> {
        if hashes.is_empty() {
            return Err(TaskError::Grouping(format!(
                "event {} produced no hashes",
                event.id
            )));
        }

        let existing = GroupHashRepository::find_existing(&self.db, event.project_id, hashes).await?;

        // Hashes are consulted in the order given.
        let mut matched = None;
        for hash in hashes {
            let Some(entry) = existing.iter().find(|entry| &entry.hash == hash) else {
                continue;
            };
            if let Some(group) = GroupRepository::find(&self.db, entry.group_id).await? {
                matched = Some(group);
                break;
            }
        }

        let (group, created) = match matched {
            Some(group) => (self.record_on_existing(group, &defaults).await?, false),
            None => (self.create_group(event.project_id, defaults).await?, true),
        };

        GroupHashRepository::claim(&self.db, event.project_id, hashes, group.id).await?;

        tracing::debug!(
            event_id = event.id,
            group_id = group.id,
            created,
            "Assigned event to group"
        );

        Ok(GroupAssignment { group, created })
    }
}
