//! Grouping boundary.
//!
//! The rehash coordinator only depends on [`GroupingEngine`]; how hashes are
//! derived and how an event lands in a group is up to the implementation.
//! [`DefaultGroupingEngine`] is the reference implementation used by the
//! service and the tests.

mod culprit;
mod engine;
mod fingerprint;

use async_trait::async_trait;
use sea_orm::prelude::DateTimeWithTimeZone;
use serde_json::Value as JsonValue;

use crate::error::TaskError;
use crate::models::{event, group};

pub use culprit::{MAX_CULPRIT_LENGTH, generate_culprit};
pub use engine::DefaultGroupingEngine;
pub use fingerprint::{DEFAULT_FINGERPRINT_VAR, event_fingerprint};

/// Attributes used when an assignment has to create a new group.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupDefaults {
    pub message: String,
    pub platform: Option<String>,
    pub culprit: Option<String>,
    pub logger: String,
    pub level: String,
    pub first_seen: DateTimeWithTimeZone,
    pub last_seen: DateTimeWithTimeZone,
    pub data: Option<JsonValue>,
}

/// Result of assigning an event.
#[derive(Debug, Clone)]
pub struct GroupAssignment {
    pub group: group::Model,
    /// True when the assignment created the group.
    pub created: bool,
}

#[async_trait]
pub trait GroupingEngine: Send + Sync {
    /// Raw (unnormalized) hashes for the event under `fingerprint`.
    fn hashes_from_fingerprint(&self, event: &event::Model, fingerprint: &[String]) -> Vec<String>;

    /// Canonical digest stored in the hash index.
    fn normalize_hash(&self, hash: &str) -> String;

    /// Find or create the group owning `hashes` and record the event on it.
    async fn assign_event_to_group(
        &self,
        event: &event::Model,
        hashes: &[String],
        defaults: GroupDefaults,
    ) -> Result<GroupAssignment, TaskError>;
}
