//! # Data Models
//!
//! This module contains the SeaORM entities used by the merge and rehash
//! workers and the HTTP surface.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub mod activity;
pub mod environment;
pub mod environment_project;
pub mod event;
pub mod event_mapping;
pub mod group;
pub mod group_assignee;
pub mod group_hash;
pub mod group_meta;
pub mod group_redirect;
pub mod group_rule_status;
pub mod group_subscription;
pub mod group_tag_value;
pub mod project;
pub mod task;
pub mod team;
pub mod user_report;

pub use environment::Entity as Environment;
pub use event::Entity as Event;
pub use group::Entity as Group;
pub use group_hash::Entity as GroupHash;
pub use group_redirect::Entity as GroupRedirect;
pub use project::Entity as Project;
pub use task::Entity as Task;
pub use team::Entity as Team;

/// Basic service information response
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ServiceInfo {
    /// The name of the service
    pub service: String,
    /// The version of the service
    pub version: String,
}

impl Default for ServiceInfo {
    fn default() -> Self {
        Self {
            service: "regroup".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}
