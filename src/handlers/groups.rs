//! # Group API Handlers
//!
//! Rehash trigger and the new-groups listing.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::auth::OperatorAuth;
use crate::error::{ApiError, not_found, validation_error};
use crate::models::group;
use crate::queue::{RehashGroupTask, Task};
use crate::repositories::group::{
    DEFAULT_NEW_GROUPS_LIMIT, DEFAULT_NEW_GROUPS_MINUTES, MAX_NEW_GROUPS_LIMIT,
    MAX_NEW_GROUPS_MINUTES,
};
use crate::repositories::GroupRepository;
use crate::server::AppState;

/// Accepted rehash
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RehashAccepted {
    pub group_id: i64,
    pub transaction_token: String,
}

/// Enqueue a rehash of every event in the group
#[utoipa::path(
    post,
    path = "/v1/groups/{group_id}/rehash",
    security(("bearer_auth" = [])),
    params(("group_id" = i64, Path, description = "Group to rehash")),
    responses(
        (status = 202, description = "Rehash queued", body = RehashAccepted),
        (status = 401, description = "Unauthorized", body = ApiError),
        (status = 404, description = "Group not found", body = ApiError)
    ),
    tag = "groups"
)]
pub async fn rehash_group(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
    Path(group_id): Path<i64>,
) -> Result<(StatusCode, Json<RehashAccepted>), ApiError> {
    if GroupRepository::find(&state.db, group_id).await?.is_none() {
        return Err(not_found(&format!("Group {} not found", group_id)));
    }

    let transaction_token = uuid::Uuid::new_v4().to_string();
    state
        .queue
        .submit(Task::RehashGroupEvents(RehashGroupTask {
            group_id,
            transaction_token: Some(transaction_token.clone()),
        }))
        .await?;

    tracing::info!(group_id, transaction_id = %transaction_token, "Rehash requested");

    Ok((
        StatusCode::ACCEPTED,
        Json(RehashAccepted {
            group_id,
            transaction_token,
        }),
    ))
}

/// Query parameters for the new-groups listing
#[derive(Debug, Deserialize, Serialize, IntoParams, ToSchema)]
pub struct NewGroupsQuery {
    /// Look-back window in minutes (default: 15, at most 43200)
    pub minutes: Option<i64>,
    /// Maximum number of groups (default: 10, capped at 100)
    pub limit: Option<u64>,
}

/// Group summary returned by listings
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct GroupInfo {
    pub id: i64,
    pub project_id: i64,
    #[schema(example = "unresolved")]
    pub status: String,
    pub message: String,
    pub culprit: Option<String>,
    pub level: String,
    pub first_seen: String,
    pub last_seen: String,
    pub times_seen: i32,
    pub num_comments: i32,
    pub score: i64,
}

impl From<group::Model> for GroupInfo {
    fn from(model: group::Model) -> Self {
        Self {
            id: model.id,
            project_id: model.project_id,
            status: model.status,
            message: model.message,
            culprit: model.culprit,
            level: model.level,
            first_seen: model.first_seen.to_rfc3339(),
            last_seen: model.last_seen.to_rfc3339(),
            times_seen: model.times_seen,
            num_comments: model.num_comments,
            score: model.score,
        }
    }
}

/// Unresolved groups of the team that became active recently
#[utoipa::path(
    get,
    path = "/v1/teams/{team_id}/groups/new",
    security(("bearer_auth" = [])),
    params(("team_id" = i64, Path, description = "Team whose projects are listed"), NewGroupsQuery),
    responses(
        (status = 200, description = "New groups, highest score first", body = [GroupInfo]),
        (status = 400, description = "Validation error", body = ApiError),
        (status = 401, description = "Unauthorized", body = ApiError)
    ),
    tag = "groups"
)]
pub async fn list_new_groups(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
    Path(team_id): Path<i64>,
    Query(query): Query<NewGroupsQuery>,
) -> Result<Json<Vec<GroupInfo>>, ApiError> {
    let minutes = query.minutes.unwrap_or(DEFAULT_NEW_GROUPS_MINUTES);
    if !(1..=MAX_NEW_GROUPS_MINUTES).contains(&minutes) {
        return Err(validation_error(
            "Invalid minutes",
            serde_json::json!({
                "minutes": format!("Must be between 1 and {} minutes", MAX_NEW_GROUPS_MINUTES)
            }),
        ));
    }
    let limit = query.limit.unwrap_or(DEFAULT_NEW_GROUPS_LIMIT);
    if limit == 0 {
        return Err(validation_error(
            "Invalid limit",
            serde_json::json!({ "limit": "Must be at least 1" }),
        ));
    }

    let groups = GroupRepository::list_new_for_team(
        &state.db,
        team_id,
        minutes,
        limit.min(MAX_NEW_GROUPS_LIMIT),
        Utc::now().fixed_offset(),
    )
    .await?;

    Ok(Json(groups.into_iter().map(GroupInfo::from).collect()))
}
