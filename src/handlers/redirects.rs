//! # Redirect API Handlers

use axum::{
    extract::{Path, State},
    response::Json,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::auth::OperatorAuth;
use crate::error::{ApiError, not_found};
use crate::repositories::RedirectRepository;
use crate::server::AppState;

/// Where a group id currently points
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ResolvedGroup {
    /// Id that was looked up
    pub requested_id: i64,
    /// Live group holding the data
    pub group_id: i64,
    /// True when `requested_id` was merged away
    pub redirected: bool,
}

/// Resolve a possibly merged group id
#[utoipa::path(
    get,
    path = "/v1/redirects/{group_id}",
    security(("bearer_auth" = [])),
    params(("group_id" = i64, Path, description = "Group id, live or merged")),
    responses(
        (status = 200, description = "Resolved group", body = ResolvedGroup),
        (status = 401, description = "Unauthorized", body = ApiError),
        (status = 404, description = "Unknown group id", body = ApiError)
    ),
    tag = "groups"
)]
pub async fn resolve_redirect(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
    Path(group_id): Path<i64>,
) -> Result<Json<ResolvedGroup>, ApiError> {
    let resolved = RedirectRepository::resolve(&state.db, group_id)
        .await?
        .ok_or_else(|| not_found(&format!("Group {} not found", group_id)))?;

    Ok(Json(ResolvedGroup {
        requested_id: group_id,
        group_id: resolved,
        redirected: resolved != group_id,
    }))
}
