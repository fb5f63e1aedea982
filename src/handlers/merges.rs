//! # Merge API Handlers

use axum::{
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
    response::Json,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::auth::OperatorAuth;
use crate::error::{ApiError, not_found, validation_error};
use crate::queue::{MergeGroupTask, Task};
use crate::repositories::GroupRepository;
use crate::server::AppState;

/// Request to merge one group into another
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct MergeRequest {
    /// Group whose records move; deleted once the merge finalizes
    #[schema(example = 41)]
    pub source_group_id: i64,
    /// Group that absorbs the source
    #[schema(example = 42)]
    pub destination_group_id: i64,
    /// Correlation token recorded on audit entries; generated when absent
    pub transaction_token: Option<String>,
}

/// Accepted merge
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct MergeAccepted {
    pub source_group_id: i64,
    pub destination_group_id: i64,
    pub transaction_token: String,
}

/// Enqueue a merge of `source_group_id` into `destination_group_id`
#[utoipa::path(
    post,
    path = "/v1/merges",
    security(("bearer_auth" = [])),
    request_body = MergeRequest,
    responses(
        (status = 202, description = "Merge queued", body = MergeAccepted),
        (status = 400, description = "Validation error", body = ApiError),
        (status = 401, description = "Unauthorized", body = ApiError),
        (status = 404, description = "Group not found", body = ApiError)
    ),
    tag = "merges"
)]
pub async fn create_merge(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
    payload: Result<Json<MergeRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<MergeAccepted>), ApiError> {
    let Json(request) = payload?;

    if request.source_group_id <= 0 || request.destination_group_id <= 0 {
        return Err(validation_error(
            "Group ids must be positive",
            serde_json::json!({
                "source_group_id": request.source_group_id,
                "destination_group_id": request.destination_group_id,
            }),
        ));
    }
    if request.source_group_id == request.destination_group_id {
        return Err(validation_error(
            "A group cannot be merged into itself",
            serde_json::json!({ "destination_group_id": "Must differ from source_group_id" }),
        ));
    }

    for id in [request.source_group_id, request.destination_group_id] {
        if GroupRepository::find(&state.db, id).await?.is_none() {
            return Err(not_found(&format!("Group {} not found", id)));
        }
    }

    let transaction_token = request
        .transaction_token
        .filter(|token| !token.is_empty())
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    state
        .queue
        .submit(Task::MergeGroup(MergeGroupTask::new(
            request.source_group_id,
            request.destination_group_id,
            Some(transaction_token.clone()),
        )))
        .await?;

    tracing::info!(
        old_group_id = request.source_group_id,
        new_group_id = request.destination_group_id,
        transaction_id = %transaction_token,
        "Merge requested"
    );

    Ok((
        StatusCode::ACCEPTED,
        Json(MergeAccepted {
            source_group_id: request.source_group_id,
            destination_group_id: request.destination_group_id,
            transaction_token,
        }),
    ))
}
