//! End-to-end HTTP tests over an in-memory database.

#[path = "test_utils/mod.rs"]
mod test_utils;

use std::sync::Arc;

use anyhow::Result;
use axum::{
    body::{Body, to_bytes},
    http::{Request, StatusCode},
};
use chrono::Utc;
use regroup::config::AppConfig;
use regroup::queue::{MemoryTaskQueue, Task};
use regroup::repositories::RedirectRepository;
use regroup::server::{AppState, create_app};
use sea_orm::DatabaseConnection;
use serde_json::{Value, json};
use test_utils::*;
use tower::ServiceExt;

const TOKEN: &str = "api-test-token";

fn app(db: DatabaseConnection, queue: Arc<MemoryTaskQueue>) -> axum::Router {
    create_app(AppState {
        config: Arc::new(AppConfig {
            operator_tokens: vec![TOKEN.to_string()],
            ..Default::default()
        }),
        db,
        queue,
    })
}

fn authorized(method: &str, uri: &str, body: Body) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("authorization", format!("Bearer {}", TOKEN))
        .header("content-type", "application/json")
        .body(body)
        .unwrap()
}

async fn json_body(response: axum::response::Response) -> Result<Value> {
    let bytes = to_bytes(response.into_body(), usize::MAX).await?;
    Ok(serde_json::from_slice(&bytes)?)
}

#[tokio::test]
async fn merge_request_enqueues_a_unit() -> Result<()> {
    let db = setup_test_db().await?;
    let project = create_default_project(&db).await?;
    let source = create_group(&db, &project, GroupSeed::default()).await?;
    let destination = create_group(&db, &project, GroupSeed::default()).await?;
    let queue = Arc::new(MemoryTaskQueue::new());

    let body = json!({
        "source_group_id": source.id,
        "destination_group_id": destination.id,
        "transaction_token": "tx-api"
    });
    let response = app(db, queue.clone())
        .oneshot(authorized("POST", "/v1/merges", Body::from(body.to_string())))
        .await?;

    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let accepted = json_body(response).await?;
    assert_eq!(accepted["transaction_token"], "tx-api");

    match queue.pop() {
        Some(Task::MergeGroup(task)) => {
            assert_eq!(task.source_group_id, Some(source.id));
            assert_eq!(task.destination_group_id, Some(destination.id));
            assert!(!task.resumed);
        }
        other => panic!("unexpected queue content {other:?}"),
    }

    Ok(())
}

#[tokio::test]
async fn merge_of_unknown_group_is_not_found() -> Result<()> {
    let db = setup_test_db().await?;
    let project = create_default_project(&db).await?;
    let destination = create_group(&db, &project, GroupSeed::default()).await?;
    let queue = Arc::new(MemoryTaskQueue::new());

    let body = json!({"source_group_id": 9999, "destination_group_id": destination.id});
    let response = app(db, queue.clone())
        .oneshot(authorized("POST", "/v1/merges", Body::from(body.to_string())))
        .await?;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert!(queue.is_empty());

    Ok(())
}

#[tokio::test]
async fn rehash_request_enqueues_a_unit() -> Result<()> {
    let db = setup_test_db().await?;
    let project = create_default_project(&db).await?;
    let group = create_group(&db, &project, GroupSeed::default()).await?;
    let queue = Arc::new(MemoryTaskQueue::new());

    let response = app(db.clone(), queue.clone())
        .oneshot(authorized(
            "POST",
            &format!("/v1/groups/{}/rehash", group.id),
            Body::empty(),
        ))
        .await?;
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    assert!(matches!(queue.pop(), Some(Task::RehashGroupEvents(task)) if task.group_id == group.id));

    let missing = app(db, queue.clone())
        .oneshot(authorized("POST", "/v1/groups/424242/rehash", Body::empty()))
        .await?;
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
    assert!(queue.is_empty());

    Ok(())
}

#[tokio::test]
async fn redirects_and_listing_are_served() -> Result<()> {
    let db = setup_test_db().await?;
    let project = create_default_project(&db).await?;
    let live = create_group(
        &db,
        &project,
        GroupSeed {
            active_at: Some(Utc::now().fixed_offset()),
            ..Default::default()
        },
    )
    .await?;
    RedirectRepository::insert_if_absent(&db, 77, live.id).await?;
    let queue = Arc::new(MemoryTaskQueue::new());

    let response = app(db.clone(), queue.clone())
        .oneshot(authorized("GET", "/v1/redirects/77", Body::empty()))
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let resolved = json_body(response).await?;
    assert_eq!(resolved["group_id"], live.id);
    assert_eq!(resolved["redirected"], true);

    let response = app(db.clone(), queue.clone())
        .oneshot(authorized("GET", "/v1/redirects/78", Body::empty()))
        .await?;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app(db, queue)
        .oneshot(authorized(
            "GET",
            &format!("/v1/teams/{}/groups/new?minutes=15", project.team_id),
            Body::empty(),
        ))
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let listed = json_body(response).await?;
    assert_eq!(listed.as_array().map(Vec::len), Some(1));
    assert_eq!(listed[0]["id"], live.id);

    Ok(())
}
