//! Integration tests for group rehashing and the deletion hand-off.

#[path = "test_utils/mod.rs"]
mod test_utils;

use std::collections::HashSet;

use anyhow::Result;
use regroup::audit::AuditEvent;
use regroup::deletion::{DeletionPipeline, QueueDeletionPipeline};
use regroup::grouping::{DefaultGroupingEngine, GroupingEngine};
use regroup::models::{environment, event, group, group_hash};
use regroup::queue::{KIND_DELETE_GROUP, RehashGroupTask};
use regroup::rehash::RehashOutcome;
use regroup::repositories::{GroupHashRepository, GroupRepository, TagRepository, TaskRepository};
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, Set};
use serde_json::json;
use test_utils::*;

async fn events_by_id(db: &sea_orm::DatabaseConnection, ids: &[i64]) -> Result<Vec<event::Model>> {
    Ok(event::Entity::find()
        .filter(event::Column::Id.is_in(ids.iter().copied()))
        .all(db)
        .await?)
}

#[tokio::test]
async fn rehash_moves_every_event_and_retires_the_group() -> Result<()> {
    let db = setup_test_db().await?;
    let project = create_default_project(&db).await?;
    let stale = create_group(&db, &project, GroupSeed::default()).await?;

    let mut ids = Vec::new();
    for message in ["a", "a", "b", "b", "c"] {
        ids.push(create_event(&db, &stale, message, None).await?.id);
    }
    group_hash::ActiveModel {
        project_id: Set(project.id),
        hash: Set("stale-hash".to_string()),
        group_id: Set(stale.id),
        ..Default::default()
    }
    .insert(&db)
    .await?;

    let harness = Harness::new(db.clone());
    let coordinator = harness.rehash_coordinator(2);
    let outcomes = harness.drive_rehash(&coordinator, stale.id).await?;

    assert_eq!(
        outcomes,
        vec![
            RehashOutcome::Rescheduled { processed: 2 },
            RehashOutcome::Rescheduled { processed: 2 },
            RehashOutcome::Rescheduled { processed: 1 },
            RehashOutcome::Retired { enqueued: true },
        ]
    );

    let events = events_by_id(&db, &ids).await?;
    assert!(events.iter().all(|event| event.group_id != stale.id));
    let groups: HashSet<i64> = events.iter().map(|event| event.group_id).collect();
    assert_eq!(groups.len(), 3);

    assert!(GroupHashRepository::list_for_group(&db, stale.id).await?.is_empty());
    assert_eq!(harness.deletion.requested(), vec![stale.id]);

    let audit = harness.audit.entries();
    assert_eq!(audit.len(), 1);
    assert_eq!(audit[0].event, AuditEvent::BulkDeleteExecuted);
    assert_eq!(audit[0].object_id, stale.id);
    assert_eq!(audit[0].model, "GroupHash");
    assert_eq!(audit[0].transaction_token.as_deref(), Some("rehash-tx"));

    Ok(())
}

#[tokio::test]
async fn replayed_rehash_after_retirement_enqueues_nothing() -> Result<()> {
    let db = setup_test_db().await?;
    let project = create_default_project(&db).await?;
    let stale = create_group(&db, &project, GroupSeed::default()).await?;
    create_event(&db, &stale, "only", None).await?;

    let harness = Harness::new(db.clone());
    let coordinator = harness.rehash_coordinator(10);
    harness.drive_rehash(&coordinator, stale.id).await?;

    let replay = coordinator
        .run(RehashGroupTask {
            group_id: stale.id,
            transaction_token: None,
        })
        .await?;

    assert_eq!(replay, RehashOutcome::Retired { enqueued: false });
    assert_eq!(harness.deletion.requested(), vec![stale.id]);
    assert_eq!(harness.audit.entries().len(), 1);

    Ok(())
}

#[tokio::test]
async fn rehashing_a_rehashed_group_keeps_its_events_together() -> Result<()> {
    let db = setup_test_db().await?;
    let project = create_default_project(&db).await?;
    let stale = create_group(&db, &project, GroupSeed::default()).await?;
    let first = create_event(&db, &stale, "same", None).await?;
    let second = create_event(&db, &stale, "same", None).await?;

    let harness = Harness::new(db.clone());
    let coordinator = harness.rehash_coordinator(10);
    harness.drive_rehash(&coordinator, stale.id).await?;

    let moved = events_by_id(&db, &[first.id, second.id]).await?;
    let regrouped = moved[0].group_id;
    assert_eq!(moved[1].group_id, regrouped);

    harness.drive_rehash(&coordinator, regrouped).await?;

    let again = events_by_id(&db, &[first.id, second.id]).await?;
    assert_eq!(again[0].group_id, again[1].group_id);
    assert_ne!(again[0].group_id, regrouped);
    assert_ne!(again[0].group_id, stale.id);

    Ok(())
}

#[tokio::test]
async fn custom_fingerprint_groups_events_regardless_of_message() -> Result<()> {
    let db = setup_test_db().await?;
    let project = create_default_project(&db).await?;
    let stale = create_group(&db, &project, GroupSeed::default()).await?;
    let data = json!({"fingerprint": ["database-unavailable"]});
    let first = create_event(&db, &stale, "timeout on db-1", Some(data.clone())).await?;
    let second = create_event(&db, &stale, "timeout on db-2", Some(data)).await?;
    let scalar = create_event(
        &db,
        &stale,
        "other",
        Some(json!({"fingerprint": "database-unavailable"})),
    )
    .await?;

    let harness = Harness::new(db.clone());
    let coordinator = harness.rehash_coordinator(10);
    harness.drive_rehash(&coordinator, stale.id).await?;

    let events = events_by_id(&db, &[first.id, second.id, scalar.id]).await?;
    let groups: HashSet<i64> = events.iter().map(|event| event.group_id).collect();
    assert_eq!(groups.len(), 1);

    let group = GroupRepository::find(&db, events[0].group_id).await?.unwrap();
    assert_eq!(group.times_seen, 3);
    assert_eq!(group.message, "timeout on db-1");

    Ok(())
}

#[tokio::test]
async fn tags_are_replicated_under_a_created_environment() -> Result<()> {
    let db = setup_test_db().await?;
    let project = create_default_project(&db).await?;
    let stale = create_group(&db, &project, GroupSeed::default()).await?;
    let tagged = create_event(
        &db,
        &stale,
        "boom",
        Some(json!({
            "tags": [["environment", "staging"], ["browser", "chrome"], ["logger", "checkout"]]
        })),
    )
    .await?;
    create_event(
        &db,
        &stale,
        "boom",
        Some(json!({"tags": [["environment", "staging"], ["browser", "chrome"]]})),
    )
    .await?;

    let harness = Harness::new(db.clone());
    let coordinator = harness.rehash_coordinator(10);
    harness.drive_rehash(&coordinator, stale.id).await?;

    let staging = environment::Entity::find()
        .filter(environment::Column::Name.eq("staging"))
        .all(&db)
        .await?;
    assert_eq!(staging.len(), 1);

    let moved = events_by_id(&db, &[tagged.id]).await?;
    let new_group = GroupRepository::find(&db, moved[0].group_id).await?.unwrap();
    assert_eq!(new_group.logger, "checkout");
    assert_eq!(new_group.times_seen, 2);

    let tags = TagRepository::list_for_group(&db, new_group.id).await?;
    let browser = tags
        .iter()
        .find(|tag| tag.key == "browser" && tag.value == "chrome")
        .unwrap();
    assert_eq!(browser.times_seen, 2);
    assert_eq!(browser.environment_id, staging[0].id);

    Ok(())
}

#[tokio::test]
async fn rehash_of_missing_group_is_a_no_op() -> Result<()> {
    let db = setup_test_db().await?;
    let harness = Harness::new(db);
    let coordinator = harness.rehash_coordinator(10);

    let outcome = coordinator
        .run(RehashGroupTask {
            group_id: 404,
            transaction_token: None,
        })
        .await?;

    assert_eq!(outcome, RehashOutcome::GroupNotFound);
    assert!(harness.queue.is_empty());
    assert!(harness.deletion.requested().is_empty());

    Ok(())
}

#[tokio::test]
async fn queue_deletion_pipeline_enqueues_exactly_once() -> Result<()> {
    let db = setup_test_db().await?;
    let project = create_default_project(&db).await?;
    let retired = create_group(&db, &project, GroupSeed::default()).await?;

    let pipeline = QueueDeletionPipeline::new(db.clone());
    assert!(pipeline.enqueue_delete(retired.id).await?);
    assert!(!pipeline.enqueue_delete(retired.id).await?);
    assert!(!pipeline.enqueue_delete(retired.id + 1).await?);

    let group = GroupRepository::find(&db, retired.id).await?.unwrap();
    assert_eq!(group.status, group::STATUS_PENDING_DELETION);
    let tasks = TaskRepository::list_by_kind(&db, KIND_DELETE_GROUP).await?;
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].payload["group_id"], retired.id);

    Ok(())
}

#[tokio::test]
async fn grouping_engine_reuses_claimed_hashes() -> Result<()> {
    let db = setup_test_db().await?;
    let project = create_default_project(&db).await?;
    let seed_group = create_group(&db, &project, GroupSeed::default()).await?;
    let event = create_event(&db, &seed_group, "boom", None).await?;

    let engine = DefaultGroupingEngine::new(db.clone());
    let hashes: Vec<String> = engine
        .hashes_from_fingerprint(&event, &["{{ default }}".to_string()])
        .iter()
        .map(|hash| engine.normalize_hash(hash))
        .collect();
    let defaults = regroup::grouping::GroupDefaults {
        message: event.message.clone(),
        platform: None,
        culprit: None,
        logger: "root".to_string(),
        level: "error".to_string(),
        first_seen: jan(3),
        last_seen: jan(3),
        data: None,
    };

    let created = engine
        .assign_event_to_group(&event, &hashes, defaults.clone())
        .await?;
    assert!(created.created);

    let again = engine
        .assign_event_to_group(
            &event,
            &hashes,
            regroup::grouping::GroupDefaults {
                last_seen: jan(7),
                ..defaults
            },
        )
        .await?;
    assert!(!again.created);
    assert_eq!(again.group.id, created.group.id);
    assert_eq!(again.group.times_seen, 2);
    assert_eq!(again.group.last_seen, jan(7));
    assert_eq!(
        group_hash::Entity::find()
            .filter(group_hash::Column::GroupId.eq(created.group.id))
            .count(&db)
            .await?,
        1
    );

    Ok(())
}
