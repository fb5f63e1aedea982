//! Integration tests for group merges against in-memory SQLite.

#[path = "test_utils/mod.rs"]
mod test_utils;

use anyhow::Result;
use regroup::audit::AuditEvent;
use regroup::merge::{MergeOutcome, RelatedKind};
use regroup::models::{event, group, group_assignee, group_redirect, group_tag_value};
use regroup::queue::MergeGroupTask;
use regroup::repositories::{GroupRepository, RedirectRepository, TagRepository};
use regroup::tsdb::TsdbModel;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, Set};
use test_utils::*;

fn kinds(outcomes: &[MergeOutcome]) -> Vec<RelatedKind> {
    outcomes
        .iter()
        .filter_map(|outcome| match outcome {
            MergeOutcome::Rescheduled { kind, .. } => Some(*kind),
            _ => None,
        })
        .collect()
}

async fn events_of(db: &sea_orm::DatabaseConnection, group_id: i64) -> Result<u64> {
    Ok(event::Entity::find()
        .filter(event::Column::GroupId.eq(group_id))
        .count(db)
        .await?)
}

#[tokio::test]
async fn merge_moves_records_and_reconciles_destination() -> Result<()> {
    let db = setup_test_db().await?;
    let project = create_default_project(&db).await?;
    let source = create_group(
        &db,
        &project,
        GroupSeed {
            first_seen: jan(1),
            last_seen: jan(10),
            times_seen: 5,
            num_comments: 1,
            ..Default::default()
        },
    )
    .await?;
    let destination = create_group(
        &db,
        &project,
        GroupSeed {
            first_seen: jan(5),
            last_seen: jan(20),
            times_seen: 3,
            num_comments: 2,
            ..Default::default()
        },
    )
    .await?;
    for message in ["a", "b", "c"] {
        create_event(&db, &source, message, None).await?;
    }

    let harness = Harness::new(db.clone());
    let coordinator = harness.merge_coordinator(1000);
    let outcomes = harness
        .drive_merge(
            &coordinator,
            MergeGroupTask::new(source.id, destination.id, Some("tx-1".to_string())),
        )
        .await?;

    assert_eq!(
        outcomes,
        vec![
            MergeOutcome::Rescheduled {
                kind: RelatedKind::Event,
                processed: 3
            },
            MergeOutcome::Finalized,
        ]
    );

    let merged = GroupRepository::find(&db, destination.id).await?.unwrap();
    assert_eq!(merged.times_seen, 8);
    assert_eq!(merged.num_comments, 3);
    assert_eq!(merged.first_seen, jan(1));
    assert_eq!(merged.last_seen, jan(20));

    assert!(GroupRepository::find(&db, source.id).await?.is_none());
    assert_eq!(
        RedirectRepository::find_target(&db, source.id).await?,
        Some(destination.id)
    );
    assert_eq!(events_of(&db, destination.id).await?, 3);
    assert_eq!(events_of(&db, source.id).await?, 0);

    let audit = harness.audit.entries();
    assert_eq!(audit.len(), 1);
    assert_eq!(audit[0].event, AuditEvent::DeleteExecuted);
    assert_eq!(audit[0].object_id, source.id);
    assert_eq!(audit[0].model, "Group");
    assert_eq!(audit[0].transaction_token.as_deref(), Some("tx-1"));

    Ok(())
}

#[tokio::test]
async fn merge_converges_within_batch_bound() -> Result<()> {
    let db = setup_test_db().await?;
    let project = create_default_project(&db).await?;
    let source = create_group(&db, &project, GroupSeed::default()).await?;
    let destination = create_group(&db, &project, GroupSeed::default()).await?;
    for index in 0..7 {
        create_event(&db, &source, &format!("event {index}"), None).await?;
    }

    let harness = Harness::new(db.clone());
    let coordinator = harness.merge_coordinator(3);
    let outcomes = harness
        .drive_merge(&coordinator, MergeGroupTask::new(source.id, destination.id, None))
        .await?;

    // ceil(7 / 3) batches plus the finalizing unit
    assert!(outcomes.len() <= 4, "took {} units", outcomes.len());
    assert_eq!(outcomes.last(), Some(&MergeOutcome::Finalized));
    assert_eq!(events_of(&db, destination.id).await?, 7);

    Ok(())
}

#[tokio::test]
async fn merge_drains_kinds_in_declared_order() -> Result<()> {
    let db = setup_test_db().await?;
    let project = create_default_project(&db).await?;
    let environment = create_environment(&db, &project, "production").await?;
    let source = create_group(&db, &project, GroupSeed::default()).await?;
    let destination = create_group(&db, &project, GroupSeed::default()).await?;

    create_event(&db, &source, "first", None).await?;
    create_assignee(&db, &source, 7).await?;
    create_tag_value(&db, &source, environment.id, "browser", "firefox", 2).await?;
    create_tag_value(&db, &source, environment.id, "os", "linux", 1).await?;

    let harness = Harness::new(db.clone());
    let coordinator = harness.merge_coordinator(100);
    let outcomes = harness
        .drive_merge(&coordinator, MergeGroupTask::new(source.id, destination.id, None))
        .await?;

    assert_eq!(
        kinds(&outcomes),
        vec![
            RelatedKind::GroupTagValue,
            RelatedKind::GroupAssignee,
            RelatedKind::Event
        ]
    );
    assert_eq!(outcomes.last(), Some(&MergeOutcome::Finalized));
    assert_eq!(
        TagRepository::list_for_group(&db, destination.id).await?.len(),
        2
    );

    Ok(())
}

#[tokio::test]
async fn conflicting_records_fold_counts_and_are_audited() -> Result<()> {
    let db = setup_test_db().await?;
    let project = create_default_project(&db).await?;
    let environment = create_environment(&db, &project, "production").await?;
    let source = create_group(
        &db,
        &project,
        GroupSeed {
            first_seen: jan(2),
            last_seen: jan(3),
            ..Default::default()
        },
    )
    .await?;
    let destination = create_group(
        &db,
        &project,
        GroupSeed {
            first_seen: jan(4),
            last_seen: jan(9),
            ..Default::default()
        },
    )
    .await?;

    let source_tag = create_tag_value(&db, &source, environment.id, "browser", "chrome", 4).await?;
    create_tag_value(&db, &destination, environment.id, "browser", "chrome", 6).await?;
    let source_assignee = create_assignee(&db, &source, 1).await?;
    create_assignee(&db, &destination, 2).await?;

    let harness = Harness::new(db.clone());
    let coordinator = harness.merge_coordinator(100);
    let outcomes = harness
        .drive_merge(
            &coordinator,
            MergeGroupTask::new(source.id, destination.id, Some("tx-conflict".to_string())),
        )
        .await?;
    assert_eq!(outcomes.last(), Some(&MergeOutcome::Finalized));

    let tags = TagRepository::list_for_group(&db, destination.id).await?;
    assert_eq!(tags.len(), 1);
    assert_eq!(tags[0].times_seen, 10);
    assert_eq!(tags[0].first_seen, jan(2));
    assert_eq!(tags[0].last_seen, jan(9));
    assert!(
        group_tag_value::Entity::find_by_id(source_tag.id)
            .one(&db)
            .await?
            .is_none()
    );

    let assignees = group_assignee::Entity::find()
        .filter(group_assignee::Column::GroupId.eq(destination.id))
        .all(&db)
        .await?;
    assert_eq!(assignees.len(), 1);
    assert_eq!(assignees[0].user_id, 2);

    let audit = harness.audit.entries();
    let deleted: Vec<(&str, i64)> = audit
        .iter()
        .map(|entry| (entry.model, entry.object_id))
        .collect();
    assert_eq!(
        deleted,
        vec![
            ("GroupTagValue", source_tag.id),
            ("GroupAssignee", source_assignee.id),
            ("Group", source.id),
        ]
    );
    assert!(
        audit
            .iter()
            .all(|entry| entry.transaction_token.as_deref() == Some("tx-conflict"))
    );

    Ok(())
}

#[tokio::test]
async fn counter_overflow_keeps_prior_destination_value() -> Result<()> {
    let db = setup_test_db().await?;
    let project = create_default_project(&db).await?;
    let source = create_group(
        &db,
        &project,
        GroupSeed {
            times_seen: 10,
            num_comments: 4,
            ..Default::default()
        },
    )
    .await?;
    let destination = create_group(
        &db,
        &project,
        GroupSeed {
            times_seen: i32::MAX - 1,
            num_comments: 1,
            ..Default::default()
        },
    )
    .await?;

    let harness = Harness::new(db.clone());
    let coordinator = harness.merge_coordinator(100);
    let outcomes = harness
        .drive_merge(&coordinator, MergeGroupTask::new(source.id, destination.id, None))
        .await?;
    assert_eq!(outcomes, vec![MergeOutcome::Finalized]);

    let merged = GroupRepository::find(&db, destination.id).await?.unwrap();
    assert_eq!(merged.times_seen, i32::MAX - 1);
    assert_eq!(merged.num_comments, 5);
    assert!(GroupRepository::find(&db, source.id).await?.is_none());

    Ok(())
}

#[tokio::test]
async fn replayed_merge_units_leave_state_unchanged() -> Result<()> {
    let db = setup_test_db().await?;
    let project = create_default_project(&db).await?;
    let source = create_group(
        &db,
        &project,
        GroupSeed {
            times_seen: 2,
            ..Default::default()
        },
    )
    .await?;
    let destination = create_group(
        &db,
        &project,
        GroupSeed {
            times_seen: 3,
            ..Default::default()
        },
    )
    .await?;
    create_event(&db, &source, "only", None).await?;

    let harness = Harness::new(db.clone());
    let coordinator = harness.merge_coordinator(100);
    let task = MergeGroupTask::new(source.id, destination.id, None);

    // The first unit is delivered twice before its continuation runs.
    assert!(matches!(
        coordinator.run(task.clone()).await?,
        MergeOutcome::Rescheduled { .. }
    ));
    assert_eq!(coordinator.run(task.clone()).await?, MergeOutcome::Finalized);
    let continuation = harness.queue.pop();
    assert!(continuation.is_some());
    let outcomes = harness
        .drive_merge(&coordinator, task.continuation())
        .await?;
    assert_eq!(outcomes, vec![MergeOutcome::GroupNotFound]);

    // A late replay of the original trigger is also a no-op.
    assert_eq!(coordinator.run(task).await?, MergeOutcome::GroupNotFound);

    let merged = GroupRepository::find(&db, destination.id).await?.unwrap();
    assert_eq!(merged.times_seen, 5);
    assert_eq!(events_of(&db, destination.id).await?, 1);
    assert_eq!(group_redirect::Entity::find().count(&db).await?, 1);
    assert!(harness.queue.is_empty());

    Ok(())
}

#[tokio::test]
async fn malformed_and_missing_groups_are_terminal_no_ops() -> Result<()> {
    let db = setup_test_db().await?;
    let project = create_default_project(&db).await?;
    let group = create_group(&db, &project, GroupSeed::default()).await?;

    let harness = Harness::new(db.clone());
    let coordinator = harness.merge_coordinator(100);

    let missing_source = MergeGroupTask {
        source_group_id: None,
        destination_group_id: Some(group.id),
        transaction_token: None,
        resumed: false,
    };
    assert_eq!(coordinator.run(missing_source).await?, MergeOutcome::Malformed);

    let into_itself = MergeGroupTask::new(group.id, group.id, None);
    assert_eq!(coordinator.run(into_itself).await?, MergeOutcome::Malformed);

    let unknown_destination = MergeGroupTask::new(group.id, group.id + 100, None);
    assert_eq!(
        coordinator.run(unknown_destination).await?,
        MergeOutcome::GroupNotFound
    );

    assert!(GroupRepository::find(&db, group.id).await?.is_some());
    assert!(harness.queue.is_empty());
    assert!(harness.audit.entries().is_empty());

    Ok(())
}

#[tokio::test]
async fn existing_redirects_follow_the_merge() -> Result<()> {
    let db = setup_test_db().await?;
    let project = create_default_project(&db).await?;
    let source = create_group(&db, &project, GroupSeed::default()).await?;
    let destination = create_group(&db, &project, GroupSeed::default()).await?;

    // An older merge left 999 pointing at the source.
    group_redirect::ActiveModel {
        previous_group_id: Set(999),
        group_id: Set(source.id),
        ..Default::default()
    }
    .insert(&db)
    .await?;

    let harness = Harness::new(db.clone());
    let coordinator = harness.merge_coordinator(100);
    let outcomes = harness
        .drive_merge(&coordinator, MergeGroupTask::new(source.id, destination.id, None))
        .await?;

    assert_eq!(kinds(&outcomes), vec![RelatedKind::GroupRedirect]);
    assert_eq!(RedirectRepository::resolve(&db, 999).await?, Some(destination.id));
    assert_eq!(
        RedirectRepository::resolve(&db, source.id).await?,
        Some(destination.id)
    );

    Ok(())
}

#[tokio::test]
async fn finalize_merges_time_series_and_features() -> Result<()> {
    let db = setup_test_db().await?;
    let project = create_default_project(&db).await?;
    let environment = create_environment(&db, &project, "production").await?;
    let source = create_group(&db, &project, GroupSeed::default()).await?;
    let destination = create_group(&db, &project, GroupSeed::default()).await?;

    let harness = Harness::new(db.clone());
    harness.tsdb.incr(TsdbModel::Group, source.id, None, 0, 4).await;
    harness
        .tsdb
        .incr(TsdbModel::Group, source.id, Some(environment.id), 0, 3)
        .await;
    harness.tsdb.incr(TsdbModel::Group, destination.id, None, 0, 1).await;
    harness
        .tsdb
        .record_distinct(TsdbModel::UsersAffectedByGroup, source.id, None, 0, "user-a")
        .await;
    harness
        .tsdb
        .record_distinct(TsdbModel::UsersAffectedByGroup, destination.id, None, 0, "user-b")
        .await;
    harness
        .tsdb
        .record_frequency(TsdbModel::FrequentReleasesByGroup, source.id, None, 0, "1.0.0", 2)
        .await;
    harness.features.record(source.id, "sig-a").await;
    harness.features.record(destination.id, "sig-b").await;

    let coordinator = harness.merge_coordinator(100);
    let outcomes = harness
        .drive_merge(&coordinator, MergeGroupTask::new(source.id, destination.id, None))
        .await?;
    assert_eq!(outcomes, vec![MergeOutcome::Finalized]);

    assert_eq!(harness.tsdb.total(TsdbModel::Group, destination.id, None).await, 5);
    assert_eq!(
        harness
            .tsdb
            .total(TsdbModel::Group, destination.id, Some(environment.id))
            .await,
        3
    );
    assert_eq!(harness.tsdb.total(TsdbModel::Group, source.id, None).await, 0);
    assert_eq!(
        harness
            .tsdb
            .distinct_count(TsdbModel::UsersAffectedByGroup, destination.id, None)
            .await,
        2
    );
    assert_eq!(
        harness
            .tsdb
            .frequencies(TsdbModel::FrequentReleasesByGroup, destination.id, None)
            .await
            .get("1.0.0"),
        Some(&2)
    );

    let signatures = harness.features.signatures(destination.id).await;
    assert!(signatures.contains("sig-a"));
    assert!(signatures.contains("sig-b"));
    assert!(harness.features.signatures(source.id).await.is_empty());

    Ok(())
}

#[tokio::test]
async fn records_of_other_projects_are_left_alone() -> Result<()> {
    let db = setup_test_db().await?;
    let project = create_default_project(&db).await?;
    let source = create_group(&db, &project, GroupSeed::default()).await?;
    let destination = create_group(&db, &project, GroupSeed::default()).await?;
    let stray = create_event(&db, &source, "stray", None).await?;

    // Corrupt row: owned by the source but filed under another project.
    let mut active: event::ActiveModel = stray.into();
    active.project_id = Set(project.id + 1);
    let stray = active.update(&db).await?;

    let harness = Harness::new(db.clone());
    let coordinator = harness.merge_coordinator(100);
    let outcomes = harness
        .drive_merge(&coordinator, MergeGroupTask::new(source.id, destination.id, None))
        .await?;

    assert_eq!(outcomes, vec![MergeOutcome::Finalized]);
    let stray = event::Entity::find_by_id(stray.id).one(&db).await?.unwrap();
    assert_eq!(stray.group_id, source.id);
    assert!(
        group::Entity::find_by_id(source.id)
            .one(&db)
            .await?
            .is_none()
    );

    Ok(())
}
