//! Integration tests for the new-groups listing.

#[path = "test_utils/mod.rs"]
mod test_utils;

use anyhow::Result;
use chrono::{Duration, Utc};
use regroup::models::group;
use regroup::repositories::GroupRepository;
use regroup::repositories::group::{DEFAULT_NEW_GROUPS_LIMIT, DEFAULT_NEW_GROUPS_MINUTES};
use test_utils::*;

#[tokio::test]
async fn lists_recent_unresolved_groups_by_score() -> Result<()> {
    let db = setup_test_db().await?;
    let now = Utc::now().fixed_offset();
    let team = create_team(&db, 1).await?;
    let project = create_project(&db, &team).await?;
    let other_team = create_team(&db, 1).await?;
    let other_project = create_project(&db, &other_team).await?;

    let recent = |minutes: i64, score: i64| GroupSeed {
        active_at: Some(now - Duration::minutes(minutes)),
        score,
        ..Default::default()
    };

    let low = create_group(&db, &project, recent(5, 10)).await?;
    let high = create_group(&db, &project, recent(1, 20)).await?;
    create_group(
        &db,
        &project,
        GroupSeed {
            status: "resolved",
            ..recent(1, 50)
        },
    )
    .await?;
    create_group(&db, &project, recent(30, 40)).await?;
    create_group(&db, &other_project, recent(1, 60)).await?;

    let listed = GroupRepository::list_new_for_team(
        &db,
        team.id,
        DEFAULT_NEW_GROUPS_MINUTES,
        DEFAULT_NEW_GROUPS_LIMIT,
        now,
    )
    .await?;
    let ids: Vec<i64> = listed.iter().map(|group| group.id).collect();
    assert_eq!(ids, vec![high.id, low.id]);
    assert!(
        listed
            .iter()
            .all(|group| group.status == group::STATUS_UNRESOLVED)
    );

    let limited = GroupRepository::list_new_for_team(&db, team.id, 15, 1, now).await?;
    assert_eq!(limited.len(), 1);
    assert_eq!(limited[0].id, high.id);

    Ok(())
}

#[tokio::test]
async fn equal_scores_fall_back_to_newest_first_seen() -> Result<()> {
    let db = setup_test_db().await?;
    let now = Utc::now().fixed_offset();
    let project = create_default_project(&db).await?;

    let older = create_group(
        &db,
        &project,
        GroupSeed {
            first_seen: jan(1),
            active_at: Some(now),
            score: 7,
            ..Default::default()
        },
    )
    .await?;
    let newer = create_group(
        &db,
        &project,
        GroupSeed {
            first_seen: jan(2),
            active_at: Some(now),
            score: 7,
            ..Default::default()
        },
    )
    .await?;

    let listed = GroupRepository::list_new_for_team(&db, project.team_id, 15, 500, now).await?;
    let ids: Vec<i64> = listed.iter().map(|group| group.id).collect();
    assert_eq!(ids, vec![newer.id, older.id]);

    Ok(())
}

#[tokio::test]
async fn groups_pending_deletion_are_not_listed() -> Result<()> {
    let db = setup_test_db().await?;
    let now = Utc::now().fixed_offset();
    let project = create_default_project(&db).await?;
    let retired = create_group(
        &db,
        &project,
        GroupSeed {
            active_at: Some(now),
            ..Default::default()
        },
    )
    .await?;

    assert!(GroupRepository::mark_pending_deletion(&db, retired.id).await?);
    assert!(!GroupRepository::mark_pending_deletion(&db, retired.id).await?);

    let listed = GroupRepository::list_new_for_team(&db, project.team_id, 15, 10, now).await?;
    assert!(listed.is_empty());

    Ok(())
}

#[tokio::test]
async fn out_of_range_window_is_an_error() -> Result<()> {
    let db = setup_test_db().await?;
    let now = Utc::now().fixed_offset();
    let project = create_default_project(&db).await?;

    let result =
        GroupRepository::list_new_for_team(&db, project.team_id, 1_000_000_000_000, 10, now).await;
    assert!(result.is_err());

    Ok(())
}
