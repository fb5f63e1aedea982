//! Migration to create the tables whose rows are owned by a group.
//!
//! Every table carries a `group_id`; most also carry a `project_id`. The unique
//! indexes here are what turn a reassignment during a merge into a conflict
//! when the destination group already owns an equivalent row.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

fn primary_id<T: IntoIden>(name: T) -> ColumnDef {
    ColumnDef::new(name)
        .big_integer()
        .not_null()
        .auto_increment()
        .primary_key()
        .to_owned()
}

fn timestamp<T: IntoIden>(name: T) -> ColumnDef {
    ColumnDef::new(name)
        .timestamp_with_time_zone()
        .not_null()
        .default(Expr::current_timestamp())
        .to_owned()
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(GroupTagValues::Table)
                    .if_not_exists()
                    .col(primary_id(GroupTagValues::Id))
                    .col(ColumnDef::new(GroupTagValues::ProjectId).big_integer().not_null())
                    .col(ColumnDef::new(GroupTagValues::GroupId).big_integer().not_null())
                    .col(
                        ColumnDef::new(GroupTagValues::EnvironmentId)
                            .big_integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(GroupTagValues::Key).text().not_null())
                    .col(ColumnDef::new(GroupTagValues::Value).text().not_null())
                    .col(
                        ColumnDef::new(GroupTagValues::TimesSeen)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(timestamp(GroupTagValues::FirstSeen))
                    .col(timestamp(GroupTagValues::LastSeen))
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("uq_group_tag_values_group_env_key_value")
                    .table(GroupTagValues::Table)
                    .col(GroupTagValues::GroupId)
                    .col(GroupTagValues::EnvironmentId)
                    .col(GroupTagValues::Key)
                    .col(GroupTagValues::Value)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Activities::Table)
                    .if_not_exists()
                    .col(primary_id(Activities::Id))
                    .col(ColumnDef::new(Activities::ProjectId).big_integer().not_null())
                    .col(ColumnDef::new(Activities::GroupId).big_integer().not_null())
                    .col(ColumnDef::new(Activities::Kind).text().not_null())
                    .col(ColumnDef::new(Activities::Ident).text().null())
                    .col(ColumnDef::new(Activities::UserId).big_integer().null())
                    .col(ColumnDef::new(Activities::Data).json_binary().null())
                    .col(timestamp(Activities::Datetime))
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_activities_group_id")
                    .table(Activities::Table)
                    .col(Activities::GroupId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(GroupAssignees::Table)
                    .if_not_exists()
                    .col(primary_id(GroupAssignees::Id))
                    .col(ColumnDef::new(GroupAssignees::ProjectId).big_integer().not_null())
                    .col(ColumnDef::new(GroupAssignees::GroupId).big_integer().not_null())
                    .col(ColumnDef::new(GroupAssignees::UserId).big_integer().not_null())
                    .col(timestamp(GroupAssignees::DateAdded))
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("uq_group_assignees_group_id")
                    .table(GroupAssignees::Table)
                    .col(GroupAssignees::GroupId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(GroupRuleStatuses::Table)
                    .if_not_exists()
                    .col(primary_id(GroupRuleStatuses::Id))
                    .col(
                        ColumnDef::new(GroupRuleStatuses::ProjectId)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(GroupRuleStatuses::GroupId)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(GroupRuleStatuses::RuleId)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(GroupRuleStatuses::Status)
                            .small_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(GroupRuleStatuses::LastActive)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(timestamp(GroupRuleStatuses::DateAdded))
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("uq_group_rule_statuses_rule_group")
                    .table(GroupRuleStatuses::Table)
                    .col(GroupRuleStatuses::RuleId)
                    .col(GroupRuleStatuses::GroupId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(GroupSubscriptions::Table)
                    .if_not_exists()
                    .col(primary_id(GroupSubscriptions::Id))
                    .col(
                        ColumnDef::new(GroupSubscriptions::ProjectId)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(GroupSubscriptions::GroupId)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(GroupSubscriptions::UserId)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(GroupSubscriptions::IsActive)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(GroupSubscriptions::Reason)
                            .small_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(timestamp(GroupSubscriptions::DateAdded))
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("uq_group_subscriptions_group_user")
                    .table(GroupSubscriptions::Table)
                    .col(GroupSubscriptions::GroupId)
                    .col(GroupSubscriptions::UserId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(EventMappings::Table)
                    .if_not_exists()
                    .col(primary_id(EventMappings::Id))
                    .col(ColumnDef::new(EventMappings::ProjectId).big_integer().not_null())
                    .col(ColumnDef::new(EventMappings::GroupId).big_integer().not_null())
                    .col(ColumnDef::new(EventMappings::EventId).text().not_null())
                    .col(timestamp(EventMappings::DateAdded))
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("uq_event_mappings_project_event")
                    .table(EventMappings::Table)
                    .col(EventMappings::ProjectId)
                    .col(EventMappings::EventId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Events::Table)
                    .if_not_exists()
                    .col(primary_id(Events::Id))
                    .col(ColumnDef::new(Events::ProjectId).big_integer().not_null())
                    .col(ColumnDef::new(Events::GroupId).big_integer().not_null())
                    .col(ColumnDef::new(Events::EventId).text().not_null())
                    .col(ColumnDef::new(Events::Message).text().not_null())
                    .col(ColumnDef::new(Events::Platform).text().null())
                    .col(timestamp(Events::Datetime))
                    .col(ColumnDef::new(Events::Data).json_binary().null())
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("uq_events_project_event")
                    .table(Events::Table)
                    .col(Events::ProjectId)
                    .col(Events::EventId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_events_group_id")
                    .table(Events::Table)
                    .col(Events::GroupId)
                    .col(Events::Id)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(UserReports::Table)
                    .if_not_exists()
                    .col(primary_id(UserReports::Id))
                    .col(ColumnDef::new(UserReports::ProjectId).big_integer().not_null())
                    .col(ColumnDef::new(UserReports::GroupId).big_integer().not_null())
                    .col(ColumnDef::new(UserReports::EventId).text().not_null())
                    .col(ColumnDef::new(UserReports::Name).text().not_null())
                    .col(ColumnDef::new(UserReports::Email).text().not_null())
                    .col(ColumnDef::new(UserReports::Comments).text().not_null())
                    .col(timestamp(UserReports::DateAdded))
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("uq_user_reports_project_event")
                    .table(UserReports::Table)
                    .col(UserReports::ProjectId)
                    .col(UserReports::EventId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(GroupRedirects::Table)
                    .if_not_exists()
                    .col(primary_id(GroupRedirects::Id))
                    .col(ColumnDef::new(GroupRedirects::GroupId).big_integer().not_null())
                    .col(
                        ColumnDef::new(GroupRedirects::PreviousGroupId)
                            .big_integer()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("uq_group_redirects_previous_group_id")
                    .table(GroupRedirects::Table)
                    .col(GroupRedirects::PreviousGroupId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_group_redirects_group_id")
                    .table(GroupRedirects::Table)
                    .col(GroupRedirects::GroupId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(GroupMeta::Table)
                    .if_not_exists()
                    .col(primary_id(GroupMeta::Id))
                    .col(ColumnDef::new(GroupMeta::GroupId).big_integer().not_null())
                    .col(ColumnDef::new(GroupMeta::Key).text().not_null())
                    .col(ColumnDef::new(GroupMeta::Value).text().not_null())
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("uq_group_meta_group_key")
                    .table(GroupMeta::Table)
                    .col(GroupMeta::GroupId)
                    .col(GroupMeta::Key)
                    .unique()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(GroupMeta::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(GroupRedirects::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(UserReports::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Events::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(EventMappings::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(GroupSubscriptions::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(GroupRuleStatuses::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(GroupAssignees::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Activities::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(GroupTagValues::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum GroupTagValues {
    Table,
    Id,
    ProjectId,
    GroupId,
    EnvironmentId,
    Key,
    Value,
    TimesSeen,
    FirstSeen,
    LastSeen,
}

#[derive(DeriveIden)]
enum Activities {
    Table,
    Id,
    ProjectId,
    GroupId,
    Kind,
    Ident,
    UserId,
    Data,
    Datetime,
}

#[derive(DeriveIden)]
enum GroupAssignees {
    Table,
    Id,
    ProjectId,
    GroupId,
    UserId,
    DateAdded,
}

#[derive(DeriveIden)]
enum GroupRuleStatuses {
    Table,
    Id,
    ProjectId,
    GroupId,
    RuleId,
    Status,
    LastActive,
    DateAdded,
}

#[derive(DeriveIden)]
enum GroupSubscriptions {
    Table,
    Id,
    ProjectId,
    GroupId,
    UserId,
    IsActive,
    Reason,
    DateAdded,
}

#[derive(DeriveIden)]
enum EventMappings {
    Table,
    Id,
    ProjectId,
    GroupId,
    EventId,
    DateAdded,
}

#[derive(DeriveIden)]
enum Events {
    Table,
    Id,
    ProjectId,
    GroupId,
    EventId,
    Message,
    Platform,
    Datetime,
    Data,
}

#[derive(DeriveIden)]
enum UserReports {
    Table,
    Id,
    ProjectId,
    GroupId,
    EventId,
    Name,
    Email,
    Comments,
    DateAdded,
}

#[derive(DeriveIden)]
enum GroupRedirects {
    Table,
    Id,
    GroupId,
    PreviousGroupId,
}

#[derive(DeriveIden)]
enum GroupMeta {
    Table,
    Id,
    GroupId,
    Key,
    Value,
}
