//! Migration to create the groups and group_hashes tables.
//!
//! A group aggregates events sharing a grouping signature. Group hashes route
//! incoming events to their owning group and are unique per project.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Groups::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Groups::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Groups::ProjectId).big_integer().not_null())
                    .col(
                        ColumnDef::new(Groups::Status)
                            .text()
                            .not_null()
                            .default("unresolved"),
                    )
                    .col(ColumnDef::new(Groups::Message).text().not_null())
                    .col(ColumnDef::new(Groups::Culprit).text().null())
                    .col(ColumnDef::new(Groups::Logger).text().not_null())
                    .col(ColumnDef::new(Groups::Level).text().not_null())
                    .col(ColumnDef::new(Groups::Platform).text().null())
                    .col(
                        ColumnDef::new(Groups::FirstSeen)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Groups::LastSeen)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Groups::ActiveAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Groups::TimesSeen)
                            .integer()
                            .not_null()
                            .default(1),
                    )
                    .col(
                        ColumnDef::new(Groups::NumComments)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Groups::Score)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(Groups::Data).json_binary().null())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_groups_project_id")
                            .from(Groups::Table, Groups::ProjectId)
                            .to(Projects::Table, Projects::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // Listing of recently active groups per project
        manager
            .create_index(
                Index::create()
                    .name("idx_groups_project_status_active_at")
                    .table(Groups::Table)
                    .col(Groups::ProjectId)
                    .col(Groups::Status)
                    .col(Groups::ActiveAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(GroupHashes::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(GroupHashes::Id)
                            .big_integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(GroupHashes::ProjectId)
                            .big_integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(GroupHashes::Hash).text().not_null())
                    .col(ColumnDef::new(GroupHashes::GroupId).big_integer().not_null())
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("uq_group_hashes_project_hash")
                    .table(GroupHashes::Table)
                    .col(GroupHashes::ProjectId)
                    .col(GroupHashes::Hash)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_group_hashes_group_id")
                    .table(GroupHashes::Table)
                    .col(GroupHashes::GroupId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(GroupHashes::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Groups::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Groups {
    Table,
    Id,
    ProjectId,
    Status,
    Message,
    Culprit,
    Logger,
    Level,
    Platform,
    FirstSeen,
    LastSeen,
    ActiveAt,
    TimesSeen,
    NumComments,
    Score,
    Data,
}

#[derive(DeriveIden)]
enum GroupHashes {
    Table,
    Id,
    ProjectId,
    Hash,
    GroupId,
}

#[derive(DeriveIden)]
enum Projects {
    Table,
    Id,
}
