//! Database migrations for the regroup service.
//!
//! This module contains all database migrations using SeaORM Migration.

pub use sea_orm_migration::prelude::*;

mod m2025_01_10_000001_create_teams_and_projects;
mod m2025_01_10_000002_create_groups;
mod m2025_01_10_000003_create_group_related_records;
mod m2025_01_10_000004_create_tasks;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m2025_01_10_000001_create_teams_and_projects::Migration),
            Box::new(m2025_01_10_000002_create_groups::Migration),
            Box::new(m2025_01_10_000003_create_group_related_records::Migration),
            Box::new(m2025_01_10_000004_create_tasks::Migration),
        ]
    }
}
