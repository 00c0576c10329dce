//! Database migrations for the Engage API.
//!
//! This module contains all database migrations using SeaORM Migration.

pub use sea_orm_migration::prelude::*;

mod m2025_06_01_000001_create_accounts;
mod m2025_06_01_000002_create_platforms;
mod m2025_06_01_000003_create_connections;
mod m2025_06_01_000004_create_conversations;
mod m2025_06_01_000005_create_messages;
mod m2025_06_01_000006_create_personas;
mod m2025_06_01_000007_create_response_jobs;
mod m2025_06_02_000100_add_response_job_pending_guard;
mod m2025_06_02_000200_create_oauth_states;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m2025_06_01_000001_create_accounts::Migration),
            Box::new(m2025_06_01_000002_create_platforms::Migration),
            Box::new(m2025_06_01_000003_create_connections::Migration),
            Box::new(m2025_06_01_000004_create_conversations::Migration),
            Box::new(m2025_06_01_000005_create_messages::Migration),
            Box::new(m2025_06_01_000006_create_personas::Migration),
            Box::new(m2025_06_01_000007_create_response_jobs::Migration),
            Box::new(m2025_06_02_000100_add_response_job_pending_guard::Migration),
            Box::new(m2025_06_02_000200_create_oauth_states::Migration),
        ]
    }
}
