//! Migration to create the response_jobs table.
//!
//! Response jobs are the durable units of auto-responder work, claimed and
//! executed by the background executor.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(ResponseJobs::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ResponseJobs::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(ResponseJobs::AccountId).uuid().not_null())
                    .col(
                        ColumnDef::new(ResponseJobs::PlatformSlug)
                            .text()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ResponseJobs::ConnectionId)
                            .uuid()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ResponseJobs::Status)
                            .text()
                            .not_null()
                            .default("queued"),
                    )
                    .col(
                        ColumnDef::new(ResponseJobs::Priority)
                            .small_integer()
                            .not_null()
                            .default(30),
                    )
                    .col(
                        ColumnDef::new(ResponseJobs::Attempts)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(ResponseJobs::ScheduledAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ResponseJobs::RetryAfter)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(ResponseJobs::StartedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(ResponseJobs::FinishedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(ColumnDef::new(ResponseJobs::Error).json_binary().null())
                    .col(
                        ColumnDef::new(ResponseJobs::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(ResponseJobs::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_response_jobs_connection_id")
                            .from(ResponseJobs::Table, ResponseJobs::ConnectionId)
                            .to(Connections::Table, Connections::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_response_jobs_account_id")
                            .from(ResponseJobs::Table, ResponseJobs::AccountId)
                            .to(Accounts::Table, Accounts::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_response_jobs_status_scheduled")
                    .table(ResponseJobs::Table)
                    .col(ResponseJobs::Status)
                    .col(ResponseJobs::ScheduledAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_response_jobs_connection_id")
                    .table(ResponseJobs::Table)
                    .col(ResponseJobs::ConnectionId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx_response_jobs_status_scheduled")
                    .to_owned(),
            )
            .await?;

        manager
            .drop_index(
                Index::drop()
                    .name("idx_response_jobs_connection_id")
                    .to_owned(),
            )
            .await?;

        manager
            .drop_table(Table::drop().table(ResponseJobs::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum ResponseJobs {
    Table,
    Id,
    AccountId,
    PlatformSlug,
    ConnectionId,
    Status,
    Priority,
    Attempts,
    ScheduledAt,
    RetryAfter,
    StartedAt,
    FinishedAt,
    Error,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Connections {
    Table,
    Id,
}

#[derive(DeriveIden)]
enum Accounts {
    Table,
    Id,
}
