//! Migration to create the conversations table.
//!
//! One conversation per (account, platform, external participant). The
//! `last_processed_message_id` column is the responder's persisted cursor.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Conversations::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Conversations::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Conversations::AccountId).uuid().not_null())
                    .col(
                        ColumnDef::new(Conversations::PlatformSlug)
                            .text()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Conversations::ParticipantId)
                            .text()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Conversations::ParticipantUsername)
                            .text()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Conversations::ParticipantAvatarUrl)
                            .text()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Conversations::Status)
                            .text()
                            .not_null()
                            .default("active"),
                    )
                    .col(
                        ColumnDef::new(Conversations::AiEnabled)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(Conversations::MessageCount)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(Conversations::LastMessageAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Conversations::RedirectSent)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(Conversations::LastProcessedMessageId)
                            .text()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Conversations::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(Conversations::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_conversations_account_id")
                            .from(Conversations::Table, Conversations::AccountId)
                            .to(Accounts::Table, Accounts::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_conversations_platform_slug")
                            .from(Conversations::Table, Conversations::PlatformSlug)
                            .to(Platforms::Table, Platforms::Slug)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_conversations_account_platform_participant")
                    .table(Conversations::Table)
                    .col(Conversations::AccountId)
                    .col(Conversations::PlatformSlug)
                    .col(Conversations::ParticipantId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        // Listing is ordered by last activity
        manager
            .create_index(
                Index::create()
                    .name("idx_conversations_account_last_message")
                    .table(Conversations::Table)
                    .col(Conversations::AccountId)
                    .col(Conversations::LastMessageAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx_conversations_account_platform_participant")
                    .to_owned(),
            )
            .await?;

        manager
            .drop_index(
                Index::drop()
                    .name("idx_conversations_account_last_message")
                    .to_owned(),
            )
            .await?;

        manager
            .drop_table(Table::drop().table(Conversations::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Conversations {
    Table,
    Id,
    AccountId,
    PlatformSlug,
    ParticipantId,
    ParticipantUsername,
    ParticipantAvatarUrl,
    Status,
    AiEnabled,
    MessageCount,
    LastMessageAt,
    RedirectSent,
    LastProcessedMessageId,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Accounts {
    Table,
    Id,
}

#[derive(DeriveIden)]
enum Platforms {
    Table,
    Slug,
}
