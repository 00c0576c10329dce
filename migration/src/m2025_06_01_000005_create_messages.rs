//! Migration to create the messages table.
//!
//! Messages are append-only within a conversation; only `status` and `error`
//! move after insert. The unique `trigger_id` index is what makes
//! comment-triggered auto-DMs at-most-once.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Messages::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Messages::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Messages::ConversationId).uuid().not_null())
                    .col(
                        ColumnDef::new(Messages::SenderType)
                            .text()
                            .not_null()
                            .default("fan"),
                    )
                    .col(ColumnDef::new(Messages::SenderName).text().not_null())
                    .col(ColumnDef::new(Messages::Content).text().not_null())
                    .col(
                        ColumnDef::new(Messages::Status)
                            .text()
                            .not_null()
                            .default("pending"),
                    )
                    .col(ColumnDef::new(Messages::PlatformMessageId).text().null())
                    .col(ColumnDef::new(Messages::TriggerId).text().null())
                    .col(ColumnDef::new(Messages::Error).text().null())
                    .col(
                        ColumnDef::new(Messages::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_messages_conversation_id")
                            .from(Messages::Table, Messages::ConversationId)
                            .to(Conversations::Table, Conversations::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // Chronological listing within a conversation
        manager
            .create_index(
                Index::create()
                    .name("idx_messages_conversation_created")
                    .table(Messages::Table)
                    .col(Messages::ConversationId)
                    .col(Messages::CreatedAt)
                    .to_owned(),
            )
            .await?;

        // At most one outbound message per triggering comment; NULLs are
        // exempt on both Postgres and SQLite.
        manager
            .create_index(
                Index::create()
                    .name("idx_messages_trigger_id")
                    .table(Messages::Table)
                    .col(Messages::TriggerId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        // Inbound dedupe by platform-native id
        manager
            .create_index(
                Index::create()
                    .name("idx_messages_conversation_platform_message")
                    .table(Messages::Table)
                    .col(Messages::ConversationId)
                    .col(Messages::PlatformMessageId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx_messages_conversation_created")
                    .to_owned(),
            )
            .await?;

        manager
            .drop_index(Index::drop().name("idx_messages_trigger_id").to_owned())
            .await?;

        manager
            .drop_index(
                Index::drop()
                    .name("idx_messages_conversation_platform_message")
                    .to_owned(),
            )
            .await?;

        manager
            .drop_table(Table::drop().table(Messages::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Messages {
    Table,
    Id,
    ConversationId,
    SenderType,
    SenderName,
    Content,
    Status,
    PlatformMessageId,
    TriggerId,
    Error,
    CreatedAt,
}

#[derive(DeriveIden)]
enum Conversations {
    Table,
    Id,
}
