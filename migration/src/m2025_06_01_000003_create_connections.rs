//! Migration to create the connections table.
//!
//! Connections store account-scoped OAuth credentials for one social
//! platform, with tokens held as AES-GCM ciphertext.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Connections::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Connections::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Connections::AccountId).uuid().not_null())
                    .col(ColumnDef::new(Connections::PlatformSlug).text().not_null())
                    .col(
                        ColumnDef::new(Connections::PlatformUserId)
                            .text()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Connections::DisplayName).text().null())
                    .col(
                        ColumnDef::new(Connections::Status)
                            .text()
                            .not_null()
                            .default("active"),
                    )
                    .col(
                        ColumnDef::new(Connections::AccessTokenCiphertext)
                            .binary()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Connections::RefreshTokenCiphertext)
                            .binary()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Connections::ExpiresAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(ColumnDef::new(Connections::Metadata).json_binary().null())
                    .col(
                        ColumnDef::new(Connections::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(Connections::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_connections_platform_slug")
                            .from(Connections::Table, Connections::PlatformSlug)
                            .to(Platforms::Table, Platforms::Slug)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_connections_account_id")
                            .from(Connections::Table, Connections::AccountId)
                            .to(Accounts::Table, Accounts::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // One credential per (account, platform, external identity)
        manager
            .create_index(
                Index::create()
                    .name("idx_connections_account_platform_user")
                    .table(Connections::Table)
                    .col(Connections::AccountId)
                    .col(Connections::PlatformSlug)
                    .col(Connections::PlatformUserId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_connections_account_id")
                    .table(Connections::Table)
                    .col(Connections::AccountId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx_connections_account_platform_user")
                    .to_owned(),
            )
            .await?;

        manager
            .drop_index(Index::drop().name("idx_connections_account_id").to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(Connections::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Connections {
    Table,
    Id,
    AccountId,
    PlatformSlug,
    PlatformUserId,
    DisplayName,
    Status,
    AccessTokenCiphertext,
    RefreshTokenCiphertext,
    ExpiresAt,
    Metadata,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Platforms {
    Table,
    Slug,
}

#[derive(DeriveIden)]
enum Accounts {
    Table,
    Id,
}
