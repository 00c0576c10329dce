//! Migration to create the oauth_states table.
//!
//! Short-lived CSRF state rows for the connect flow; rows are deleted on
//! callback or expire and are swept lazily.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(OauthStates::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(OauthStates::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(OauthStates::AccountId).uuid().not_null())
                    .col(ColumnDef::new(OauthStates::PlatformSlug).text().not_null())
                    .col(ColumnDef::new(OauthStates::State).text().not_null())
                    .col(ColumnDef::new(OauthStates::RedirectUri).text().null())
                    .col(
                        ColumnDef::new(OauthStates::ExpiresAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(OauthStates::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_oauth_states_account_platform_state")
                    .table(OauthStates::Table)
                    .col(OauthStates::AccountId)
                    .col(OauthStates::PlatformSlug)
                    .col(OauthStates::State)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_oauth_states_expires_at")
                    .table(OauthStates::Table)
                    .col(OauthStates::ExpiresAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(OauthStates::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum OauthStates {
    Table,
    Id,
    AccountId,
    PlatformSlug,
    State,
    RedirectUri,
    ExpiresAt,
    CreatedAt,
}
