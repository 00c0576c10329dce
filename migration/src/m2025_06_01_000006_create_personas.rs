//! Migration to create the persona_profiles table.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(PersonaProfiles::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(PersonaProfiles::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(PersonaProfiles::AccountId)
                            .uuid()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(PersonaProfiles::Tone)
                            .text()
                            .not_null()
                            .default("friendly"),
                    )
                    .col(
                        ColumnDef::new(PersonaProfiles::VocabularyStyle)
                            .text()
                            .not_null()
                            .default("casual"),
                    )
                    .col(
                        ColumnDef::new(PersonaProfiles::EmotionalRange)
                            .text()
                            .not_null()
                            .default("warm"),
                    )
                    .col(
                        ColumnDef::new(PersonaProfiles::Boundaries)
                            .json_binary()
                            .null(),
                    )
                    .col(ColumnDef::new(PersonaProfiles::RedirectUrl).text().null())
                    .col(
                        ColumnDef::new(PersonaProfiles::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(PersonaProfiles::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_persona_profiles_account_id")
                            .from(PersonaProfiles::Table, PersonaProfiles::AccountId)
                            .to(Accounts::Table, Accounts::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // One persona per account
        manager
            .create_index(
                Index::create()
                    .name("idx_persona_profiles_account_id")
                    .table(PersonaProfiles::Table)
                    .col(PersonaProfiles::AccountId)
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
                    .name("idx_persona_profiles_account_id")
                    .to_owned(),
            )
            .await?;

        manager
            .drop_table(Table::drop().table(PersonaProfiles::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum PersonaProfiles {
    Table,
    Id,
    AccountId,
    Tone,
    VocabularyStyle,
    EmotionalRange,
    Boundaries,
    RedirectUrl,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum Accounts {
    Table,
    Id,
}
