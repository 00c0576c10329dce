//! Migration to create the platforms table.
//!
//! Platforms are the seeded catalog of social networks the service can talk
//! to. A platform row may exist without a registered adapter.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Platforms::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Platforms::Slug)
                            .text()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Platforms::DisplayName).text().not_null())
                    .col(
                        ColumnDef::new(Platforms::AuthStyle)
                            .text()
                            .not_null()
                            .default("bearer_header"),
                    )
                    .col(
                        ColumnDef::new(Platforms::SupportsComments)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(Platforms::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Platforms::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Platforms {
    Table,
    Slug,
    DisplayName,
    AuthStyle,
    SupportsComments,
    CreatedAt,
}
