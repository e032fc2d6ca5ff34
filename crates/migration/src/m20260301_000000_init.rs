//! Initial schema: credentials and bank-linking sessions.
//!
//! - `integrations`: one row per provider credential pair
//! - `tokens`: cached access/refresh tokens, one per (integration, type)
//! - `institutions`: cached bank metadata
//! - `requisitions`: bank-linking sessions

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

// ─────────────────────────────────────────────────────────────────────────────
// Table identifiers
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Iden)]
enum Integrations {
    Table,
    Id,
    NordigenId,
    CreatedAt,
    UpdatedAt,
}

#[derive(Iden)]
enum Tokens {
    Table,
    Id,
    IntegrationId,
    TokenType,
    Value,
    Expires,
    CreatedAt,
    UpdatedAt,
}

#[derive(Iden)]
enum Institutions {
    Table,
    Id,
    NordigenId,
    Name,
    ApiData,
    CreatedAt,
    UpdatedAt,
}

#[derive(Iden)]
enum Requisitions {
    Table,
    Id,
    IntegrationId,
    InstitutionId,
    NordigenId,
    ReferenceId,
    Link,
    Status,
    MaxHistoricalDays,
    Completed,
    ApiData,
    CreatedAt,
    UpdatedAt,
}

// ─────────────────────────────────────────────────────────────────────────────
// Migration implementation
// ─────────────────────────────────────────────────────────────────────────────

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // ───────────────────────────────────────────────────────────────────
        // 1. Integrations
        // ───────────────────────────────────────────────────────────────────
        manager
            .create_table(
                Table::create()
                    .table(Integrations::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Integrations::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(Integrations::NordigenId)
                            .string()
                            .not_null()
                            .unique_key(),
                    )
                    .col(
                        ColumnDef::new(Integrations::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Integrations::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        // ───────────────────────────────────────────────────────────────────
        // 2. Tokens
        // ───────────────────────────────────────────────────────────────────
        manager
            .create_table(
                Table::create()
                    .table(Tokens::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Tokens::Id).string().not_null().primary_key())
                    .col(ColumnDef::new(Tokens::IntegrationId).string().not_null())
                    .col(ColumnDef::new(Tokens::TokenType).string().not_null())
                    .col(ColumnDef::new(Tokens::Value).text().not_null())
                    .col(
                        ColumnDef::new(Tokens::Expires)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Tokens::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Tokens::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-tokens-integration_id")
                            .from(Tokens::Table, Tokens::IntegrationId)
                            .to(Integrations::Table, Integrations::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-tokens-integration_id-token_type")
                    .table(Tokens::Table)
                    .col(Tokens::IntegrationId)
                    .col(Tokens::TokenType)
                    .unique()
                    .to_owned(),
            )
            .await?;

        // ───────────────────────────────────────────────────────────────────
        // 3. Institutions
        // ───────────────────────────────────────────────────────────────────
        manager
            .create_table(
                Table::create()
                    .table(Institutions::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Institutions::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(Institutions::NordigenId)
                            .string()
                            .not_null()
                            .unique_key(),
                    )
                    .col(ColumnDef::new(Institutions::Name).string().not_null())
                    .col(ColumnDef::new(Institutions::ApiData).json().not_null())
                    .col(
                        ColumnDef::new(Institutions::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Institutions::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        // ───────────────────────────────────────────────────────────────────
        // 4. Requisitions
        // ───────────────────────────────────────────────────────────────────
        manager
            .create_table(
                Table::create()
                    .table(Requisitions::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Requisitions::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Requisitions::IntegrationId).string().not_null())
                    .col(ColumnDef::new(Requisitions::InstitutionId).string().not_null())
                    .col(
                        ColumnDef::new(Requisitions::NordigenId)
                            .string()
                            .not_null()
                            .unique_key(),
                    )
                    .col(
                        ColumnDef::new(Requisitions::ReferenceId)
                            .string()
                            .not_null()
                            .unique_key(),
                    )
                    .col(ColumnDef::new(Requisitions::Link).string().not_null())
                    .col(ColumnDef::new(Requisitions::Status).string().not_null())
                    .col(
                        ColumnDef::new(Requisitions::MaxHistoricalDays)
                            .integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Requisitions::Completed)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(ColumnDef::new(Requisitions::ApiData).json().not_null())
                    .col(
                        ColumnDef::new(Requisitions::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Requisitions::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-requisitions-integration_id")
                            .from(Requisitions::Table, Requisitions::IntegrationId)
                            .to(Integrations::Table, Integrations::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-requisitions-institution_id")
                            .from(Requisitions::Table, Requisitions::InstitutionId)
                            .to(Institutions::Table, Institutions::Id),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-requisitions-integration_id")
                    .table(Requisitions::Table)
                    .col(Requisitions::IntegrationId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // Drop in reverse order of creation (respecting FK dependencies)
        manager
            .drop_table(Table::drop().table(Requisitions::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Institutions::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Tokens::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Integrations::Table).to_owned())
            .await?;
        Ok(())
    }
}
