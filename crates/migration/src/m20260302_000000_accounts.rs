//! Synchronized bank data.
//!
//! - `accounts`: bank accounts discovered through requisitions
//! - `requisition_accounts`: many-to-many link, re-linking reuses accounts
//! - `balances`: latest snapshot per (account, balance type)
//! - `transactions`: booked transactions, unique per (account, remote id)

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[derive(Iden)]
enum Integrations {
    Table,
    Id,
}

#[derive(Iden)]
enum Institutions {
    Table,
    Id,
}

#[derive(Iden)]
enum Requisitions {
    Table,
    Id,
}

#[derive(Iden)]
enum Accounts {
    Table,
    Id,
    IntegrationId,
    InstitutionId,
    NordigenId,
    Iban,
    Currency,
    Name,
    OwnerName,
    Product,
    Status,
    Alias,
    Metadata,
    Details,
    SyncedAt,
    CreatedAt,
    UpdatedAt,
}

#[derive(Iden)]
enum RequisitionAccounts {
    Table,
    RequisitionId,
    AccountId,
}

#[derive(Iden)]
enum Balances {
    Table,
    Id,
    AccountId,
    BalanceType,
    Amount,
    Currency,
    ReferenceDate,
    ApiData,
    SyncedAt,
    CreatedAt,
    UpdatedAt,
}

#[derive(Iden)]
enum Transactions {
    Table,
    Id,
    AccountId,
    NordigenId,
    BookingDate,
    ValueDate,
    Amount,
    Currency,
    ApiData,
    CreatedAt,
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Accounts::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Accounts::Id).string().not_null().primary_key())
                    .col(ColumnDef::new(Accounts::IntegrationId).string().not_null())
                    .col(ColumnDef::new(Accounts::InstitutionId).string().not_null())
                    .col(
                        ColumnDef::new(Accounts::NordigenId)
                            .string()
                            .not_null()
                            .unique_key(),
                    )
                    .col(ColumnDef::new(Accounts::Iban).string())
                    .col(ColumnDef::new(Accounts::Currency).string())
                    .col(ColumnDef::new(Accounts::Name).string())
                    .col(ColumnDef::new(Accounts::OwnerName).string())
                    .col(ColumnDef::new(Accounts::Product).string())
                    .col(ColumnDef::new(Accounts::Status).string())
                    .col(ColumnDef::new(Accounts::Alias).string())
                    .col(ColumnDef::new(Accounts::Metadata).json().not_null())
                    .col(ColumnDef::new(Accounts::Details).json().not_null())
                    .col(ColumnDef::new(Accounts::SyncedAt).timestamp_with_time_zone())
                    .col(
                        ColumnDef::new(Accounts::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Accounts::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-accounts-integration_id")
                            .from(Accounts::Table, Accounts::IntegrationId)
                            .to(Integrations::Table, Integrations::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-accounts-institution_id")
                            .from(Accounts::Table, Accounts::InstitutionId)
                            .to(Institutions::Table, Institutions::Id),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(RequisitionAccounts::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(RequisitionAccounts::RequisitionId)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(RequisitionAccounts::AccountId)
                            .string()
                            .not_null(),
                    )
                    .primary_key(
                        Index::create()
                            .col(RequisitionAccounts::RequisitionId)
                            .col(RequisitionAccounts::AccountId),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-requisition_accounts-requisition_id")
                            .from(RequisitionAccounts::Table, RequisitionAccounts::RequisitionId)
                            .to(Requisitions::Table, Requisitions::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-requisition_accounts-account_id")
                            .from(RequisitionAccounts::Table, RequisitionAccounts::AccountId)
                            .to(Accounts::Table, Accounts::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-requisition_accounts-account_id")
                    .table(RequisitionAccounts::Table)
                    .col(RequisitionAccounts::AccountId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Balances::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Balances::Id).string().not_null().primary_key())
                    .col(ColumnDef::new(Balances::AccountId).string().not_null())
                    .col(ColumnDef::new(Balances::BalanceType).string().not_null())
                    .col(ColumnDef::new(Balances::Amount).string().not_null())
                    .col(ColumnDef::new(Balances::Currency).string().not_null())
                    .col(ColumnDef::new(Balances::ReferenceDate).date())
                    .col(ColumnDef::new(Balances::ApiData).json().not_null())
                    .col(
                        ColumnDef::new(Balances::SyncedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Balances::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Balances::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-balances-account_id")
                            .from(Balances::Table, Balances::AccountId)
                            .to(Accounts::Table, Accounts::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-balances-account_id-balance_type")
                    .table(Balances::Table)
                    .col(Balances::AccountId)
                    .col(Balances::BalanceType)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(Transactions::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Transactions::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Transactions::AccountId).string().not_null())
                    .col(ColumnDef::new(Transactions::NordigenId).string().not_null())
                    .col(ColumnDef::new(Transactions::BookingDate).date())
                    .col(ColumnDef::new(Transactions::ValueDate).date())
                    .col(ColumnDef::new(Transactions::Amount).string().not_null())
                    .col(ColumnDef::new(Transactions::Currency).string().not_null())
                    .col(ColumnDef::new(Transactions::ApiData).json().not_null())
                    .col(
                        ColumnDef::new(Transactions::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-transactions-account_id")
                            .from(Transactions::Table, Transactions::AccountId)
                            .to(Accounts::Table, Accounts::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-transactions-account_id-nordigen_id")
                    .table(Transactions::Table)
                    .col(Transactions::AccountId)
                    .col(Transactions::NordigenId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-transactions-account_id-booking_date")
                    .table(Transactions::Table)
                    .col(Transactions::AccountId)
                    .col(Transactions::BookingDate)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Transactions::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Balances::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(RequisitionAccounts::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Accounts::Table).to_owned())
            .await?;
        Ok(())
    }
}
