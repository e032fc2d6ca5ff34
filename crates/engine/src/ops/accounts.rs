use chrono::Utc;
use sea_orm::{
    ActiveValue, JoinType, QueryFilter, QueryOrder, QuerySelect, RelationTrait, prelude::*,
    sea_query::OnConflict,
};
use uuid::Uuid;

use bank_api::AuthenticatedClient;

use crate::{
    Account, Balance, EngineError, Integration, ResultEngine, Transaction,
    accounts::{self, RemoteAccount},
    balances, requisition_accounts, transactions,
    util::normalize_optional_text,
};

use super::Engine;

impl Engine {
    /// All accounts of `integration`, in discovery order.
    pub async fn accounts(&self, integration: &Integration) -> ResultEngine<Vec<Account>> {
        accounts::Entity::find()
            .filter(accounts::Column::IntegrationId.eq(integration.id.to_string()))
            .order_by_asc(accounts::Column::CreatedAt)
            .all(&self.database)
            .await?
            .into_iter()
            .map(Account::try_from)
            .collect()
    }

    /// Find an account by its provider id.
    pub async fn account(
        &self,
        integration: &Integration,
        nordigen_id: Uuid,
    ) -> ResultEngine<Account> {
        self.account_model(integration, nordigen_id)
            .await
            .and_then(Account::try_from)
    }

    /// Accounts linked to the requisition with local id `requisition_id`.
    pub async fn requisition_accounts(&self, requisition_id: Uuid) -> ResultEngine<Vec<Account>> {
        accounts::Entity::find()
            .join(
                JoinType::InnerJoin,
                accounts::Relation::RequisitionAccounts.def(),
            )
            .filter(requisition_accounts::Column::RequisitionId.eq(requisition_id.to_string()))
            .order_by_asc(accounts::Column::CreatedAt)
            .all(&self.database)
            .await?
            .into_iter()
            .map(Account::try_from)
            .collect()
    }

    /// Set or clear the user label of an account.
    pub async fn set_account_alias(
        &self,
        integration: &Integration,
        nordigen_id: Uuid,
        alias: Option<&str>,
    ) -> ResultEngine<Account> {
        let model = self.account_model(integration, nordigen_id).await?;
        let model = accounts::ActiveModel {
            id: ActiveValue::Set(model.id),
            alias: ActiveValue::Set(normalize_optional_text(alias)),
            updated_at: ActiveValue::Set(Utc::now()),
            ..Default::default()
        }
        .update(&self.database)
        .await?;
        Account::try_from(model)
    }

    /// Latest balances of `account`, one per balance type.
    pub async fn balances(&self, account: &Account) -> ResultEngine<Vec<Balance>> {
        balances::Entity::find()
            .filter(balances::Column::AccountId.eq(account.id.to_string()))
            .order_by_asc(balances::Column::BalanceType)
            .all(&self.database)
            .await?
            .into_iter()
            .map(Balance::try_from)
            .collect()
    }

    /// Stored transactions of `account`, most recent booking first.
    ///
    /// Entries without a booking date come last.
    pub async fn transactions(
        &self,
        account: &Account,
        limit: Option<u64>,
    ) -> ResultEngine<Vec<Transaction>> {
        let mut query = transactions::Entity::find()
            .filter(transactions::Column::AccountId.eq(account.id.to_string()))
            .order_by_desc(transactions::Column::BookingDate)
            .order_by_desc(transactions::Column::CreatedAt)
            .order_by_asc(transactions::Column::NordigenId);
        if let Some(limit) = limit {
            query = query.limit(limit);
        }
        query
            .all(&self.database)
            .await?
            .into_iter()
            .map(Transaction::try_from)
            .collect()
    }

    async fn account_model(
        &self,
        integration: &Integration,
        nordigen_id: Uuid,
    ) -> ResultEngine<accounts::Model> {
        accounts::Entity::find()
            .filter(accounts::Column::IntegrationId.eq(integration.id.to_string()))
            .filter(accounts::Column::NordigenId.eq(nordigen_id.to_string()))
            .one(&self.database)
            .await?
            .ok_or_else(|| EngineError::KeyNotFound(format!("account {nordigen_id}")))
    }

    /// Create or update the local account for a provider account id.
    ///
    /// Only columns whose value changed are written; an up to date row causes
    /// no write at all.
    pub(super) async fn reconcile_account(
        &self,
        client: &AuthenticatedClient,
        integration: &Integration,
        nordigen_id: Uuid,
    ) -> ResultEngine<Account> {
        let metadata = client.account_metadata(nordigen_id).await?;
        let details = client.account_details(nordigen_id).await?;
        let institution = self
            .resolve_institution(client, &metadata.institution_id)
            .await?;
        let remote = RemoteAccount::new(institution.id, &metadata, &details)?;
        let now = Utc::now();

        let existing = accounts::Entity::find()
            .filter(accounts::Column::NordigenId.eq(nordigen_id.to_string()))
            .one(&self.database)
            .await?;
        let model = match existing {
            Some(model) => {
                let mut changes = remote.changes(&model);
                if !changes.is_changed() {
                    return Account::try_from(model);
                }
                tracing::debug!(account = %nordigen_id, "account changed remotely");
                changes.updated_at = ActiveValue::Set(now);
                changes.update(&self.database).await?
            }
            None => {
                accounts::Entity::insert(remote.into_new(integration.id, nordigen_id, now))
                    .on_conflict(
                        OnConflict::column(accounts::Column::NordigenId)
                            .do_nothing()
                            .to_owned(),
                    )
                    .exec_without_returning(&self.database)
                    .await?;
                tracing::info!(account = %nordigen_id, "discovered account");
                self.account_model(integration, nordigen_id).await?
            }
        };
        Account::try_from(model)
    }

    /// Associate an account with a requisition. Existing links are kept.
    pub(super) async fn link_account(
        &self,
        requisition_id: Uuid,
        account_id: Uuid,
    ) -> ResultEngine<()> {
        let link = requisition_accounts::ActiveModel {
            requisition_id: ActiveValue::Set(requisition_id.to_string()),
            account_id: ActiveValue::Set(account_id.to_string()),
        };
        requisition_accounts::Entity::insert(link)
            .on_conflict(
                OnConflict::columns([
                    requisition_accounts::Column::RequisitionId,
                    requisition_accounts::Column::AccountId,
                ])
                .do_nothing()
                .to_owned(),
            )
            .exec_without_returning(&self.database)
            .await?;
        Ok(())
    }
}
