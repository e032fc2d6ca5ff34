//! Synchronization of balances and booked transactions.

use std::collections::HashSet;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use sea_orm::{
    ActiveValue, ConnectionTrait, JoinType, QueryFilter, QueryOrder, QuerySelect, RelationTrait,
    TransactionTrait, prelude::*, sea_query::OnConflict,
};
use uuid::Uuid;

use bank_api::{AuthenticatedClient, TransactionData};

use crate::{
    Account, EngineError, Integration, Requisition, ResultEngine, accounts, balances,
    requisition_accounts, requisitions, transactions,
};

use super::{Engine, with_tx};

/// Rows per bulk insert statement, well under SQLite's bind parameter limit.
const INSERT_CHUNK: usize = 500;
/// Ids per `IN (...)` lookup of already stored transactions.
const LOOKUP_CHUNK: usize = 500;

/// Which requisitions a sync run covers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SyncSelector {
    All,
    /// Provider requisition ids. Every id must be known locally.
    Requisitions(Vec<Uuid>),
}

/// How far back transactions are fetched for an account.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HistoryPolicy {
    /// Everything the most recent linked requisition grants access to.
    FullHistory,
    /// The last `n` days.
    FixedWindow(u32),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SyncCmd {
    pub selector: SyncSelector,
    /// Accounts synced more recently than this are skipped.
    pub max_age: Duration,
    pub history: HistoryPolicy,
    pub transactions: bool,
}

impl SyncCmd {
    /// Sync every requisition that was not synced in the last `max_age`.
    pub fn all(max_age: Duration, history: HistoryPolicy) -> Self {
        Self {
            selector: SyncSelector::All,
            max_age,
            history,
            transactions: true,
        }
    }
}

/// Outcome of a single account sync.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AccountSyncSummary {
    pub balances: usize,
    /// Transactions inserted by this run.
    pub transactions: usize,
    /// Booked entries dropped for lacking a provider id.
    pub skipped: usize,
    /// Number of transaction fetch windows requested.
    pub windows: usize,
}

/// Outcome of a sync run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub requisitions: usize,
    pub accounts_synced: usize,
    pub accounts_skipped: usize,
    pub balances: usize,
    pub transactions: usize,
}

impl SyncReport {
    fn add(&mut self, summary: AccountSyncSummary) {
        self.accounts_synced += 1;
        self.balances += summary.balances;
        self.transactions += summary.transactions;
    }
}

impl Engine {
    /// Synchronize the requisitions picked by `cmd.selector`.
    ///
    /// The first failing requisition or account aborts the whole run. The
    /// failure is logged with the offending id and returned.
    pub async fn sync(&self, integration: &Integration, cmd: &SyncCmd) -> ResultEngine<SyncReport> {
        let selected = self.select_requisitions(integration, &cmd.selector).await?;
        let mut report = SyncReport::default();
        if selected.is_empty() {
            tracing::info!("no requisitions to sync");
            return Ok(report);
        }

        let client = self.client(integration).await?;
        let threshold = Utc::now() - cmd.max_age;
        for requisition in &selected {
            let requisition = self
                .refresh_requisition(&client, integration, requisition)
                .await
                .inspect_err(|err| {
                    tracing::error!(
                        requisition = %requisition.nordigen_id,
                        "failed to refresh requisition: {err}"
                    );
                })?;
            report.requisitions += 1;

            for account in self.requisition_accounts(requisition.id).await? {
                if account.synced_at.is_some_and(|at| at >= threshold) {
                    tracing::debug!(account = %account.nordigen_id, "recently synced, skipping");
                    report.accounts_skipped += 1;
                    continue;
                }
                let summary = self
                    .sync_account_with(&client, &account, cmd.history, cmd.transactions)
                    .await
                    .inspect_err(|err| {
                        tracing::error!(
                            requisition = %requisition.nordigen_id,
                            account = %account.nordigen_id,
                            "failed to sync account: {err}"
                        );
                    })?;
                report.add(summary);
            }
        }
        tracing::info!(
            requisitions = report.requisitions,
            accounts = report.accounts_synced,
            transactions = report.transactions,
            "sync finished"
        );
        Ok(report)
    }

    /// Synchronize a single account regardless of when it was last synced.
    pub async fn sync_account(
        &self,
        integration: &Integration,
        account: &Account,
        history: HistoryPolicy,
        transactions: bool,
    ) -> ResultEngine<AccountSyncSummary> {
        let client = self.client(integration).await?;
        self.sync_account_with(&client, account, history, transactions)
            .await
    }

    async fn select_requisitions(
        &self,
        integration: &Integration,
        selector: &SyncSelector,
    ) -> ResultEngine<Vec<Requisition>> {
        match selector {
            SyncSelector::All => self.requisitions(integration).await,
            SyncSelector::Requisitions(ids) => {
                let mut selected = Vec::with_capacity(ids.len());
                for id in ids {
                    if selected.iter().any(|r: &Requisition| r.nordigen_id == *id) {
                        continue;
                    }
                    selected.push(self.requisition(integration, *id).await?);
                }
                Ok(selected)
            }
        }
    }

    async fn sync_account_with(
        &self,
        client: &AuthenticatedClient,
        account: &Account,
        history: HistoryPolicy,
        with_transactions: bool,
    ) -> ResultEngine<AccountSyncSummary> {
        let started_at = Utc::now();
        let mut summary = AccountSyncSummary::default();

        let remote_balances = client.account_balances(account.nordigen_id).await?;
        for balance in &remote_balances {
            let model = balances::new_model(account.id, balance, started_at)?;
            balances::Entity::insert(model)
                .on_conflict(
                    OnConflict::columns([
                        balances::Column::AccountId,
                        balances::Column::BalanceType,
                    ])
                    .update_columns([
                        balances::Column::Amount,
                        balances::Column::Currency,
                        balances::Column::ReferenceDate,
                        balances::Column::ApiData,
                        balances::Column::SyncedAt,
                        balances::Column::UpdatedAt,
                    ])
                    .to_owned(),
                )
                .exec_without_returning(&self.database)
                .await?;
        }
        summary.balances = remote_balances.len();

        if !with_transactions {
            self.mark_synced(&self.database, account, started_at).await?;
            return Ok(summary);
        }

        let today = started_at.date_naive();
        let since = self.transactions_since(account, history, today).await?;
        let windows = fetch_windows(since, today, self.settings.page_days);
        summary.windows = windows.len();

        let mut seen = HashSet::new();
        let mut fetched: Vec<TransactionData> = Vec::new();
        for (date_from, date_to) in windows {
            tracing::debug!(
                account = %account.nordigen_id,
                "fetching transactions {date_from}..{date_to}"
            );
            let lists = client
                .account_transactions(account.nordigen_id, date_from, date_to)
                .await?;
            for tx in lists.booked {
                match &tx.internal_transaction_id {
                    Some(id) => {
                        if seen.insert(id.clone()) {
                            fetched.push(tx);
                        }
                    }
                    None => summary.skipped += 1,
                }
            }
        }

        let stored = self.stored_transaction_ids(account.id, &seen).await?;
        let mut rows = Vec::new();
        for tx in &fetched {
            let is_new = tx
                .internal_transaction_id
                .as_ref()
                .is_some_and(|id| !stored.contains(id));
            if !is_new {
                continue;
            }
            if let Some(row) = transactions::new_model(account.id, tx, started_at)? {
                rows.push(row);
            }
        }

        summary.transactions = with_tx!(self, |db_tx| {
            let inserted = insert_transactions(&db_tx, rows).await?;
            self.mark_synced(&db_tx, account, started_at).await?;
            Ok::<_, EngineError>(inserted)
        })?;
        if summary.skipped > 0 {
            tracing::debug!(
                account = %account.nordigen_id,
                "skipped {} booked entries without id",
                summary.skipped
            );
        }
        tracing::info!(
            account = %account.nordigen_id,
            balances = summary.balances,
            transactions = summary.transactions,
            "account synced"
        );
        Ok(summary)
    }

    async fn mark_synced<C: ConnectionTrait>(
        &self,
        db: &C,
        account: &Account,
        started_at: DateTime<Utc>,
    ) -> ResultEngine<()> {
        accounts::ActiveModel {
            id: ActiveValue::Set(account.id.to_string()),
            synced_at: ActiveValue::Set(Some(started_at)),
            updated_at: ActiveValue::Set(started_at),
            ..Default::default()
        }
        .update(db)
        .await?;
        Ok(())
    }

    /// First date to fetch transactions from.
    async fn transactions_since(
        &self,
        account: &Account,
        history: HistoryPolicy,
        today: NaiveDate,
    ) -> ResultEngine<NaiveDate> {
        let days = match history {
            HistoryPolicy::FixedWindow(days) => days,
            HistoryPolicy::FullHistory => self
                .granted_history_days(account)
                .await?
                .unwrap_or(self.settings.incremental_days),
        };
        let policy_start = today
            .checked_sub_signed(Duration::days(i64::from(days)))
            .ok_or_else(|| {
                EngineError::InvalidData(format!("history of {days} days is out of range"))
            })?;
        let latest = self.latest_booking_date(account).await?;
        Ok(watermark(policy_start, latest))
    }

    /// History granted by the most recently created requisition of `account`.
    async fn granted_history_days(&self, account: &Account) -> ResultEngine<Option<u32>> {
        let latest = requisitions::Entity::find()
            .join(
                JoinType::InnerJoin,
                requisitions::Relation::RequisitionAccounts.def(),
            )
            .filter(requisition_accounts::Column::AccountId.eq(account.id.to_string()))
            .order_by_desc(requisitions::Column::CreatedAt)
            .one(&self.database)
            .await?;
        latest
            .map(|model| {
                u32::try_from(model.max_historical_days).map_err(|_| {
                    EngineError::InvalidData(format!(
                        "negative max_historical_days on requisition {}",
                        model.id
                    ))
                })
            })
            .transpose()
    }

    async fn latest_booking_date(&self, account: &Account) -> ResultEngine<Option<NaiveDate>> {
        let latest = transactions::Entity::find()
            .filter(transactions::Column::AccountId.eq(account.id.to_string()))
            .filter(transactions::Column::BookingDate.is_not_null())
            .order_by_desc(transactions::Column::BookingDate)
            .one(&self.database)
            .await?;
        Ok(latest.and_then(|model| model.booking_date))
    }

    async fn stored_transaction_ids(
        &self,
        account_id: Uuid,
        candidates: &HashSet<String>,
    ) -> ResultEngine<HashSet<String>> {
        let candidates: Vec<&String> = candidates.iter().collect();
        let mut stored = HashSet::new();
        for chunk in candidates.chunks(LOOKUP_CHUNK) {
            let ids: Vec<String> = transactions::Entity::find()
                .select_only()
                .column(transactions::Column::NordigenId)
                .filter(transactions::Column::AccountId.eq(account_id.to_string()))
                .filter(transactions::Column::NordigenId.is_in(chunk.iter().map(|id| id.as_str())))
                .into_tuple()
                .all(&self.database)
                .await?;
            stored.extend(ids);
        }
        Ok(stored)
    }
}

/// Bulk insert new transactions. Rows already present are ignored by the
/// unique (account, provider id) index.
async fn insert_transactions<C: ConnectionTrait>(
    db: &C,
    mut rows: Vec<transactions::ActiveModel>,
) -> ResultEngine<usize> {
    let mut inserted = 0;
    while !rows.is_empty() {
        let rest = rows.split_off(rows.len().min(INSERT_CHUNK));
        let affected = transactions::Entity::insert_many(rows)
            .on_conflict(
                OnConflict::columns([
                    transactions::Column::AccountId,
                    transactions::Column::NordigenId,
                ])
                .do_nothing()
                .to_owned(),
            )
            .exec_without_returning(db)
            .await?;
        inserted += usize::try_from(affected).unwrap_or(usize::MAX);
        rows = rest;
    }
    Ok(inserted)
}

/// Start of the next fetch: the policy start, moved up to the latest stored
/// booking date when that is later.
fn watermark(policy_start: NaiveDate, latest_booked: Option<NaiveDate>) -> NaiveDate {
    latest_booked.map_or(policy_start, |latest| latest.max(policy_start))
}

/// Consecutive `[from, to]` windows of `page_days` covering `since..=today`.
///
/// Each window starts where the previous one ended; the provider treats both
/// bounds as inclusive. There is always at least one window.
fn fetch_windows(since: NaiveDate, today: NaiveDate, page_days: u32) -> Vec<(NaiveDate, NaiveDate)> {
    let step = Duration::days(i64::from(page_days.max(1)));
    let mut windows = Vec::new();
    let mut from = since.min(today);
    loop {
        let to = from.checked_add_signed(step).map_or(today, |to| to.min(today));
        windows.push((from, to));
        if to >= today {
            break;
        }
        from = to;
    }
    windows
}
