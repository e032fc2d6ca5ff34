//! In-memory provider used by tests across the workspace.
//!
//! Tokens are checked like the real service does: authenticated calls fail
//! with [`ApiError::Unauthorized`] unless they carry an access token this
//! instance issued.

use std::{
    collections::{HashMap, HashSet},
    sync::{Mutex, MutexGuard},
};

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use serde_json::Map;
use uuid::Uuid;

use crate::{
    AccessToken, AccountDetail, AccountDetails, AccountMetadata, Amount, ApiError, BalanceData,
    BankApi, InstitutionData, RequisitionData, SessionRequest, TokenPair, TransactionData,
    TransactionLists,
};

const ACCESS_TTL: i64 = 24 * 60 * 60;
const REFRESH_TTL: i64 = 30 * 24 * 60 * 60;

#[derive(Debug, Default)]
struct MockAccount {
    metadata: Option<AccountMetadata>,
    details: Option<AccountDetails>,
    balances: Vec<BalanceData>,
    booked: Vec<TransactionData>,
    pending: Vec<TransactionData>,
    failure: Option<ApiError>,
}

#[derive(Debug, Default)]
struct MockState {
    secret_id: String,
    secret_key: String,
    access_tokens: HashSet<String>,
    refresh_tokens: HashSet<String>,
    issued: usize,
    generated: usize,
    exchanged: usize,
    institutions: HashMap<String, InstitutionData>,
    institution_lookups: usize,
    requisitions: HashMap<Uuid, RequisitionData>,
    sessions: Vec<SessionRequest>,
    accounts: HashMap<Uuid, MockAccount>,
    transaction_requests: Vec<(Uuid, NaiveDate, NaiveDate)>,
}

/// A [`BankApi`] backed by maps, with counters for assertions.
#[derive(Debug, Default)]
pub struct MockBankApi {
    state: Mutex<MockState>,
}

impl MockBankApi {
    /// Accept only the given credential pair.
    pub fn new(secret_id: &str, secret_key: &str) -> Self {
        let api = Self::default();
        {
            let mut state = api.lock();
            state.secret_id = secret_id.to_string();
            state.secret_key = secret_key.to_string();
        }
        api
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        // A poisoned lock only means another test thread panicked.
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn authorize(state: &MockState, token: &str) -> Result<(), ApiError> {
        if state.access_tokens.contains(token) {
            Ok(())
        } else {
            Err(ApiError::Unauthorized(
                "Authentication credentials were not provided.".to_string(),
            ))
        }
    }

    fn issue(state: &mut MockState, kind: &str) -> String {
        state.issued += 1;
        format!("{kind}-{}", state.issued)
    }

    pub fn add_institution(&self, institution: InstitutionData) {
        self.lock()
            .institutions
            .insert(institution.id.clone(), institution);
    }

    /// Register an account with metadata and details.
    pub fn add_account(&self, metadata: AccountMetadata, details: AccountDetails) {
        let mut state = self.lock();
        let account = state.accounts.entry(metadata.id).or_default();
        account.metadata = Some(metadata);
        account.details = Some(details);
    }

    pub fn set_balances(&self, account_id: Uuid, balances: Vec<BalanceData>) {
        self.lock()
            .accounts
            .entry(account_id)
            .or_default()
            .balances = balances;
    }

    pub fn add_booked(&self, account_id: Uuid, transactions: Vec<TransactionData>) {
        self.lock()
            .accounts
            .entry(account_id)
            .or_default()
            .booked
            .extend(transactions);
    }

    pub fn add_pending(&self, account_id: Uuid, transactions: Vec<TransactionData>) {
        self.lock()
            .accounts
            .entry(account_id)
            .or_default()
            .pending
            .extend(transactions);
    }

    /// Make every call about `account_id` fail with `error`.
    pub fn fail_account(&self, account_id: Uuid, error: ApiError) {
        self.lock()
            .accounts
            .entry(account_id)
            .or_default()
            .failure = Some(error);
    }

    /// Simulate the end user finishing the bank flow.
    pub fn link_requisition(&self, requisition_id: Uuid, accounts: Vec<Uuid>) {
        if let Some(requisition) = self.lock().requisitions.get_mut(&requisition_id) {
            requisition.status = crate::requisition::STATUS_LINKED.to_string();
            requisition.accounts = accounts;
        }
    }

    pub fn generated(&self) -> usize {
        self.lock().generated
    }

    pub fn exchanged(&self) -> usize {
        self.lock().exchanged
    }

    pub fn institution_lookups(&self) -> usize {
        self.lock().institution_lookups
    }

    pub fn sessions(&self) -> Vec<SessionRequest> {
        self.lock().sessions.clone()
    }

    /// Every `(account, date_from, date_to)` transaction request, in order.
    pub fn transaction_requests(&self) -> Vec<(Uuid, NaiveDate, NaiveDate)> {
        self.lock().transaction_requests.clone()
    }

    pub fn clear_transaction_requests(&self) {
        self.lock().transaction_requests.clear();
    }

    fn account<'a>(state: &'a MockState, id: Uuid) -> Result<&'a MockAccount, ApiError> {
        let account = state
            .accounts
            .get(&id)
            .ok_or_else(|| ApiError::NotFound(id.to_string()))?;
        match &account.failure {
            Some(err) => Err(err.clone()),
            None => Ok(account),
        }
    }
}

fn in_range(tx: &TransactionData, from: NaiveDate, to: NaiveDate) -> bool {
    match tx.booking_date.or(tx.value_date) {
        Some(date) => date >= from && date <= to,
        None => true,
    }
}

#[async_trait]
impl BankApi for MockBankApi {
    async fn generate_token(
        &self,
        secret_id: &str,
        secret_key: &str,
    ) -> Result<TokenPair, ApiError> {
        let mut state = self.lock();
        if secret_id != state.secret_id || secret_key != state.secret_key {
            return Err(ApiError::Unauthorized(
                "Authentication failed".to_string(),
            ));
        }
        state.generated += 1;
        let access = Self::issue(&mut state, "access");
        let refresh = Self::issue(&mut state, "refresh");
        state.access_tokens.insert(access.clone());
        state.refresh_tokens.insert(refresh.clone());
        Ok(TokenPair {
            access,
            access_expires: ACCESS_TTL,
            refresh,
            refresh_expires: REFRESH_TTL,
        })
    }

    async fn exchange_token(&self, refresh: &str) -> Result<AccessToken, ApiError> {
        let mut state = self.lock();
        if !state.refresh_tokens.contains(refresh) {
            return Err(ApiError::Unauthorized("Invalid refresh token".to_string()));
        }
        state.exchanged += 1;
        let access = Self::issue(&mut state, "access");
        state.access_tokens.insert(access.clone());
        Ok(AccessToken {
            access,
            access_expires: ACCESS_TTL,
        })
    }

    async fn institutions(
        &self,
        token: &str,
        country: &str,
    ) -> Result<Vec<InstitutionData>, ApiError> {
        let state = self.lock();
        Self::authorize(&state, token)?;
        let mut institutions: Vec<_> = state
            .institutions
            .values()
            .filter(|institution| {
                institution
                    .countries
                    .iter()
                    .any(|c| c.eq_ignore_ascii_case(country))
            })
            .cloned()
            .collect();
        institutions.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(institutions)
    }

    async fn institution(&self, token: &str, id: &str) -> Result<InstitutionData, ApiError> {
        let mut state = self.lock();
        Self::authorize(&state, token)?;
        state.institution_lookups += 1;
        state
            .institutions
            .get(id)
            .cloned()
            .ok_or_else(|| ApiError::NotFound(id.to_string()))
    }

    async fn initialize_session(
        &self,
        token: &str,
        session: &SessionRequest,
    ) -> Result<RequisitionData, ApiError> {
        let mut state = self.lock();
        Self::authorize(&state, token)?;
        if !state.institutions.contains_key(&session.institution_id) {
            return Err(ApiError::NotFound(session.institution_id.clone()));
        }
        let id = Uuid::new_v4();
        let requisition = RequisitionData {
            id,
            created: Some(Utc::now()),
            redirect: Some(session.redirect_uri.clone()),
            status: "CR".to_string(),
            institution_id: session.institution_id.clone(),
            agreement: Some(Uuid::new_v4().to_string()),
            reference: session.reference_id.clone(),
            accounts: Vec::new(),
            user_language: Some("EN".to_string()),
            link: format!("https://mock.bank/link/{id}"),
            extra: Map::new(),
        };
        state.sessions.push(session.clone());
        state.requisitions.insert(id, requisition.clone());
        Ok(requisition)
    }

    async fn requisition(&self, token: &str, id: Uuid) -> Result<RequisitionData, ApiError> {
        let state = self.lock();
        Self::authorize(&state, token)?;
        state
            .requisitions
            .get(&id)
            .cloned()
            .ok_or_else(|| ApiError::NotFound(id.to_string()))
    }

    async fn account_metadata(&self, token: &str, id: Uuid) -> Result<AccountMetadata, ApiError> {
        let state = self.lock();
        Self::authorize(&state, token)?;
        Self::account(&state, id)?
            .metadata
            .clone()
            .ok_or_else(|| ApiError::NotFound(id.to_string()))
    }

    async fn account_details(&self, token: &str, id: Uuid) -> Result<AccountDetails, ApiError> {
        let state = self.lock();
        Self::authorize(&state, token)?;
        Self::account(&state, id)?
            .details
            .clone()
            .ok_or_else(|| ApiError::NotFound(id.to_string()))
    }

    async fn account_balances(&self, token: &str, id: Uuid) -> Result<Vec<BalanceData>, ApiError> {
        let state = self.lock();
        Self::authorize(&state, token)?;
        Ok(Self::account(&state, id)?.balances.clone())
    }

    async fn account_transactions(
        &self,
        token: &str,
        id: Uuid,
        date_from: NaiveDate,
        date_to: NaiveDate,
    ) -> Result<TransactionLists, ApiError> {
        let mut state = self.lock();
        Self::authorize(&state, token)?;
        state.transaction_requests.push((id, date_from, date_to));
        let account = Self::account(&state, id)?;
        Ok(TransactionLists {
            booked: account
                .booked
                .iter()
                .filter(|tx| in_range(tx, date_from, date_to))
                .cloned()
                .collect(),
            pending: account.pending.clone(),
        })
    }
}

pub fn institution(id: &str, name: &str, country: &str) -> InstitutionData {
    InstitutionData {
        id: id.to_string(),
        name: name.to_string(),
        bic: None,
        transaction_total_days: Some("540".to_string()),
        countries: vec![country.to_string()],
        logo: Some(format!("https://cdn.mock.bank/{id}.png")),
        extra: Map::new(),
    }
}

pub fn account_metadata(id: Uuid, institution_id: &str, iban: &str) -> AccountMetadata {
    AccountMetadata {
        id,
        created: Some(Utc::now()),
        last_accessed: None,
        iban: Some(iban.to_string()),
        institution_id: institution_id.to_string(),
        status: Some("READY".to_string()),
        owner_name: Some("Jane Doe".to_string()),
        extra: Map::new(),
    }
}

pub fn account_details(name: &str, currency: &str) -> AccountDetails {
    AccountDetails {
        account: AccountDetail {
            currency: Some(currency.to_string()),
            name: Some(name.to_string()),
            product: Some("Current account".to_string()),
            cash_account_type: Some("CACC".to_string()),
            ..Default::default()
        },
    }
}

pub fn balance(balance_type: &str, amount: &str, currency: &str) -> BalanceData {
    BalanceData {
        balance_amount: Amount {
            amount: amount.to_string(),
            currency: currency.to_string(),
        },
        balance_type: balance_type.to_string(),
        reference_date: Some(Utc::now().date_naive()),
        extra: Map::new(),
    }
}

pub fn booked(internal_id: Option<&str>, booking_date: NaiveDate, amount: &str) -> TransactionData {
    TransactionData {
        internal_transaction_id: internal_id.map(ToString::to_string),
        transaction_id: None,
        booking_date: Some(booking_date),
        value_date: Some(booking_date),
        transaction_amount: Amount {
            amount: amount.to_string(),
            currency: "EUR".to_string(),
        },
        extra: Map::new(),
    }
}
