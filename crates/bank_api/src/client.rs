use std::{fmt, sync::Arc};

use async_trait::async_trait;
use chrono::NaiveDate;
use uuid::Uuid;

use crate::{
    AccessToken, AccountDetails, AccountMetadata, ApiError, BalanceData, InstitutionData,
    RequisitionData, SessionRequest, TokenPair, TransactionLists,
};

/// Remote operations offered by the provider.
///
/// Token endpoints are unauthenticated. Every other call takes the bearer
/// token explicitly: implementations hold no token state of their own, so a
/// single instance can be shared by any number of [`AuthenticatedClient`]s.
#[async_trait]
pub trait BankApi: Send + Sync {
    /// Issue a fresh access/refresh token pair from the credential pair.
    async fn generate_token(&self, secret_id: &str, secret_key: &str)
    -> Result<TokenPair, ApiError>;

    /// Trade a refresh token for a new access token.
    async fn exchange_token(&self, refresh: &str) -> Result<AccessToken, ApiError>;

    async fn institutions(
        &self,
        token: &str,
        country: &str,
    ) -> Result<Vec<InstitutionData>, ApiError>;

    async fn institution(&self, token: &str, id: &str) -> Result<InstitutionData, ApiError>;

    /// Open a bank-linking session and return the requisition it created.
    async fn initialize_session(
        &self,
        token: &str,
        session: &SessionRequest,
    ) -> Result<RequisitionData, ApiError>;

    async fn requisition(&self, token: &str, id: Uuid) -> Result<RequisitionData, ApiError>;

    async fn account_metadata(&self, token: &str, id: Uuid) -> Result<AccountMetadata, ApiError>;

    async fn account_details(&self, token: &str, id: Uuid) -> Result<AccountDetails, ApiError>;

    async fn account_balances(&self, token: &str, id: Uuid) -> Result<Vec<BalanceData>, ApiError>;

    /// Booked and pending transactions between two dates, both inclusive.
    async fn account_transactions(
        &self,
        token: &str,
        id: Uuid,
        date_from: NaiveDate,
        date_to: NaiveDate,
    ) -> Result<TransactionLists, ApiError>;
}

/// A [`BankApi`] bound to one access token.
///
/// The handle is immutable: a new token means a new handle, so a stale token
/// can never leak into a later call.
#[derive(Clone)]
pub struct AuthenticatedClient {
    api: Arc<dyn BankApi>,
    token: String,
}

impl fmt::Debug for AuthenticatedClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthenticatedClient")
            .field("token", &"<redacted>")
            .finish()
    }
}

impl AuthenticatedClient {
    pub fn new(api: Arc<dyn BankApi>, token: String) -> Self {
        Self { api, token }
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub async fn institutions(&self, country: &str) -> Result<Vec<InstitutionData>, ApiError> {
        self.api.institutions(&self.token, country).await
    }

    pub async fn institution(&self, id: &str) -> Result<InstitutionData, ApiError> {
        self.api.institution(&self.token, id).await
    }

    pub async fn initialize_session(
        &self,
        session: &SessionRequest,
    ) -> Result<RequisitionData, ApiError> {
        self.api.initialize_session(&self.token, session).await
    }

    pub async fn requisition(&self, id: Uuid) -> Result<RequisitionData, ApiError> {
        self.api.requisition(&self.token, id).await
    }

    pub async fn account_metadata(&self, id: Uuid) -> Result<AccountMetadata, ApiError> {
        self.api.account_metadata(&self.token, id).await
    }

    pub async fn account_details(&self, id: Uuid) -> Result<AccountDetails, ApiError> {
        self.api.account_details(&self.token, id).await
    }

    pub async fn account_balances(&self, id: Uuid) -> Result<Vec<BalanceData>, ApiError> {
        self.api.account_balances(&self.token, id).await
    }

    pub async fn account_transactions(
        &self,
        id: Uuid,
        date_from: NaiveDate,
        date_to: NaiveDate,
    ) -> Result<TransactionLists, ApiError> {
        self.api
            .account_transactions(&self.token, id, date_from, date_to)
            .await
    }
}
