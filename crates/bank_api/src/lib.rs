//! Client side of the open-banking account data provider.
//!
//! The wire types mirror the provider's JSON documents. Every document keeps
//! the fields it does not model explicitly in `extra`, so that callers can
//! persist the complete payload.

pub use client::{AuthenticatedClient, BankApi};
pub use error::ApiError;
pub use http::{DEFAULT_BASE_URL, HttpBankApi};
#[cfg(any(test, feature = "mock"))]
pub use mock::MockBankApi;

mod client;
mod error;
mod http;
#[cfg(any(test, feature = "mock"))]
pub mod mock;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Fields of a document the wire types do not name.
pub type Extra = Map<String, Value>;

pub mod token {
    use super::*;

    /// Response of a full token generation.
    ///
    /// Expiries are lifetimes in seconds, relative to the moment of issue.
    #[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
    pub struct TokenPair {
        pub access: String,
        pub access_expires: i64,
        pub refresh: String,
        pub refresh_expires: i64,
    }

    /// Response of a refresh token exchange.
    #[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
    pub struct AccessToken {
        pub access: String,
        pub access_expires: i64,
    }

    #[derive(Debug, Serialize)]
    pub(crate) struct GenerateRequest<'a> {
        pub secret_id: &'a str,
        pub secret_key: &'a str,
    }

    #[derive(Debug, Serialize)]
    pub(crate) struct ExchangeRequest<'a> {
        pub refresh: &'a str,
    }
}

pub mod institution {
    use super::*;

    #[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
    pub struct InstitutionData {
        pub id: String,
        pub name: String,
        #[serde(default)]
        pub bic: Option<String>,
        /// Days of history the bank exposes. The provider encodes it as a
        /// string.
        #[serde(default)]
        pub transaction_total_days: Option<String>,
        #[serde(default)]
        pub countries: Vec<String>,
        #[serde(default)]
        pub logo: Option<String>,
        #[serde(flatten)]
        pub extra: Extra,
    }
}

pub mod requisition {
    use super::*;

    /// Remote status of a requisition once the end user linked their bank.
    pub const STATUS_LINKED: &str = "LN";

    #[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
    pub struct RequisitionData {
        pub id: Uuid,
        #[serde(default)]
        pub created: Option<DateTime<Utc>>,
        #[serde(default)]
        pub redirect: Option<String>,
        pub status: String,
        pub institution_id: String,
        #[serde(default)]
        pub agreement: Option<String>,
        pub reference: String,
        #[serde(default)]
        pub accounts: Vec<Uuid>,
        #[serde(default)]
        pub user_language: Option<String>,
        pub link: String,
        #[serde(flatten)]
        pub extra: Extra,
    }

    impl RequisitionData {
        pub fn is_linked(&self) -> bool {
            self.status == STATUS_LINKED
        }
    }

    /// Everything needed to open a bank-linking session.
    #[derive(Clone, Debug, PartialEq, Eq)]
    pub struct SessionRequest {
        pub institution_id: String,
        pub redirect_uri: String,
        /// Opaque correlation token echoed back on the redirect as `ref`.
        pub reference_id: String,
        pub max_historical_days: u32,
    }

    #[derive(Debug, Serialize)]
    pub(crate) struct AgreementRequest<'a> {
        pub institution_id: &'a str,
        pub max_historical_days: u32,
        pub access_valid_for_days: u32,
        pub access_scope: [&'a str; 3],
    }

    #[derive(Debug, Deserialize)]
    pub(crate) struct AgreementCreated {
        pub id: Uuid,
    }

    #[derive(Debug, Serialize)]
    pub(crate) struct RequisitionRequest<'a> {
        pub redirect: &'a str,
        pub institution_id: &'a str,
        pub reference: &'a str,
        pub agreement: Uuid,
        pub user_language: &'a str,
    }
}

pub mod account {
    use super::*;

    #[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
    pub struct AccountMetadata {
        pub id: Uuid,
        #[serde(default)]
        pub created: Option<DateTime<Utc>>,
        #[serde(default)]
        pub last_accessed: Option<DateTime<Utc>>,
        #[serde(default)]
        pub iban: Option<String>,
        pub institution_id: String,
        #[serde(default)]
        pub status: Option<String>,
        #[serde(default)]
        pub owner_name: Option<String>,
        #[serde(flatten)]
        pub extra: Extra,
    }

    #[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
    pub struct AccountDetails {
        pub account: AccountDetail,
    }

    #[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct AccountDetail {
        #[serde(default)]
        pub resource_id: Option<String>,
        #[serde(default)]
        pub iban: Option<String>,
        #[serde(default)]
        pub currency: Option<String>,
        #[serde(default)]
        pub owner_name: Option<String>,
        #[serde(default)]
        pub name: Option<String>,
        #[serde(default)]
        pub product: Option<String>,
        #[serde(default)]
        pub cash_account_type: Option<String>,
        #[serde(flatten)]
        pub extra: Extra,
    }
}

pub mod balance {
    use super::*;

    #[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
    pub struct Amount {
        /// Decimal amount as sent by the bank, e.g. `"-12.50"`.
        pub amount: String,
        pub currency: String,
    }

    #[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct BalanceData {
        pub balance_amount: Amount,
        pub balance_type: String,
        #[serde(default)]
        pub reference_date: Option<NaiveDate>,
        #[serde(flatten)]
        pub extra: Extra,
    }

    #[derive(Debug, Deserialize)]
    pub(crate) struct Balances {
        pub balances: Vec<BalanceData>,
    }
}

pub mod transaction {
    use super::*;

    pub use super::balance::Amount;

    #[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    pub struct TransactionData {
        /// Stable provider-assigned identifier. Entries without one cannot be
        /// deduplicated.
        #[serde(default)]
        pub internal_transaction_id: Option<String>,
        #[serde(default)]
        pub transaction_id: Option<String>,
        #[serde(default)]
        pub booking_date: Option<NaiveDate>,
        #[serde(default)]
        pub value_date: Option<NaiveDate>,
        pub transaction_amount: Amount,
        #[serde(flatten)]
        pub extra: Extra,
    }

    #[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
    pub struct TransactionLists {
        #[serde(default)]
        pub booked: Vec<TransactionData>,
        #[serde(default)]
        pub pending: Vec<TransactionData>,
    }

    #[derive(Debug, Deserialize)]
    pub(crate) struct Transactions {
        pub transactions: TransactionLists,
    }
}

pub use account::{AccountDetail, AccountDetails, AccountMetadata};
pub use balance::{Amount, BalanceData};
pub use institution::InstitutionData;
pub use requisition::{RequisitionData, SessionRequest};
pub use token::{AccessToken, TokenPair};
pub use transaction::{TransactionData, TransactionLists};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transaction_keeps_unmodelled_fields() {
        let raw = serde_json::json!({
            "internalTransactionId": "abc123",
            "bookingDate": "2026-10-01",
            "transactionAmount": { "amount": "-4.20", "currency": "EUR" },
            "remittanceInformationUnstructured": "Coffee",
        });

        let tx: TransactionData = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(tx.internal_transaction_id.as_deref(), Some("abc123"));
        assert_eq!(
            tx.booking_date,
            Some(NaiveDate::from_ymd_opt(2026, 10, 1).unwrap())
        );
        assert_eq!(
            tx.extra.get("remittanceInformationUnstructured"),
            Some(&Value::from("Coffee"))
        );

        let back = serde_json::to_value(&tx).unwrap();
        assert_eq!(back["remittanceInformationUnstructured"], raw["remittanceInformationUnstructured"]);
        assert_eq!(back["internalTransactionId"], raw["internalTransactionId"]);
    }

    #[test]
    fn institution_total_days_is_a_string() {
        let raw = serde_json::json!({
            "id": "SANDBOXFINANCE_SFIN0000",
            "name": "Sandbox Finance",
            "bic": "SFIN0000",
            "transaction_total_days": "90",
            "countries": ["XX"],
            "logo": "https://cdn.example/sandbox.png",
        });

        let institution: InstitutionData = serde_json::from_value(raw).unwrap();
        assert_eq!(institution.transaction_total_days.as_deref(), Some("90"));
        assert_eq!(institution.countries, vec!["XX".to_string()]);
    }

    #[test]
    fn requisition_linked_status() {
        let raw = serde_json::json!({
            "id": "8126e9fb-93c9-4228-937c-68f0383c2df7",
            "status": "LN",
            "institution_id": "SANDBOXFINANCE_SFIN0000",
            "reference": "ref",
            "accounts": ["3fa85f64-5717-4562-b3fc-2c963f66afa6"],
            "link": "https://example/link",
        });

        let requisition: RequisitionData = serde_json::from_value(raw).unwrap();
        assert!(requisition.is_linked());
        assert_eq!(requisition.accounts.len(), 1);
    }
}
