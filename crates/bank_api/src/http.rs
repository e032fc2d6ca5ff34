use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::{Client, RequestBuilder, Response, Url, header::RETRY_AFTER};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use uuid::Uuid;

use crate::{
    AccessToken, AccountDetails, AccountMetadata, ApiError, BalanceData, BankApi,
    InstitutionData, RequisitionData, SessionRequest, TokenPair, TransactionLists,
    balance::Balances,
    requisition::{AgreementCreated, AgreementRequest, RequisitionRequest},
    token::{ExchangeRequest, GenerateRequest},
    transaction::Transactions,
};

pub const DEFAULT_BASE_URL: &str = "https://bankaccountdata.gocardless.com/api/v2/";

/// How long the end user agreement behind a requisition stays valid.
const ACCESS_VALID_FOR_DAYS: u32 = 90;
const ACCESS_SCOPE: [&str; 3] = ["balances", "details", "transactions"];
const USER_LANGUAGE: &str = "EN";

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    detail: Option<String>,
}

/// [`BankApi`] over HTTPS.
///
/// Transport concerns (timeouts, TLS, connection reuse) are those of the
/// wrapped `reqwest::Client`.
#[derive(Clone, Debug)]
pub struct HttpBankApi {
    http: Client,
    base_url: Url,
}

impl HttpBankApi {
    pub fn new(http: Client, base_url: &str) -> Result<Self, ApiError> {
        let mut base = base_url.to_string();
        if !base.ends_with('/') {
            base.push('/');
        }
        let base_url =
            Url::parse(&base).map_err(|err| ApiError::Transport(format!("invalid base_url: {err}")))?;
        Ok(Self { http, base_url })
    }

    pub fn with_default_url(http: Client) -> Result<Self, ApiError> {
        Self::new(http, DEFAULT_BASE_URL)
    }

    fn url(&self, path: &str) -> Result<Url, ApiError> {
        self.base_url
            .join(path.trim_start_matches('/'))
            .map_err(|err| ApiError::Transport(format!("invalid path {path}: {err}")))
    }

    async fn send<T: DeserializeOwned>(&self, req: RequestBuilder) -> Result<T, ApiError> {
        let resp = req.send().await.inspect_err(|err| {
            tracing::error!("error occurred in request to bank data api: {err}");
        })?;
        Self::decode(resp).await
    }

    async fn decode<T: DeserializeOwned>(resp: Response) -> Result<T, ApiError> {
        let status = resp.status();
        if status.is_success() {
            return resp.json::<T>().await.map_err(|err| {
                tracing::error!("error occurred while deserialising bank data response: {err}");
                ApiError::Decode(err.to_string())
            });
        }

        let retry_after = resp
            .headers()
            .get(RETRY_AFTER)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.parse().ok());
        let message = match resp.json::<ErrorBody>().await {
            Ok(body) => match (body.summary, body.detail) {
                (Some(summary), Some(detail)) => format!("{summary}: {detail}"),
                (Some(message), None) | (None, Some(message)) => message,
                (None, None) => "server error".to_string(),
            },
            Err(_) => "server error".to_string(),
        };
        tracing::warn!("bank data api answered {status}: {message}");
        Err(ApiError::from_status(status, message, retry_after))
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        token: &str,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, ApiError> {
        let req = self.http.get(self.url(path)?).bearer_auth(token).query(query);
        self.send(req).await
    }

    async fn post_json<TReq: Serialize + ?Sized, TResp: DeserializeOwned>(
        &self,
        token: Option<&str>,
        path: &str,
        body: &TReq,
    ) -> Result<TResp, ApiError> {
        let mut req = self.http.post(self.url(path)?).json(body);
        if let Some(token) = token {
            req = req.bearer_auth(token);
        }
        self.send(req).await
    }
}

#[async_trait]
impl BankApi for HttpBankApi {
    async fn generate_token(
        &self,
        secret_id: &str,
        secret_key: &str,
    ) -> Result<TokenPair, ApiError> {
        self.post_json(
            None,
            "token/new/",
            &GenerateRequest {
                secret_id,
                secret_key,
            },
        )
        .await
    }

    async fn exchange_token(&self, refresh: &str) -> Result<AccessToken, ApiError> {
        self.post_json(None, "token/refresh/", &ExchangeRequest { refresh })
            .await
    }

    async fn institutions(
        &self,
        token: &str,
        country: &str,
    ) -> Result<Vec<InstitutionData>, ApiError> {
        self.get_json(token, "institutions/", &[("country", country.to_string())])
            .await
    }

    async fn institution(&self, token: &str, id: &str) -> Result<InstitutionData, ApiError> {
        self.get_json(token, &format!("institutions/{id}/"), &[])
            .await
    }

    async fn initialize_session(
        &self,
        token: &str,
        session: &SessionRequest,
    ) -> Result<RequisitionData, ApiError> {
        let agreement: AgreementCreated = self
            .post_json(
                Some(token),
                "agreements/enduser/",
                &AgreementRequest {
                    institution_id: &session.institution_id,
                    max_historical_days: session.max_historical_days,
                    access_valid_for_days: ACCESS_VALID_FOR_DAYS,
                    access_scope: ACCESS_SCOPE,
                },
            )
            .await?;

        self.post_json(
            Some(token),
            "requisitions/",
            &RequisitionRequest {
                redirect: &session.redirect_uri,
                institution_id: &session.institution_id,
                reference: &session.reference_id,
                agreement: agreement.id,
                user_language: USER_LANGUAGE,
            },
        )
        .await
    }

    async fn requisition(&self, token: &str, id: Uuid) -> Result<RequisitionData, ApiError> {
        self.get_json(token, &format!("requisitions/{id}/"), &[])
            .await
    }

    async fn account_metadata(&self, token: &str, id: Uuid) -> Result<AccountMetadata, ApiError> {
        self.get_json(token, &format!("accounts/{id}/"), &[]).await
    }

    async fn account_details(&self, token: &str, id: Uuid) -> Result<AccountDetails, ApiError> {
        self.get_json(token, &format!("accounts/{id}/details/"), &[])
            .await
    }

    async fn account_balances(&self, token: &str, id: Uuid) -> Result<Vec<BalanceData>, ApiError> {
        let balances: Balances = self
            .get_json(token, &format!("accounts/{id}/balances/"), &[])
            .await?;
        Ok(balances.balances)
    }

    async fn account_transactions(
        &self,
        token: &str,
        id: Uuid,
        date_from: NaiveDate,
        date_to: NaiveDate,
    ) -> Result<TransactionLists, ApiError> {
        let transactions: Transactions = self
            .get_json(
                token,
                &format!("accounts/{id}/transactions/"),
                &[
                    ("date_from", date_from.format("%Y-%m-%d").to_string()),
                    ("date_to", date_to.format("%Y-%m-%d").to_string()),
                ],
            )
            .await?;
        Ok(transactions.transactions)
    }
}
