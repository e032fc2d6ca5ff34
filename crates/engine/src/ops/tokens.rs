use chrono::{Duration, Utc};
use sea_orm::{
    ActiveValue, ConnectionTrait, QueryFilter, TransactionTrait, prelude::*,
    sea_query::OnConflict,
};
use uuid::Uuid;

use bank_api::AuthenticatedClient;

use crate::{
    CachedToken, Credentials, EngineError, Integration, ResultEngine, TokenType, integrations,
    tokens,
};

use super::{Engine, with_tx};

impl Engine {
    /// Return the integration for `credentials`, creating it on first use.
    pub async fn integration(&self, credentials: &Credentials) -> ResultEngine<Integration> {
        let nordigen_id = credentials.secret_id.to_string();
        let existing = integrations::Entity::find()
            .filter(integrations::Column::NordigenId.eq(nordigen_id.clone()))
            .one(&self.database)
            .await?;
        let model = match existing {
            Some(model) => model,
            None => {
                let now = Utc::now();
                let model = integrations::ActiveModel {
                    id: ActiveValue::Set(Uuid::new_v4().to_string()),
                    nordigen_id: ActiveValue::Set(nordigen_id.clone()),
                    created_at: ActiveValue::Set(now),
                    updated_at: ActiveValue::Set(now),
                };
                integrations::Entity::insert(model)
                    .on_conflict(
                        OnConflict::column(integrations::Column::NordigenId)
                            .do_nothing()
                            .to_owned(),
                    )
                    .exec_without_returning(&self.database)
                    .await?;
                tracing::info!("registered integration for secret id {nordigen_id}");
                integrations::Entity::find()
                    .filter(integrations::Column::NordigenId.eq(nordigen_id.clone()))
                    .one(&self.database)
                    .await?
                    .ok_or(EngineError::KeyNotFound(nordigen_id))?
            }
        };
        Integration::from_model(model, credentials.clone())
    }

    /// Return a provider client authenticated for `integration`.
    ///
    /// A live cached access token is reused. Otherwise a live refresh token
    /// is exchanged for a new access token, and as a last resort a brand new
    /// token pair is generated from the credentials.
    pub async fn client(&self, integration: &Integration) -> ResultEngine<AuthenticatedClient> {
        if let Some(access) = self.live_token(integration, TokenType::Access).await? {
            return Ok(AuthenticatedClient::new(self.api.clone(), access.value));
        }
        tracing::info!(
            integration = %integration.id,
            "no valid access token found, getting one"
        );

        if let Some(refresh) = self.live_token(integration, TokenType::Refresh).await? {
            let grant = self.api.exchange_token(&refresh.value).await?;
            save_token(
                &self.database,
                integration,
                TokenType::Access,
                &grant.access,
                grant.access_expires,
            )
            .await?;
            return Ok(AuthenticatedClient::new(self.api.clone(), grant.access));
        }

        tracing::info!(
            integration = %integration.id,
            "no valid refresh token found, generating a new token pair"
        );
        let credentials = &integration.credentials;
        let pair = self
            .api
            .generate_token(&credentials.secret_id.to_string(), &credentials.secret_key)
            .await?;
        with_tx!(self, |db_tx| {
            save_token(
                &db_tx,
                integration,
                TokenType::Refresh,
                &pair.refresh,
                pair.refresh_expires,
            )
            .await?;
            save_token(
                &db_tx,
                integration,
                TokenType::Access,
                &pair.access,
                pair.access_expires,
            )
            .await
        })?;
        Ok(AuthenticatedClient::new(self.api.clone(), pair.access))
    }

    /// Cached token of `kind` for `integration`, live or not.
    pub async fn token(
        &self,
        integration: &Integration,
        kind: TokenType,
    ) -> ResultEngine<Option<CachedToken>> {
        self.token_model(integration, kind)
            .await?
            .map(CachedToken::try_from)
            .transpose()
    }

    async fn token_model(
        &self,
        integration: &Integration,
        kind: TokenType,
    ) -> ResultEngine<Option<tokens::Model>> {
        Ok(tokens::Entity::find()
            .filter(tokens::Column::IntegrationId.eq(integration.id.to_string()))
            .filter(tokens::Column::TokenType.eq(kind.as_str()))
            .one(&self.database)
            .await?)
    }

    async fn live_token(
        &self,
        integration: &Integration,
        kind: TokenType,
    ) -> ResultEngine<Option<tokens::Model>> {
        let now = Utc::now();
        let grace = self.settings.token_grace;
        Ok(self
            .token_model(integration, kind)
            .await?
            .filter(|token| token.is_live(now, grace)))
    }
}

/// Store a token, replacing the previous one of the same type.
async fn save_token<C: ConnectionTrait>(
    db: &C,
    integration: &Integration,
    kind: TokenType,
    value: &str,
    expires_in: i64,
) -> ResultEngine<()> {
    let now = Utc::now();
    let model = tokens::ActiveModel {
        id: ActiveValue::Set(Uuid::new_v4().to_string()),
        integration_id: ActiveValue::Set(integration.id.to_string()),
        token_type: ActiveValue::Set(kind.as_str().to_string()),
        value: ActiveValue::Set(value.to_string()),
        expires: ActiveValue::Set(now + Duration::seconds(expires_in)),
        created_at: ActiveValue::Set(now),
        updated_at: ActiveValue::Set(now),
    };
    tokens::Entity::insert(model)
        .on_conflict(
            OnConflict::columns([tokens::Column::IntegrationId, tokens::Column::TokenType])
                .update_columns([
                    tokens::Column::Value,
                    tokens::Column::Expires,
                    tokens::Column::UpdatedAt,
                ])
                .to_owned(),
        )
        .exec_without_returning(db)
        .await?;
    Ok(())
}
