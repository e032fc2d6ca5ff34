use chrono::Utc;
use sea_orm::{ActiveValue, QueryFilter, QueryOrder, prelude::*};
use uuid::Uuid;

use bank_api::{AuthenticatedClient, SessionRequest};

use crate::{
    EngineError, Integration, Requisition, ResultEngine, requisitions, util::snapshot,
};

use super::Engine;

/// Longest history the provider lets an end user agreement cover.
const MAX_HISTORICAL_DAYS: u32 = 730;

impl Engine {
    /// Open a bank-linking session for `institution_id`.
    ///
    /// The returned requisition carries the link the end user must follow to
    /// grant access. It stays incomplete until the redirect comes back.
    pub async fn create_requisition(
        &self,
        integration: &Integration,
        institution_id: &str,
        max_historical_days: u32,
    ) -> ResultEngine<Requisition> {
        if !(1..=MAX_HISTORICAL_DAYS).contains(&max_historical_days) {
            return Err(EngineError::InvalidData(format!(
                "max_historical_days must be between 1 and {MAX_HISTORICAL_DAYS}, got {max_historical_days}"
            )));
        }
        let max_days = i32::try_from(max_historical_days).map_err(|_| {
            EngineError::InvalidData(format!(
                "max_historical_days too large: {max_historical_days}"
            ))
        })?;

        let client = self.client(integration).await?;
        let institution = self
            .resolve_institution(&client, institution_id.trim())
            .await?;

        let reference_id = Uuid::new_v4().to_string();
        let remote = client
            .initialize_session(&SessionRequest {
                institution_id: institution.nordigen_id.clone(),
                redirect_uri: self.settings.redirect_uri.clone(),
                reference_id: reference_id.clone(),
                max_historical_days,
            })
            .await?;

        let now = Utc::now();
        let model = requisitions::ActiveModel {
            id: ActiveValue::Set(Uuid::new_v4().to_string()),
            integration_id: ActiveValue::Set(integration.id.to_string()),
            institution_id: ActiveValue::Set(institution.id.to_string()),
            nordigen_id: ActiveValue::Set(remote.id.to_string()),
            reference_id: ActiveValue::Set(reference_id),
            link: ActiveValue::Set(remote.link.clone()),
            status: ActiveValue::Set(remote.status.clone()),
            max_historical_days: ActiveValue::Set(max_days),
            completed: ActiveValue::Set(false),
            api_data: ActiveValue::Set(snapshot(&remote)?),
            created_at: ActiveValue::Set(now),
            updated_at: ActiveValue::Set(now),
        };
        let model = model.insert(&self.database).await?;
        tracing::info!(
            requisition = %remote.id,
            institution = %institution.nordigen_id,
            "created requisition"
        );
        Requisition::try_from(model)
    }

    /// Find the requisition a redirect callback refers to.
    pub async fn requisition_by_reference(
        &self,
        integration: &Integration,
        reference_id: &str,
    ) -> ResultEngine<Requisition> {
        requisitions::Entity::find()
            .filter(requisitions::Column::IntegrationId.eq(integration.id.to_string()))
            .filter(requisitions::Column::ReferenceId.eq(reference_id))
            .one(&self.database)
            .await?
            .ok_or_else(|| EngineError::KeyNotFound(format!("requisition reference {reference_id}")))
            .and_then(Requisition::try_from)
    }

    /// Find a requisition by its provider id.
    pub async fn requisition(
        &self,
        integration: &Integration,
        nordigen_id: Uuid,
    ) -> ResultEngine<Requisition> {
        requisitions::Entity::find()
            .filter(requisitions::Column::IntegrationId.eq(integration.id.to_string()))
            .filter(requisitions::Column::NordigenId.eq(nordigen_id.to_string()))
            .one(&self.database)
            .await?
            .ok_or_else(|| EngineError::KeyNotFound(format!("requisition {nordigen_id}")))
            .and_then(Requisition::try_from)
    }

    /// All requisitions of `integration`, oldest first.
    pub async fn requisitions(&self, integration: &Integration) -> ResultEngine<Vec<Requisition>> {
        requisitions::Entity::find()
            .filter(requisitions::Column::IntegrationId.eq(integration.id.to_string()))
            .order_by_asc(requisitions::Column::CreatedAt)
            .all(&self.database)
            .await?
            .into_iter()
            .map(Requisition::try_from)
            .collect()
    }

    /// Complete a requisition once the end user came back from the bank.
    ///
    /// Reconciles the remote state and the accounts it exposes, then marks the
    /// requisition completed. Running it again is harmless.
    pub async fn accept_requisition(
        &self,
        integration: &Integration,
        requisition: &Requisition,
    ) -> ResultEngine<Requisition> {
        let client = self.client(integration).await?;
        let requisition = self
            .refresh_requisition(&client, integration, requisition)
            .await?;
        if requisition.completed {
            return Ok(requisition);
        }

        let model = requisitions::ActiveModel {
            id: ActiveValue::Set(requisition.id.to_string()),
            completed: ActiveValue::Set(true),
            updated_at: ActiveValue::Set(Utc::now()),
            ..Default::default()
        }
        .update(&self.database)
        .await?;
        tracing::info!(requisition = %requisition.nordigen_id, "requisition completed");
        Requisition::try_from(model)
    }

    /// Pull the remote requisition and reconcile it with the local rows.
    ///
    /// The stored snapshot is only rewritten when it differs. Every account the
    /// requisition lists is created or updated and linked to it.
    pub(super) async fn refresh_requisition(
        &self,
        client: &AuthenticatedClient,
        integration: &Integration,
        requisition: &Requisition,
    ) -> ResultEngine<Requisition> {
        let remote = client.requisition(requisition.nordigen_id).await?;
        let api_data = snapshot(&remote)?;

        let requisition = if api_data == requisition.api_data {
            requisition.clone()
        } else {
            tracing::debug!(
                requisition = %requisition.nordigen_id,
                status = %remote.status,
                "requisition changed remotely"
            );
            let model = requisitions::ActiveModel {
                id: ActiveValue::Set(requisition.id.to_string()),
                status: ActiveValue::Set(remote.status.clone()),
                link: ActiveValue::Set(remote.link.clone()),
                api_data: ActiveValue::Set(api_data),
                updated_at: ActiveValue::Set(Utc::now()),
                ..Default::default()
            }
            .update(&self.database)
            .await?;
            Requisition::try_from(model)?
        };

        for account_id in &remote.accounts {
            let account = self
                .reconcile_account(client, integration, *account_id)
                .await?;
            self.link_account(requisition.id, account.id).await?;
        }
        Ok(requisition)
    }
}
