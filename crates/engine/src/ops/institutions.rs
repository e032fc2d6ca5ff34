use chrono::Utc;
use sea_orm::{ActiveValue, QueryFilter, prelude::*, sea_query::OnConflict};
use uuid::Uuid;

use bank_api::{AuthenticatedClient, InstitutionData};

use crate::{EngineError, Institution, Integration, ResultEngine, institutions, util::snapshot};

use super::Engine;

impl Engine {
    /// List the banks the provider supports in `country` (ISO 3166 alpha-2).
    pub async fn institutions(
        &self,
        integration: &Integration,
        country: &str,
    ) -> ResultEngine<Vec<InstitutionData>> {
        let country = country.trim().to_uppercase();
        if country.len() != 2 {
            return Err(EngineError::InvalidData(format!(
                "country must be a two-letter code, got {country:?}"
            )));
        }
        let client = self.client(integration).await?;
        Ok(client.institutions(&country).await?)
    }

    /// Return a locally cached institution.
    pub async fn institution(&self, nordigen_id: &str) -> ResultEngine<Institution> {
        institutions::Entity::find()
            .filter(institutions::Column::NordigenId.eq(nordigen_id))
            .one(&self.database)
            .await?
            .ok_or_else(|| EngineError::KeyNotFound(format!("institution {nordigen_id}")))
            .and_then(Institution::try_from)
    }

    /// Return the local institution row, fetching and caching it on first use.
    pub(super) async fn resolve_institution(
        &self,
        client: &AuthenticatedClient,
        nordigen_id: &str,
    ) -> ResultEngine<Institution> {
        match self.institution(nordigen_id).await {
            Err(EngineError::KeyNotFound(_)) => {}
            found => return found,
        }

        let data = client.institution(nordigen_id).await?;
        let now = Utc::now();
        let model = institutions::ActiveModel {
            id: ActiveValue::Set(Uuid::new_v4().to_string()),
            nordigen_id: ActiveValue::Set(data.id.clone()),
            name: ActiveValue::Set(data.name.clone()),
            api_data: ActiveValue::Set(snapshot(&data)?),
            created_at: ActiveValue::Set(now),
            updated_at: ActiveValue::Set(now),
        };
        institutions::Entity::insert(model)
            .on_conflict(
                OnConflict::column(institutions::Column::NordigenId)
                    .do_nothing()
                    .to_owned(),
            )
            .exec_without_returning(&self.database)
            .await?;
        tracing::debug!("cached institution {} ({})", data.id, data.name);

        self.institution(&data.id).await
    }
}
