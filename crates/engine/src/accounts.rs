//! The module contains `Account` and the reconciliation of provider account
//! documents with the stored rows.

use chrono::{DateTime, Utc};
use sea_orm::{ActiveValue, entity::prelude::*};
use serde_json::Value;
use uuid::Uuid;

use bank_api::{AccountDetails, AccountMetadata};

use crate::{EngineError, ResultEngine, util::parse_uuid, util::snapshot};

/// A bank account exposed by one or more requisitions.
#[derive(Clone, Debug, PartialEq)]
pub struct Account {
    pub id: Uuid,
    pub integration_id: Uuid,
    pub institution_id: Uuid,
    pub nordigen_id: Uuid,
    pub iban: Option<String>,
    pub currency: Option<String>,
    pub name: Option<String>,
    pub owner_name: Option<String>,
    pub product: Option<String>,
    pub status: Option<String>,
    /// User-chosen label. Never touched by synchronization.
    pub alias: Option<String>,
    /// Start time of the last completed sync.
    pub synced_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Account {
    /// Best label for display: alias, then bank name, then IBAN.
    pub fn display_name(&self) -> String {
        self.alias
            .as_deref()
            .or(self.name.as_deref())
            .or(self.iban.as_deref())
            .map(ToString::to_string)
            .unwrap_or_else(|| self.nordigen_id.to_string())
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "accounts")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub integration_id: String,
    pub institution_id: String,
    #[sea_orm(unique)]
    pub nordigen_id: String,
    pub iban: Option<String>,
    pub currency: Option<String>,
    pub name: Option<String>,
    pub owner_name: Option<String>,
    pub product: Option<String>,
    pub status: Option<String>,
    pub alias: Option<String>,
    pub metadata: Json,
    pub details: Json,
    pub synced_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::requisition_accounts::Entity")]
    RequisitionAccounts,
}

impl Related<super::requisition_accounts::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::RequisitionAccounts.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl TryFrom<Model> for Account {
    type Error = EngineError;

    fn try_from(model: Model) -> ResultEngine<Self> {
        Ok(Self {
            id: parse_uuid(&model.id, "account")?,
            integration_id: parse_uuid(&model.integration_id, "integration")?,
            institution_id: parse_uuid(&model.institution_id, "institution")?,
            nordigen_id: parse_uuid(&model.nordigen_id, "account")?,
            iban: model.iban,
            currency: model.currency,
            name: model.name,
            owner_name: model.owner_name,
            product: model.product,
            status: model.status,
            alias: model.alias,
            synced_at: model.synced_at,
            created_at: model.created_at,
        })
    }
}

/// The part of an account row derived from the provider documents.
#[derive(Clone, Debug, PartialEq)]
pub(crate) struct RemoteAccount {
    pub institution_id: String,
    pub iban: Option<String>,
    pub currency: Option<String>,
    pub name: Option<String>,
    pub owner_name: Option<String>,
    pub product: Option<String>,
    pub status: Option<String>,
    pub metadata: Value,
    pub details: Value,
}

impl RemoteAccount {
    pub(crate) fn new(
        institution_id: Uuid,
        metadata: &AccountMetadata,
        details: &AccountDetails,
    ) -> ResultEngine<Self> {
        let detail = &details.account;
        Ok(Self {
            institution_id: institution_id.to_string(),
            iban: detail.iban.clone().or_else(|| metadata.iban.clone()),
            currency: detail.currency.clone(),
            name: detail.name.clone(),
            owner_name: detail
                .owner_name
                .clone()
                .or_else(|| metadata.owner_name.clone()),
            product: detail.product.clone(),
            status: metadata.status.clone(),
            metadata: snapshot(metadata)?,
            details: snapshot(details)?,
        })
    }

    pub(crate) fn into_new(
        self,
        integration_id: Uuid,
        nordigen_id: Uuid,
        now: DateTime<Utc>,
    ) -> ActiveModel {
        ActiveModel {
            id: ActiveValue::Set(Uuid::new_v4().to_string()),
            integration_id: ActiveValue::Set(integration_id.to_string()),
            institution_id: ActiveValue::Set(self.institution_id),
            nordigen_id: ActiveValue::Set(nordigen_id.to_string()),
            iban: ActiveValue::Set(self.iban),
            currency: ActiveValue::Set(self.currency),
            name: ActiveValue::Set(self.name),
            owner_name: ActiveValue::Set(self.owner_name),
            product: ActiveValue::Set(self.product),
            status: ActiveValue::Set(self.status),
            alias: ActiveValue::Set(None),
            metadata: ActiveValue::Set(self.metadata),
            details: ActiveValue::Set(self.details),
            synced_at: ActiveValue::Set(None),
            created_at: ActiveValue::Set(now),
            updated_at: ActiveValue::Set(now),
        }
    }

    /// Active model carrying only the columns that differ from `model`.
    ///
    /// The result reports `is_changed() == false` when the stored row is
    /// already up to date.
    pub(crate) fn changes(&self, model: &Model) -> ActiveModel {
        let mut active: ActiveModel = model.clone().into();
        if model.institution_id != self.institution_id {
            active.institution_id = ActiveValue::Set(self.institution_id.clone());
        }
        if model.iban != self.iban {
            active.iban = ActiveValue::Set(self.iban.clone());
        }
        if model.currency != self.currency {
            active.currency = ActiveValue::Set(self.currency.clone());
        }
        if model.name != self.name {
            active.name = ActiveValue::Set(self.name.clone());
        }
        if model.owner_name != self.owner_name {
            active.owner_name = ActiveValue::Set(self.owner_name.clone());
        }
        if model.product != self.product {
            active.product = ActiveValue::Set(self.product.clone());
        }
        if model.status != self.status {
            active.status = ActiveValue::Set(self.status.clone());
        }
        if stable_metadata(&model.metadata) != stable_metadata(&self.metadata) {
            active.metadata = ActiveValue::Set(self.metadata.clone());
        }
        if model.details != self.details {
            active.details = ActiveValue::Set(self.details.clone());
        }
        active
    }
}

/// Metadata keys the provider rewrites on every read of the account.
const VOLATILE_METADATA: [&str; 1] = ["last_accessed"];

/// `metadata` without the keys that change on every read.
fn stable_metadata(metadata: &Value) -> Value {
    let mut stable = metadata.clone();
    if let Value::Object(fields) = &mut stable {
        for key in VOLATILE_METADATA {
            fields.remove(key);
        }
    }
    stable
}

#[cfg(test)]
mod tests {
    use bank_api::AccountDetail;
    use sea_orm::ActiveModelTrait;
    use serde_json::Map;

    use super::*;

    fn remote(name: &str) -> (AccountMetadata, AccountDetails) {
        let metadata = AccountMetadata {
            id: Uuid::new_v4(),
            created: None,
            last_accessed: None,
            iban: Some("NL00BANK0123456789".to_string()),
            institution_id: "BANK_NL".to_string(),
            status: Some("READY".to_string()),
            owner_name: Some("J. Doe".to_string()),
            extra: Map::new(),
        };
        let details = AccountDetails {
            account: AccountDetail {
                currency: Some("EUR".to_string()),
                name: Some(name.to_string()),
                ..AccountDetail::default()
            },
        };
        (metadata, details)
    }

    fn stored(remote: RemoteAccount) -> Model {
        let now = Utc::now();
        let id = Uuid::new_v4();
        Model {
            id: id.to_string(),
            integration_id: Uuid::new_v4().to_string(),
            institution_id: remote.institution_id,
            nordigen_id: id.to_string(),
            iban: remote.iban,
            currency: remote.currency,
            name: remote.name,
            owner_name: remote.owner_name,
            product: remote.product,
            status: remote.status,
            alias: Some("Groceries".to_string()),
            metadata: remote.metadata,
            details: remote.details,
            synced_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn details_fall_back_to_metadata() {
        let (metadata, details) = remote("Checking");
        let account = RemoteAccount::new(Uuid::new_v4(), &metadata, &details).unwrap();
        assert_eq!(account.iban.as_deref(), Some("NL00BANK0123456789"));
        assert_eq!(account.owner_name.as_deref(), Some("J. Doe"));
        assert_eq!(account.currency.as_deref(), Some("EUR"));
        assert_eq!(account.metadata["institution_id"], "BANK_NL");
    }

    #[test]
    fn unchanged_remote_produces_no_changes() {
        let (metadata, details) = remote("Checking");
        let institution = Uuid::new_v4();
        let account = RemoteAccount::new(institution, &metadata, &details).unwrap();
        let model = stored(account.clone());
        assert!(!account.changes(&model).is_changed());
    }

    #[test]
    fn last_access_alone_is_not_a_change() {
        let (mut metadata, details) = remote("Checking");
        let institution = Uuid::new_v4();
        let model = stored(RemoteAccount::new(institution, &metadata, &details).unwrap());

        metadata.last_accessed = Some(Utc::now());
        let accessed = RemoteAccount::new(institution, &metadata, &details).unwrap();
        assert!(!accessed.changes(&model).is_changed());

        metadata.status = Some("SUSPENDED".to_string());
        let suspended = RemoteAccount::new(institution, &metadata, &details).unwrap();
        let changes = suspended.changes(&model);
        assert!(matches!(changes.metadata, ActiveValue::Set(_)));
        assert!(matches!(
            &changes.status,
            ActiveValue::Set(Some(status)) if status == "SUSPENDED"
        ));
    }

    #[test]
    fn only_differing_fields_are_set() {
        let (metadata, details) = remote("Checking");
        let institution = Uuid::new_v4();
        let model = stored(RemoteAccount::new(institution, &metadata, &details).unwrap());

        let (metadata, details) = remote("Main checking");
        let renamed = RemoteAccount::new(institution, &metadata, &details).unwrap();
        let changes = renamed.changes(&model);

        assert!(changes.is_changed());
        assert!(matches!(
            &changes.name,
            ActiveValue::Set(Some(name)) if name == "Main checking"
        ));
        assert!(matches!(changes.iban, ActiveValue::Unchanged(_)));
        assert!(matches!(changes.alias, ActiveValue::Unchanged(_)));
    }
}
