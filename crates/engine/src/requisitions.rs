//! The module contains `Requisition`, one bank-linking session.

use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde_json::Value;
use uuid::Uuid;

use bank_api::requisition::STATUS_LINKED;

use crate::{EngineError, ResultEngine, util::parse_uuid};

/// A bank-linking session.
///
/// `reference_id` is the opaque token the provider echoes back as `ref` when
/// the end user returns from the bank. `completed` flips once the redirect
/// was handled and never flips back.
#[derive(Clone, Debug, PartialEq)]
pub struct Requisition {
    pub id: Uuid,
    pub integration_id: Uuid,
    pub institution_id: Uuid,
    pub nordigen_id: Uuid,
    pub reference_id: String,
    pub link: String,
    pub status: String,
    pub max_historical_days: u32,
    pub completed: bool,
    pub api_data: Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Requisition {
    pub fn is_linked(&self) -> bool {
        self.status == STATUS_LINKED
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "requisitions")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub integration_id: String,
    pub institution_id: String,
    #[sea_orm(unique)]
    pub nordigen_id: String,
    #[sea_orm(unique)]
    pub reference_id: String,
    pub link: String,
    pub status: String,
    pub max_historical_days: i32,
    pub completed: bool,
    pub api_data: Json,
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

impl TryFrom<Model> for Requisition {
    type Error = EngineError;

    fn try_from(model: Model) -> ResultEngine<Self> {
        Ok(Self {
            id: parse_uuid(&model.id, "requisition")?,
            integration_id: parse_uuid(&model.integration_id, "integration")?,
            institution_id: parse_uuid(&model.institution_id, "institution")?,
            nordigen_id: parse_uuid(&model.nordigen_id, "requisition")?,
            reference_id: model.reference_id,
            link: model.link,
            status: model.status,
            max_historical_days: u32::try_from(model.max_historical_days).map_err(|_| {
                EngineError::InvalidData(format!(
                    "negative max_historical_days on requisition {}",
                    model.id
                ))
            })?,
            completed: model.completed,
            api_data: model.api_data,
            created_at: model.created_at,
            updated_at: model.updated_at,
        })
    }
}
