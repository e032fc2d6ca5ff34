//! Banks known to the provider, cached locally on first use.

use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde_json::Value;
use uuid::Uuid;

use crate::{EngineError, ResultEngine, util::parse_uuid};

#[derive(Clone, Debug, PartialEq)]
pub struct Institution {
    pub id: Uuid,
    /// Provider identifier, e.g. `SANDBOXFINANCE_SFIN0000`.
    pub nordigen_id: String,
    pub name: String,
    pub api_data: Value,
}

impl Institution {
    pub fn logo(&self) -> Option<&str> {
        self.api_data.get("logo").and_then(Value::as_str)
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "institutions")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    #[sea_orm(unique)]
    pub nordigen_id: String,
    pub name: String,
    pub api_data: Json,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl TryFrom<Model> for Institution {
    type Error = EngineError;

    fn try_from(model: Model) -> ResultEngine<Self> {
        Ok(Self {
            id: parse_uuid(&model.id, "institution")?,
            nordigen_id: model.nordigen_id,
            name: model.name,
            api_data: model.api_data,
        })
    }
}
