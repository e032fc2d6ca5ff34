//! The module contains `Integration` and the credentials it is built from.
//!
//! An integration is the local tenant of one provider credential pair. Tokens,
//! requisitions and accounts all hang off it.

use std::fmt;

use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use uuid::Uuid;

use crate::{EngineError, ResultEngine, util::parse_uuid};

/// Provider credential pair.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub secret_id: Uuid,
    pub secret_key: String,
}

impl Credentials {
    pub fn new(secret_id: Uuid, secret_key: impl Into<String>) -> Self {
        Self {
            secret_id,
            secret_key: secret_key.into(),
        }
    }

    /// Parse the secret id as it appears in configuration files.
    pub fn parse(secret_id: &str, secret_key: impl Into<String>) -> ResultEngine<Self> {
        let secret_id = Uuid::parse_str(secret_id.trim()).map_err(|_| {
            EngineError::InvalidConfig(format!("secret id must be a uuid, got {secret_id:?}"))
        })?;
        let secret_key = secret_key.into();
        if secret_key.trim().is_empty() {
            return Err(EngineError::InvalidConfig(
                "secret key must not be empty".to_string(),
            ));
        }
        Ok(Self::new(secret_id, secret_key))
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("secret_id", &self.secret_id)
            .field("secret_key", &"<redacted>")
            .finish()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Integration {
    pub id: Uuid,
    pub credentials: Credentials,
    pub created_at: DateTime<Utc>,
}

impl Integration {
    pub(crate) fn from_model(model: Model, credentials: Credentials) -> ResultEngine<Self> {
        let secret_id = parse_uuid(&model.nordigen_id, "secret")?;
        if secret_id != credentials.secret_id {
            return Err(EngineError::InvalidData(format!(
                "integration {} belongs to another secret id",
                model.id
            )));
        }
        Ok(Self {
            id: parse_uuid(&model.id, "integration")?,
            credentials,
            created_at: model.created_at,
        })
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "integrations")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    #[sea_orm(unique)]
    pub nordigen_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
