//! Cached provider tokens. At most one row exists per (integration, type).

use chrono::{DateTime, Duration, Utc};
use sea_orm::entity::prelude::*;

use crate::{EngineError, ResultEngine};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TokenType {
    Access,
    Refresh,
}

impl TokenType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Access => "access",
            Self::Refresh => "refresh",
        }
    }
}

impl TryFrom<&str> for TokenType {
    type Error = EngineError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "access" => Ok(Self::Access),
            "refresh" => Ok(Self::Refresh),
            other => Err(EngineError::InvalidData(format!(
                "invalid token type: {other}"
            ))),
        }
    }
}

/// A token as cached for an integration.
#[derive(Clone, PartialEq, Eq)]
pub struct CachedToken {
    pub kind: TokenType,
    pub value: String,
    pub expires: DateTime<Utc>,
}

impl std::fmt::Debug for CachedToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CachedToken")
            .field("kind", &self.kind)
            .field("value", &"<redacted>")
            .field("expires", &self.expires)
            .finish()
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "tokens")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub integration_id: String,
    pub token_type: String,
    #[sea_orm(column_type = "Text")]
    pub value: String,
    pub expires: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Model {
    /// A token counts as live while `expires` is after `now - grace`.
    pub(crate) fn is_live(&self, now: DateTime<Utc>, grace: Duration) -> bool {
        self.expires > now - grace
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl TryFrom<Model> for CachedToken {
    type Error = EngineError;

    fn try_from(model: Model) -> ResultEngine<Self> {
        Ok(Self {
            kind: TokenType::try_from(model.token_type.as_str())?,
            value: model.value,
            expires: model.expires,
        })
    }
}
