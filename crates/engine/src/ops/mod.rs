use std::{fmt, sync::Arc};

use chrono::Duration;
use sea_orm::DatabaseConnection;

use bank_api::BankApi;

use crate::{EngineError, ResultEngine};

mod accounts;
mod institutions;
mod requisitions;
mod sync;
mod tokens;

pub use sync::{AccountSyncSummary, HistoryPolicy, SyncCmd, SyncReport, SyncSelector};

/// Run a block inside a DB transaction, committing on success and rolling back on error.
macro_rules! with_tx {
    ($self:expr, |$tx:ident| $body:expr) => {{
        let $tx = $self.database.begin().await?;
        let result = $body;
        match result {
            Ok(value) => {
                $tx.commit().await?;
                Ok(value)
            }
            Err(err) => Err(err),
        }
    }};
}

pub(crate) use with_tx;

/// Path the provider sends the end user back to after linking a bank.
pub const REDIRECT_PATH: &str = "/nordigen/redirect";

/// Tunables of the engine.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EngineSettings {
    /// Absolute URL of the redirect callback handed to the provider.
    pub redirect_uri: String,
    /// Tokens expired less than this long ago are still used.
    pub token_grace: Duration,
    /// History fetched by incremental syncs, and by full syncs of accounts
    /// without a linked requisition.
    pub incremental_days: u32,
    /// Width of a single transaction fetch window.
    pub page_days: u32,
}

impl EngineSettings {
    /// Settings whose redirect URI points at `site_url`.
    pub fn for_site(site_url: &str) -> Self {
        Self {
            redirect_uri: format!("{}{REDIRECT_PATH}", site_url.trim_end_matches('/')),
            ..Self::default()
        }
    }
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            redirect_uri: format!("http://localhost:3000{REDIRECT_PATH}"),
            token_grace: Duration::seconds(10),
            incremental_days: 30,
            page_days: 30,
        }
    }
}

pub struct Engine {
    database: DatabaseConnection,
    api: Arc<dyn BankApi>,
    settings: EngineSettings,
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("database", &self.database)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl Engine {
    /// Return a builder for `Engine`. Help to build the struct.
    pub fn builder() -> EngineBuilder {
        EngineBuilder::default()
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }
}

/// The builder for `Engine`
#[derive(Default)]
pub struct EngineBuilder {
    database: DatabaseConnection,
    api: Option<Arc<dyn BankApi>>,
    settings: EngineSettings,
}

impl EngineBuilder {
    /// Pass the required database
    pub fn database(mut self, db: DatabaseConnection) -> EngineBuilder {
        self.database = db;
        self
    }

    /// Pass the required provider client
    pub fn api(mut self, api: Arc<dyn BankApi>) -> EngineBuilder {
        self.api = Some(api);
        self
    }

    pub fn settings(mut self, settings: EngineSettings) -> EngineBuilder {
        self.settings = settings;
        self
    }

    /// Construct `Engine`
    pub async fn build(self) -> ResultEngine<Engine> {
        let api = self
            .api
            .ok_or_else(|| EngineError::InvalidConfig("bank api client is required".to_string()))?;
        if self.settings.page_days == 0 {
            return Err(EngineError::InvalidConfig(
                "page_days must be > 0".to_string(),
            ));
        }
        if self.settings.redirect_uri.trim().is_empty() {
            return Err(EngineError::InvalidConfig(
                "redirect_uri must not be empty".to_string(),
            ));
        }
        Ok(Engine {
            database: self.database,
            api,
            settings: self.settings,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redirect_uri_follows_site_url() {
        assert_eq!(
            EngineSettings::for_site("https://money.example/").redirect_uri,
            "https://money.example/nordigen/redirect"
        );
        assert_eq!(
            EngineSettings::for_site("http://localhost:8080").redirect_uri,
            "http://localhost:8080/nordigen/redirect"
        );
    }
}
