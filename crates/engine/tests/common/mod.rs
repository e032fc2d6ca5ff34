#![allow(dead_code)]

use std::sync::Arc;

use bank_api::{MockBankApi, mock};
use sea_orm::{ConnectionTrait, Database, DatabaseConnection, Statement, Value};
use uuid::Uuid;

use engine::{Credentials, Engine, EngineSettings, Integration, Requisition};
use migration::MigratorTrait;

pub const SECRET_ID: &str = "8126e9fb-93c9-4228-937c-68f0383c2df7";
pub const SECRET_KEY: &str = "secret-key";
pub const INSTITUTION: &str = "SANDBOXFINANCE_SFIN0000";
pub const SITE_URL: &str = "https://bankfeed.test";

pub struct Harness {
    pub engine: Engine,
    pub db: DatabaseConnection,
    pub api: Arc<MockBankApi>,
    pub integration: Integration,
}

pub fn credentials() -> Credentials {
    Credentials::parse(SECRET_ID, SECRET_KEY).unwrap()
}

pub async fn harness() -> Harness {
    let db = Database::connect("sqlite::memory:").await.unwrap();
    migration::Migrator::up(&db, None).await.unwrap();

    let api = Arc::new(MockBankApi::new(SECRET_ID, SECRET_KEY));
    api.add_institution(mock::institution(INSTITUTION, "Sandbox Finance", "XX"));

    let engine = Engine::builder()
        .database(db.clone())
        .api(api.clone())
        .settings(EngineSettings::for_site(SITE_URL))
        .build()
        .await
        .unwrap();
    let integration = engine.integration(&credentials()).await.unwrap();

    Harness {
        engine,
        db,
        api,
        integration,
    }
}

impl Harness {
    /// Register a remote account at the sandbox institution.
    pub fn add_account(&self, name: &str) -> Uuid {
        let id = Uuid::new_v4();
        let iban = format!("XX00SFIN{}", &id.simple().to_string()[..10]);
        self.api.add_account(
            mock::account_metadata(id, INSTITUTION, &iban),
            mock::account_details(name, "EUR"),
        );
        id
    }

    /// Create a requisition, link `accounts` to it remotely and accept it.
    pub async fn linked_requisition(&self, accounts: &[Uuid], max_days: u32) -> Requisition {
        let requisition = self
            .engine
            .create_requisition(&self.integration, INSTITUTION, max_days)
            .await
            .unwrap();
        self.api
            .link_requisition(requisition.nordigen_id, accounts.to_vec());
        self.engine
            .accept_requisition(&self.integration, &requisition)
            .await
            .unwrap()
    }

    pub async fn count(&self, table: &str) -> i64 {
        self.scalar(&format!("SELECT COUNT(*) AS n FROM {table}"), Vec::new())
            .await
    }

    pub async fn scalar(&self, sql: &str, values: Vec<Value>) -> i64 {
        let backend = self.db.get_database_backend();
        let row = self
            .db
            .query_one(Statement::from_sql_and_values(backend, sql, values))
            .await
            .unwrap()
            .unwrap();
        row.try_get::<i64>("", "n").unwrap()
    }

    pub async fn execute(&self, sql: &str, values: Vec<Value>) {
        let backend = self.db.get_database_backend();
        self.db
            .execute(Statement::from_sql_and_values(backend, sql, values))
            .await
            .unwrap();
    }
}
