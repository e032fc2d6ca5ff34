use std::{sync::Arc, time::Duration};

use bank_api::HttpBankApi;
use engine::{Credentials, Engine, EngineSettings};
use migration::{Migrator, MigratorTrait};
use server::ServerState;
use settings::Database;

mod jobs;
mod settings;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    let settings = settings::Settings::new()?;
    let mut tasks = tokio::task::JoinSet::new();

    tracing_subscriber::fmt()
        .with_env_filter(format!(
            "bankfeed={level},server={level},engine={level},bank_api={level}",
            level = settings.app.level
        ))
        .init();

    let db = parse_database(&settings.database).await?;
    let http = reqwest::Client::builder().timeout(HTTP_TIMEOUT).build()?;
    let api = match &settings.nordigen.base_url {
        Some(url) => HttpBankApi::new(http, url)?,
        None => HttpBankApi::with_default_url(http)?,
    };
    let engine_settings = settings
        .server
        .as_ref()
        .map(|server| EngineSettings::for_site(&server.site_url))
        .unwrap_or_default();
    let engine = Arc::new(
        Engine::builder()
            .database(db)
            .api(Arc::new(api))
            .settings(engine_settings)
            .build()
            .await?,
    );
    let credentials = Credentials::parse(
        &settings.nordigen.secret_id,
        settings.nordigen.secret_key.clone(),
    )?;
    let integration = engine.integration(&credentials).await?;
    tracing::info!(integration = %integration.id, "integration ready");

    if let Some(server) = settings.server {
        let state = ServerState::new(engine.clone(), integration.clone());
        tasks.spawn(async move {
            tracing::info!("Found server settings...");
            let bind = server.bind.unwrap_or_else(|| "127.0.0.1".to_string());
            let addr = format!("{}:{}", bind, server.port);
            let listener = match tokio::net::TcpListener::bind(addr).await {
                Ok(listener) => listener,
                Err(err) => {
                    tracing::error!("failed to bind server listener: {err}");
                    return;
                }
            };
            if let Err(err) = server::run_with_listener(state, listener).await {
                tracing::error!("server failed: {err}");
            }
        });
    }

    if let Some(sync) = settings.sync {
        tracing::info!("Found sync settings...");
        tasks.spawn(jobs::sync_periodically(engine.clone(), integration, sync));
    }

    if tasks.is_empty() {
        tracing::warn!("neither [server] nor [sync] is configured, nothing to run");
    }

    while tasks.join_next().await.is_some() {
        tasks.shutdown().await;
    }

    Ok(())
}

async fn parse_database(config: &Database) -> Result<sea_orm::DatabaseConnection, BoxError> {
    let url = match config {
        Database::Memory => String::from("sqlite::memory:"),
        Database::Sqlite(path) => format!("sqlite:{}?mode=rwc", path),
    };

    let database = sea_orm::Database::connect(url).await?;
    Migrator::up(&database, None).await?;
    Ok(database)
}
