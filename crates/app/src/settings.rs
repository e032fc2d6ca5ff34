//! Handles settings for the application. Configuration is written in
//! `settings.toml` and can be overridden by `BANKFEED__<SECTION>__<KEY>`
//! environment variables.
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct App {
    #[serde(default = "default_level")]
    pub level: String,
}

impl Default for App {
    fn default() -> Self {
        Self {
            level: default_level(),
        }
    }
}

fn default_level() -> String {
    "info".to_string()
}

#[derive(Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Database {
    Memory,
    Sqlite(String),
}

#[derive(Debug, Deserialize)]
pub struct Nordigen {
    pub secret_id: String,
    pub secret_key: String,
    pub base_url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Server {
    pub bind: Option<String>,
    pub port: u16,
    /// Public base URL the provider redirects end users to.
    pub site_url: String,
}

#[derive(Debug, Deserialize)]
pub struct Sync {
    #[serde(default = "default_interval")]
    pub interval_secs: u64,
    #[serde(default = "default_max_age")]
    pub max_age_secs: i64,
    #[serde(default)]
    pub history: bool,
    #[serde(default = "default_true")]
    pub transactions: bool,
}

fn default_interval() -> u64 {
    6 * 60 * 60
}

fn default_max_age() -> i64 {
    15 * 60
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub app: App,
    pub database: Database,
    pub nordigen: Nordigen,
    pub server: Option<Server>,
    pub sync: Option<Sync>,
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        Self::from_config(
            Config::builder()
                .add_source(File::with_name("settings").required(false))
                .add_source(Environment::with_prefix("BANKFEED").separator("__")),
        )
    }

    fn from_config(
        builder: config::ConfigBuilder<config::builder::DefaultState>,
    ) -> Result<Self, ConfigError> {
        builder.build()?.try_deserialize()
    }
}
