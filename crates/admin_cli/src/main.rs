use std::{error::Error, io::Write, sync::Arc, time::Duration};

use bank_api::HttpBankApi;
use clap::{Args, Parser, Subcommand};
use crossterm::{
    cursor,
    event::{self, Event, KeyCode, KeyEvent, KeyModifiers},
    execute,
    style::Print,
    terminal,
    terminal::ClearType,
};
use engine::{Credentials, Engine, EngineSettings, HistoryPolicy, Integration, SyncCmd, SyncSelector};
use migration::MigratorTrait;
use sea_orm::{Database, DatabaseConnection};
use uuid::Uuid;

type BoxError = Box<dyn Error + Send + Sync>;

#[derive(Parser, Debug)]
#[command(name = "bankfeed_admin")]
#[command(about = "Operator utilities for bankfeed (link banks, run syncs, inspect data)")]
struct Cli {
    /// Database connection string (also read from `DATABASE_URL`).
    #[arg(
        long,
        env = "DATABASE_URL",
        default_value = "sqlite:./bankfeed.db?mode=rwc"
    )]
    database_url: String,

    /// Provider secret id (also read from `NORDIGEN_SECRET_ID`).
    #[arg(long, env = "NORDIGEN_SECRET_ID")]
    secret_id: String,

    /// Provider secret key (also read from `NORDIGEN_SECRET_KEY`). Prompted
    /// for when missing.
    #[arg(long, env = "NORDIGEN_SECRET_KEY", hide_env_values = true)]
    secret_key: Option<String>,

    /// Override the provider API base URL.
    #[arg(long, env = "NORDIGEN_BASE_URL")]
    base_url: Option<String>,

    /// Public base URL serving the redirect callback.
    #[arg(long, env = "SITE_URL", default_value = "http://localhost:3000")]
    site_url: String,

    /// Log filter for the engine, e.g. `debug`.
    #[arg(long, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List the banks available in a country.
    Institutions(InstitutionsArgs),
    Requisition(Requisition),
    /// Synchronize balances and transactions.
    Sync(SyncArgs),
    Accounts(Accounts),
    Transactions(Transactions),
}

#[derive(Args, Debug)]
struct InstitutionsArgs {
    /// ISO 3166 two-letter country code.
    country: String,
}

#[derive(Args, Debug)]
struct Requisition {
    #[command(subcommand)]
    command: RequisitionCommand,
}

#[derive(Subcommand, Debug)]
enum RequisitionCommand {
    /// Open a bank-linking session and print its link.
    Create(RequisitionCreateArgs),
    List,
}

#[derive(Args, Debug)]
struct RequisitionCreateArgs {
    /// Provider institution id, e.g. `SANDBOXFINANCE_SFIN0000`.
    institution: String,
    #[arg(long, default_value_t = 90)]
    days: u32,
}

#[derive(Args, Debug)]
struct SyncArgs {
    /// Provider requisition ids; all requisitions when omitted.
    requisitions: Vec<Uuid>,
    /// Skip accounts synced less than this many seconds ago.
    #[arg(long, default_value_t = 900)]
    max_age: i64,
    /// Fetch the whole history the requisition grants.
    #[arg(long)]
    history: bool,
    /// Only refresh balances.
    #[arg(long)]
    no_transactions: bool,
}

#[derive(Args, Debug)]
struct Accounts {
    #[command(subcommand)]
    command: AccountsCommand,
}

#[derive(Subcommand, Debug)]
enum AccountsCommand {
    List,
    /// Show the latest balances of an account.
    Balances(AccountArgs),
    /// Set the alias of an account, or clear it when omitted.
    Alias(AliasArgs),
}

#[derive(Args, Debug)]
struct AccountArgs {
    /// Provider account id.
    account: Uuid,
}

#[derive(Args, Debug)]
struct AliasArgs {
    /// Provider account id.
    account: Uuid,
    alias: Option<String>,
}

#[derive(Args, Debug)]
struct Transactions {
    #[command(subcommand)]
    command: TransactionsCommand,
}

#[derive(Subcommand, Debug)]
enum TransactionsCommand {
    List(TransactionsListArgs),
}

#[derive(Args, Debug)]
struct TransactionsListArgs {
    /// Provider account id.
    account: Uuid,
    #[arg(long, default_value_t = 20)]
    limit: u64,
}

impl SyncArgs {
    fn command(&self, incremental_days: u32) -> SyncCmd {
        let selector = if self.requisitions.is_empty() {
            SyncSelector::All
        } else {
            SyncSelector::Requisitions(self.requisitions.clone())
        };
        let history = if self.history {
            HistoryPolicy::FullHistory
        } else {
            HistoryPolicy::FixedWindow(incremental_days)
        };
        SyncCmd {
            selector,
            max_age: chrono::Duration::seconds(self.max_age.max(0)),
            history,
            transactions: !self.no_transactions,
        }
    }
}

struct RawModeGuard;

impl RawModeGuard {
    fn enter() -> Result<Self, BoxError> {
        terminal::enable_raw_mode()?;
        Ok(Self)
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        let _ = terminal::disable_raw_mode();
    }
}

fn prompt_secret(prompt: &str) -> Result<String, BoxError> {
    let _raw = RawModeGuard::enter()?;

    let mut out = std::io::stderr();
    execute!(
        out,
        cursor::MoveToColumn(0),
        terminal::Clear(ClearType::CurrentLine),
        Print(prompt)
    )?;
    out.flush()?;

    let mut buf = String::new();
    loop {
        let Event::Key(KeyEvent {
            code, modifiers, ..
        }) = event::read()?
        else {
            continue;
        };

        match code {
            KeyCode::Enter => {
                execute!(out, Print("\r\n"))?;
                out.flush()?;
                break;
            }
            KeyCode::Backspace => {
                if buf.pop().is_some() {
                    execute!(out, cursor::MoveLeft(1), Print(" "), cursor::MoveLeft(1))?;
                    out.flush()?;
                }
            }
            KeyCode::Char('c') if modifiers.contains(KeyModifiers::CONTROL) => {
                execute!(out, Print("\r\n"))?;
                out.flush()?;
                return Err("interrupted".into());
            }
            KeyCode::Char(ch) if !modifiers.contains(KeyModifiers::CONTROL) => {
                buf.push(ch);
                execute!(out, Print("*"))?;
                out.flush()?;
            }
            _ => {}
        }
    }

    Ok(buf)
}

async fn connect_db(database_url: &str) -> Result<DatabaseConnection, BoxError> {
    let db = Database::connect(database_url).await?;
    migration::Migrator::up(&db, None).await?;
    Ok(db)
}

async fn build_engine(cli: &Cli, db: DatabaseConnection) -> Result<Engine, BoxError> {
    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(30))
        .build()?;
    let api = match &cli.base_url {
        Some(url) => HttpBankApi::new(http, url)?,
        None => HttpBankApi::with_default_url(http)?,
    };
    Ok(Engine::builder()
        .database(db)
        .api(Arc::new(api))
        .settings(EngineSettings::for_site(&cli.site_url))
        .build()
        .await?)
}

async fn integration(cli: &Cli, engine: &Engine) -> Result<Integration, BoxError> {
    let secret_key = match &cli.secret_key {
        Some(key) => key.clone(),
        None => prompt_secret("Secret key: ")?,
    };
    let credentials = Credentials::parse(&cli.secret_id, secret_key)?;
    Ok(engine.integration(&credentials).await?)
}

fn requisition_line(requisition: &engine::Requisition) -> String {
    format!(
        "{}\t{}\t{}\t{}",
        requisition.nordigen_id,
        requisition.status,
        if requisition.completed { "completed" } else { "pending" },
        requisition.link
    )
}

fn or_dash(value: Option<&str>) -> &str {
    value.unwrap_or("-")
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(format!(
            "engine={level},bank_api={level}",
            level = cli.log_level
        ))
        .with_writer(std::io::stderr)
        .init();

    let db = connect_db(&cli.database_url).await?;
    let engine = build_engine(&cli, db).await?;
    let integration = integration(&cli, &engine).await?;

    match &cli.command {
        Command::Institutions(args) => {
            for institution in engine.institutions(&integration, &args.country).await? {
                println!(
                    "{}\t{}\t{}",
                    institution.id,
                    or_dash(institution.transaction_total_days.as_deref()),
                    institution.name
                );
            }
        }
        Command::Requisition(Requisition {
            command: RequisitionCommand::Create(args),
        }) => {
            let requisition = engine
                .create_requisition(&integration, &args.institution, args.days)
                .await?;
            println!("created requisition: {}", requisition.nordigen_id);
            println!("{}", requisition.link);
        }
        Command::Requisition(Requisition {
            command: RequisitionCommand::List,
        }) => {
            for requisition in engine.requisitions(&integration).await? {
                println!("{}", requisition_line(&requisition));
            }
        }
        Command::Sync(args) => {
            let cmd = args.command(engine.settings().incremental_days);
            let report = engine.sync(&integration, &cmd).await?;
            println!(
                "synced {} requisitions, {} accounts ({} skipped), {} new transactions",
                report.requisitions,
                report.accounts_synced,
                report.accounts_skipped,
                report.transactions
            );
        }
        Command::Accounts(Accounts {
            command: AccountsCommand::List,
        }) => {
            for account in engine.accounts(&integration).await? {
                let synced = account
                    .synced_at
                    .map(|at| at.format("%Y-%m-%d %H:%M").to_string());
                println!(
                    "{}\t{}\t{}\t{}\t{}",
                    account.nordigen_id,
                    or_dash(account.iban.as_deref()),
                    or_dash(account.currency.as_deref()),
                    account.display_name(),
                    or_dash(synced.as_deref())
                );
            }
        }
        Command::Accounts(Accounts {
            command: AccountsCommand::Balances(args),
        }) => {
            let account = engine.account(&integration, args.account).await?;
            for balance in engine.balances(&account).await? {
                println!(
                    "{}\t{} {}\t{}",
                    balance.balance_type,
                    balance.amount,
                    balance.currency,
                    balance
                        .reference_date
                        .map(|date| date.to_string())
                        .unwrap_or_else(|| "-".to_string())
                );
            }
        }
        Command::Accounts(Accounts {
            command: AccountsCommand::Alias(args),
        }) => {
            let account = engine
                .set_account_alias(&integration, args.account, args.alias.as_deref())
                .await?;
            match &account.alias {
                Some(alias) => println!("alias of {} set to {alias}", account.nordigen_id),
                None => println!("alias of {} cleared", account.nordigen_id),
            }
        }
        Command::Transactions(Transactions {
            command: TransactionsCommand::List(args),
        }) => {
            let account = match engine.account(&integration, args.account).await {
                Ok(account) => account,
                Err(engine::EngineError::KeyNotFound(_)) => {
                    eprintln!("account not found: {}", args.account);
                    std::process::exit(1);
                }
                Err(err) => return Err(err.into()),
            };
            for tx in engine.transactions(&account, Some(args.limit)).await? {
                println!(
                    "{}\t{} {}\t{}",
                    tx.booking_date
                        .map(|date| date.to_string())
                        .unwrap_or_else(|| "-".to_string()),
                    tx.amount,
                    tx.currency,
                    or_dash(tx.description())
                );
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sync_flags_build_the_command() {
        let cli = Cli::parse_from([
            "bankfeed_admin",
            "--secret-id",
            "8126e9fb-93c9-4228-937c-68f0383c2df7",
            "--secret-key",
            "key",
            "sync",
            "3fa85f64-5717-4562-b3fc-2c963f66afa6",
            "--history",
            "--no-transactions",
        ]);
        let Command::Sync(args) = cli.command else {
            panic!("expected sync");
        };
        let cmd = args.command(30);
        assert_eq!(
            cmd.selector,
            SyncSelector::Requisitions(vec![
                Uuid::parse_str("3fa85f64-5717-4562-b3fc-2c963f66afa6").unwrap()
            ])
        );
        assert_eq!(cmd.history, HistoryPolicy::FullHistory);
        assert_eq!(cmd.max_age, chrono::Duration::seconds(900));
        assert!(!cmd.transactions);
    }

    #[test]
    fn requisition_line_shows_status_and_link() {
        let now = chrono::Utc::now();
        let requisition = engine::Requisition {
            id: Uuid::new_v4(),
            integration_id: Uuid::new_v4(),
            institution_id: Uuid::new_v4(),
            nordigen_id: Uuid::parse_str("3fa85f64-5717-4562-b3fc-2c963f66afa6").unwrap(),
            reference_id: "ref".to_string(),
            link: "https://bank.example/link/3fa85f64".to_string(),
            status: "LN".to_string(),
            max_historical_days: 90,
            completed: true,
            api_data: Default::default(),
            created_at: now,
            updated_at: now,
        };

        assert_eq!(
            requisition_line(&requisition),
            "3fa85f64-5717-4562-b3fc-2c963f66afa6\tLN\tcompleted\thttps://bank.example/link/3fa85f64"
        );
    }

    #[test]
    fn sync_defaults_to_all_and_incremental() {
        let cli = Cli::parse_from([
            "bankfeed_admin",
            "--secret-id",
            "8126e9fb-93c9-4228-937c-68f0383c2df7",
            "--secret-key",
            "key",
            "sync",
        ]);
        let Command::Sync(args) = cli.command else {
            panic!("expected sync");
        };
        let cmd = args.command(30);
        assert_eq!(cmd.selector, SyncSelector::All);
        assert_eq!(cmd.history, HistoryPolicy::FixedWindow(30));
        assert!(cmd.transactions);
    }
}
