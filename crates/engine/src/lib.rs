//! Local mirror of open-banking data.
//!
//! The engine owns the provider token cache, the bank-linking (requisition)
//! flow and the synchronization of accounts, balances and booked
//! transactions into a relational store.

pub use accounts::Account;
pub use balances::Balance;
pub use error::EngineError;
pub use institutions::Institution;
pub use integrations::{Credentials, Integration};
pub use ops::{
    AccountSyncSummary, Engine, EngineBuilder, EngineSettings, HistoryPolicy, REDIRECT_PATH,
    SyncCmd, SyncReport, SyncSelector,
};
pub use requisitions::Requisition;
pub use tokens::{CachedToken, TokenType};
pub use transactions::Transaction;

mod accounts;
mod balances;
mod error;
mod institutions;
mod integrations;
mod ops;
mod requisition_accounts;
mod requisitions;
mod tokens;
mod transactions;
mod util;

type ResultEngine<T> = Result<T, EngineError>;
