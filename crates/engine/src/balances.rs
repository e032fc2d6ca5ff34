//! Latest balance snapshot per (account, balance type).

use chrono::{DateTime, NaiveDate, Utc};
use sea_orm::{ActiveValue, entity::prelude::*};
use serde_json::Value;
use uuid::Uuid;

use bank_api::BalanceData;

use crate::{EngineError, ResultEngine, util::parse_uuid, util::snapshot};

#[derive(Clone, Debug, PartialEq)]
pub struct Balance {
    pub account_id: Uuid,
    /// Provider balance type, e.g. `closingBooked` or `interimAvailable`.
    pub balance_type: String,
    /// Decimal amount as reported by the bank.
    pub amount: String,
    pub currency: String,
    pub reference_date: Option<NaiveDate>,
    pub api_data: Value,
    pub synced_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "balances")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub account_id: String,
    pub balance_type: String,
    pub amount: String,
    pub currency: String,
    pub reference_date: Option<NaiveDate>,
    pub api_data: Json,
    pub synced_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl TryFrom<Model> for Balance {
    type Error = EngineError;

    fn try_from(model: Model) -> ResultEngine<Self> {
        Ok(Self {
            account_id: parse_uuid(&model.account_id, "account")?,
            balance_type: model.balance_type,
            amount: model.amount,
            currency: model.currency,
            reference_date: model.reference_date,
            api_data: model.api_data,
            synced_at: model.synced_at,
        })
    }
}

/// Row for an upsert keyed on (account, balance type).
pub(crate) fn new_model(
    account_id: Uuid,
    balance: &BalanceData,
    synced_at: DateTime<Utc>,
) -> ResultEngine<ActiveModel> {
    Ok(ActiveModel {
        id: ActiveValue::Set(Uuid::new_v4().to_string()),
        account_id: ActiveValue::Set(account_id.to_string()),
        balance_type: ActiveValue::Set(balance.balance_type.clone()),
        amount: ActiveValue::Set(balance.balance_amount.amount.clone()),
        currency: ActiveValue::Set(balance.balance_amount.currency.clone()),
        reference_date: ActiveValue::Set(balance.reference_date),
        api_data: ActiveValue::Set(snapshot(balance)?),
        synced_at: ActiveValue::Set(synced_at),
        created_at: ActiveValue::Set(synced_at),
        updated_at: ActiveValue::Set(synced_at),
    })
}
