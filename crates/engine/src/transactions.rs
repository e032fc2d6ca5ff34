//! Booked bank transactions.
//!
//! A transaction is identified by the provider's `internalTransactionId`
//! within its account. Entries without one are never stored.

use chrono::{DateTime, NaiveDate, Utc};
use sea_orm::{ActiveValue, entity::prelude::*};
use serde_json::Value;
use uuid::Uuid;

use bank_api::TransactionData;

use crate::{EngineError, ResultEngine, util::parse_uuid, util::snapshot};

#[derive(Clone, Debug, PartialEq)]
pub struct Transaction {
    pub id: Uuid,
    pub account_id: Uuid,
    /// Provider `internalTransactionId`.
    pub nordigen_id: String,
    pub booking_date: Option<NaiveDate>,
    pub value_date: Option<NaiveDate>,
    pub amount: String,
    pub currency: String,
    /// The complete provider document.
    pub api_data: Value,
    pub created_at: DateTime<Utc>,
}

impl Transaction {
    /// Free-text description, when the bank sent one.
    pub fn description(&self) -> Option<&str> {
        ["remittanceInformationUnstructured", "creditorName", "debtorName"]
            .iter()
            .find_map(|key| self.api_data.get(key).and_then(Value::as_str))
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "transactions")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub account_id: String,
    pub nordigen_id: String,
    pub booking_date: Option<NaiveDate>,
    pub value_date: Option<NaiveDate>,
    pub amount: String,
    pub currency: String,
    pub api_data: Json,
    pub created_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl TryFrom<Model> for Transaction {
    type Error = EngineError;

    fn try_from(model: Model) -> ResultEngine<Self> {
        Ok(Self {
            id: parse_uuid(&model.id, "transaction")?,
            account_id: parse_uuid(&model.account_id, "account")?,
            nordigen_id: model.nordigen_id,
            booking_date: model.booking_date,
            value_date: model.value_date,
            amount: model.amount,
            currency: model.currency,
            api_data: model.api_data,
            created_at: model.created_at,
        })
    }
}

/// Row for a provider transaction, `None` when it carries no stable id.
pub(crate) fn new_model(
    account_id: Uuid,
    data: &TransactionData,
    now: DateTime<Utc>,
) -> ResultEngine<Option<ActiveModel>> {
    let Some(nordigen_id) = data.internal_transaction_id.clone() else {
        return Ok(None);
    };
    Ok(Some(ActiveModel {
        id: ActiveValue::Set(Uuid::new_v4().to_string()),
        account_id: ActiveValue::Set(account_id.to_string()),
        nordigen_id: ActiveValue::Set(nordigen_id),
        booking_date: ActiveValue::Set(data.booking_date),
        value_date: ActiveValue::Set(data.value_date),
        amount: ActiveValue::Set(data.transaction_amount.amount.clone()),
        currency: ActiveValue::Set(data.transaction_amount.currency.clone()),
        api_data: ActiveValue::Set(snapshot(data)?),
        created_at: ActiveValue::Set(now),
    }))
}
