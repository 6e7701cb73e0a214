//! Balance ledger entries.

use crate::config::TRANSACTIONS_KEY;
use crate::entity::{ensure_amount, Entity, EntityId};
use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
    Deposit,
    Withdrawal,
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransactionType::Deposit => write!(f, "deposit"),
            TransactionType::Withdrawal => write!(f, "withdrawal"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub id: EntityId,
    pub user_id: EntityId,
    pub amount: f64,
    #[serde(rename = "type")]
    pub kind: TransactionType,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub date_time: DateTime<Utc>,
}

impl Transaction {
    pub fn new(
        id: EntityId,
        user_id: EntityId,
        amount: f64,
        kind: TransactionType,
        now: DateTime<Utc>,
    ) -> Self {
        Transaction {
            id,
            user_id,
            amount,
            kind,
            date_time: now,
        }
    }

    /// Effect on the owner's balance: positive for deposits.
    pub fn balance_delta(&self) -> f64 {
        match self.kind {
            TransactionType::Deposit => self.amount,
            TransactionType::Withdrawal => -self.amount,
        }
    }
}

impl Entity for Transaction {
    fn id(&self) -> EntityId {
        self.id
    }

    fn storage_key() -> &'static str {
        TRANSACTIONS_KEY
    }

    fn validate(&self) -> Result<()> {
        ensure_amount("transaction amount", self.amount)
    }
}
