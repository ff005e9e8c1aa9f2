//! Wallet statements as CSV: one row per ledger transaction, oldest first.

pub mod statement_reader;
pub mod statement_writer;

use crate::domain::coins::{Amount, Coins};
use crate::domain::session::SessionId;
use crate::domain::transaction::{LedgerEntry, Transaction, TransactionId, TransactionType};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatementRow {
    pub id: TransactionId,
    pub created_at: DateTime<Utc>,
    pub r#type: TransactionType,
    pub amount: Amount,
    pub balance_after: Coins,
    pub description: String,
    pub session_id: Option<SessionId>,
}

impl From<&Transaction> for StatementRow {
    fn from(tx: &Transaction) -> Self {
        Self {
            id: tx.id,
            created_at: tx.created_at,
            r#type: tx.r#type,
            amount: tx.amount,
            balance_after: tx.balance_after,
            description: tx.description.clone(),
            session_id: tx.session_id,
        }
    }
}

impl LedgerEntry for StatementRow {
    fn entry_id(&self) -> TransactionId {
        self.id
    }

    fn delta(&self) -> Coins {
        match self.r#type {
            TransactionType::Credit => Coins::from(self.amount),
            TransactionType::Debit => Coins::ZERO - Coins::from(self.amount),
        }
    }

    fn balance_after(&self) -> Coins {
        self.balance_after
    }
}
