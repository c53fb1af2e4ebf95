//! Structured events exchanged over the broker.

use super::transaction::{ScheduledTransaction, Transaction, TransactionType};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

pub const SCHEDULED_TRANSFER_TOPIC: &str = "scheduled_transactions";
pub const NOTIFICATION_TOPIC: &str = "sms_transaction";

/// One due scheduled transfer, as published by the poller.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct ScheduledTransferMessage {
    pub id: u64,
    pub r#type: TransactionType,
    pub amount: Decimal,
    pub account_no: String,
    pub receiver_no: String,
    pub submitted_at: DateTime<Utc>,
}

impl From<&ScheduledTransaction> for ScheduledTransferMessage {
    fn from(st: &ScheduledTransaction) -> Self {
        Self {
            id: st.id,
            r#type: st.r#type,
            amount: st.amount.value(),
            account_no: st.account_no.clone(),
            receiver_no: st.receiver_no.clone(),
            submitted_at: st.submitted_at,
        }
    }
}

/// Published after every successful withdraw, deposit or transfer.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct TransactionNotification {
    pub r#type: TransactionType,
    pub amount: Decimal,
    pub account_no: String,
    pub created_at: DateTime<Utc>,
    /// Source account balance after the operation.
    pub remaining_balance: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receiver_no: Option<String>,
}

impl From<&Transaction> for TransactionNotification {
    fn from(tx: &Transaction) -> Self {
        Self {
            r#type: tx.r#type,
            amount: tx.amount.value(),
            account_no: tx.account.account_no.clone(),
            created_at: tx.created_at,
            remaining_balance: tx.account.balance.value(),
            receiver_no: tx.receiver.as_ref().map(|r| r.account_no.clone()),
        }
    }
}
