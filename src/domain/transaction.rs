use super::account::{Account, Amount};
use crate::error::TransferError;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
    Withdraw,
    Deposit,
    Transfer,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Withdraw => "withdraw",
            TransactionType::Deposit => "deposit",
            TransactionType::Transfer => "transfer",
        }
    }

    /// Rejects a request whose declared type does not match the operation it was sent to.
    pub fn check_declared(self, declared: &str) -> Result<(), TransferError> {
        if declared.trim().eq_ignore_ascii_case(self.as_str()) {
            Ok(())
        } else {
            Err(TransferError::InvalidRequestType {
                expected: self.as_str().to_string(),
                got: declared.to_string(),
            })
        }
    }
}

impl FromStr for TransactionType {
    type Err = TransferError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "withdraw" => Ok(TransactionType::Withdraw),
            "deposit" => Ok(TransactionType::Deposit),
            "transfer" => Ok(TransactionType::Transfer),
            other => Err(TransferError::InvalidRequestType {
                expected: "withdraw|deposit|transfer".to_string(),
                got: other.to_string(),
            }),
        }
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A committed money movement. Immutable once the store assigns its id.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct Transaction {
    pub id: u64,
    pub r#type: TransactionType,
    pub amount: Amount,
    pub fee: Decimal,
    /// Always `amount + fee`.
    pub total: Decimal,
    /// Source account as it looked after the commit.
    pub account: Account,
    /// Receiving account after the commit, transfers only.
    pub receiver: Option<Account>,
    pub submitted_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    /// Set when the transfer was produced by the scheduled pipeline.
    #[serde(default)]
    pub scheduled_id: Option<u64>,
}

impl Transaction {
    pub fn new(
        r#type: TransactionType,
        amount: Amount,
        fee: Decimal,
        account: Account,
        receiver: Option<Account>,
        submitted_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: 0,
            r#type,
            amount,
            fee,
            total: amount.value() + fee,
            account,
            receiver,
            submitted_at,
            created_at: Utc::now(),
            scheduled_id: None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy, Default)]
#[serde(rename_all = "lowercase")]
pub enum ScheduledStatus {
    #[default]
    Pending,
    Processed,
    /// Terminal: the transfer failed permanently or ran out of attempts.
    Failed,
}

/// A transfer recorded now and executed by the pipeline once due.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct ScheduledTransaction {
    pub id: u64,
    pub amount: Amount,
    pub r#type: TransactionType,
    pub account_no: String,
    pub receiver_no: String,
    pub status: ScheduledStatus,
    pub submitted_at: DateTime<Utc>,
    pub execute_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub attempts: u32,
    /// Earliest time a failed attempt may be picked up again.
    #[serde(default)]
    pub retry_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_error: Option<String>,
}

impl ScheduledTransaction {
    pub fn new(
        account_no: impl Into<String>,
        receiver_no: impl Into<String>,
        amount: Amount,
        execute_at: DateTime<Utc>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: 0,
            amount,
            r#type: TransactionType::Transfer,
            account_no: account_no.into(),
            receiver_no: receiver_no.into(),
            status: ScheduledStatus::Pending,
            submitted_at: now,
            execute_at,
            updated_at: now,
            attempts: 0,
            retry_at: None,
            last_error: None,
        }
    }

    /// Pending and eligible at `at`.
    pub fn is_due(&self, at: DateTime<Utc>) -> bool {
        self.status == ScheduledStatus::Pending
            && self.execute_at <= at
            && self.retry_at.is_none_or(|retry| retry <= at)
    }

    /// Counts a failed attempt and lets `policy` decide, from the stored
    /// count, whether it is retried or marked failed.
    pub fn record_failure(&mut self, reason: String, policy: &FailurePolicy) {
        self.attempts += 1;
        self.last_error = Some(reason);
        self.retry_at = policy.retry_at(self.attempts);
        if self.retry_at.is_none() {
            self.status = ScheduledStatus::Failed;
        }
        self.updated_at = policy.now;
    }
}

/// Exponential backoff: `base`, doubled per extra attempt, capped at `max`.
pub fn backoff(base: Duration, max: Duration, attempts: u32) -> Duration {
    let factor = 2u32.saturating_pow(attempts.saturating_sub(1));
    base.saturating_mul(factor).min(max)
}

/// How a failed scheduled attempt is settled. Handed to the store so the
/// decision is made against the attempt count it holds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FailurePolicy {
    /// Fail now regardless of attempts left.
    pub permanent: bool,
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub now: DateTime<Utc>,
}

impl FailurePolicy {
    /// When the next attempt may run, or `None` to give up.
    pub fn retry_at(&self, attempts: u32) -> Option<DateTime<Utc>> {
        if self.permanent || attempts >= self.max_attempts {
            return None;
        }
        let delay = backoff(self.base_delay, self.max_delay, attempts);
        let delay = chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::hours(1));
        Some(self.now + delay)
    }
}
