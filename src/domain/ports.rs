use super::account::Account;
use super::transaction::{FailurePolicy, ScheduledTransaction, Transaction};
use crate::error::StoreResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;

/// Everything that has to land together for one money movement.
///
/// Each account carries the `version` it was read at; the store rejects the
/// whole commit with `StoreError::Conflict` if any of them moved on.
#[derive(Debug, Clone)]
pub struct LedgerCommit {
    pub accounts: Vec<Account>,
    pub transaction: Transaction,
    /// Scheduled transfer to flip to `processed` in the same unit.
    pub scheduled_id: Option<u64>,
}

/// The ledger: single point of truth for balances.
#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn insert(&self, account: Account) -> StoreResult<()>;
    /// `None` means the account does not exist.
    async fn get(&self, account_no: &str) -> StoreResult<Option<Account>>;
    /// Version-checked full replace of balance and status.
    async fn update(&self, account: Account) -> StoreResult<Account>;
    /// Applies a [`LedgerCommit`] atomically and returns the stored transaction.
    async fn commit(&self, commit: LedgerCommit) -> StoreResult<Transaction>;
    async fn get_all(&self) -> StoreResult<Vec<Account>>;
}

#[async_trait]
pub trait TransactionStore: Send + Sync {
    async fn get(&self, tx_id: u64) -> StoreResult<Option<Transaction>>;
    /// Transactions where the account is the source or the receiver.
    async fn for_account(&self, account_no: &str) -> StoreResult<Vec<Transaction>>;
}

#[async_trait]
pub trait ScheduledTransferStore: Send + Sync {
    /// Persists a new pending record and returns it with its id.
    async fn save(&self, scheduled: ScheduledTransaction) -> StoreResult<ScheduledTransaction>;
    async fn get(&self, id: u64) -> StoreResult<Option<ScheduledTransaction>>;
    /// Pending records eligible at `at`.
    async fn due(&self, at: DateTime<Utc>) -> StoreResult<Vec<ScheduledTransaction>>;
    /// Records a failed attempt on a pending record. The attempt count and
    /// the retry-or-fail decision are taken from the stored record under the
    /// store's own write lock.
    async fn record_failure(
        &self,
        id: u64,
        reason: String,
        policy: FailurePolicy,
    ) -> StoreResult<ScheduledTransaction>;
}

/// Fast key/value cache holding limits, thresholds and running sums.
#[async_trait]
pub trait Cache: Send + Sync {
    async fn get(&self, key: &str) -> StoreResult<Option<String>>;
    async fn set(&self, key: &str, value: String, ttl: Option<Duration>) -> StoreResult<()>;
    async fn delete(&self, key: &str) -> StoreResult<()>;
    /// Adds `delta` to a decimal counter, creating it with `ttl` if absent.
    async fn incr_by(&self, key: &str, delta: Decimal, ttl: Option<Duration>)
    -> StoreResult<Decimal>;
}

/// A message handed out by the broker and held until acknowledged.
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    pub tag: u64,
    pub payload: Vec<u8>,
    pub redelivered: bool,
}

/// At-least-once topic broker.
#[async_trait]
pub trait Broker: Send + Sync {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> StoreResult<()>;
    /// Waits for the next message on `topic`. Dropping the future before it
    /// resolves must not lose a message.
    async fn receive(&self, topic: &str) -> StoreResult<Delivery>;
    async fn ack(&self, topic: &str, tag: u64) -> StoreResult<()>;
}

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub type AccountStoreRef = Arc<dyn AccountStore>;
pub type TransactionStoreRef = Arc<dyn TransactionStore>;
pub type ScheduledStoreRef = Arc<dyn ScheduledTransferStore>;
pub type CacheRef = Arc<dyn Cache>;
pub type BrokerRef = Arc<dyn Broker>;
pub type ClockRef = Arc<dyn Clock>;

/// The three storage ports, backed by one store so commits can span them.
#[derive(Clone)]
pub struct Stores {
    pub accounts: AccountStoreRef,
    pub transactions: TransactionStoreRef,
    pub scheduled: ScheduledStoreRef,
}

impl Stores {
    pub fn from_backend<S>(backend: Arc<S>) -> Self
    where
        S: AccountStore + TransactionStore + ScheduledTransferStore + 'static,
    {
        Self {
            accounts: backend.clone(),
            transactions: backend.clone(),
            scheduled: backend,
        }
    }
}
