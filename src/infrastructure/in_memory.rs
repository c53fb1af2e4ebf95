use crate::domain::account::Account;
use crate::domain::ports::{AccountStore, LedgerCommit, ScheduledTransferStore, TransactionStore};
use crate::domain::transaction::{FailurePolicy, ScheduledStatus, ScheduledTransaction, Transaction};
use crate::error::{StoreError, StoreResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Default)]
struct LedgerState {
    accounts: HashMap<String, Account>,
    transactions: BTreeMap<u64, Transaction>,
    scheduled: BTreeMap<u64, ScheduledTransaction>,
    next_tx_id: u64,
    next_scheduled_id: u64,
}

/// A thread-safe in-memory ledger.
///
/// Accounts, transaction records and scheduled transfers share one
/// `Arc<RwLock<..>>` so a [`LedgerCommit`] is applied under a single write
/// guard: either every part lands or none does.
#[derive(Default, Clone)]
pub struct InMemoryLedger {
    state: Arc<RwLock<LedgerState>>,
}

impl InMemoryLedger {
    /// Creates a new, empty in-memory ledger.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AccountStore for InMemoryLedger {
    async fn insert(&self, account: Account) -> StoreResult<()> {
        let mut state = self.state.write().await;
        state.accounts.insert(account.account_no.clone(), account);
        Ok(())
    }

    async fn get(&self, account_no: &str) -> StoreResult<Option<Account>> {
        let state = self.state.read().await;
        Ok(state.accounts.get(account_no).cloned())
    }

    async fn update(&self, mut account: Account) -> StoreResult<Account> {
        let mut state = self.state.write().await;
        let stored = state
            .accounts
            .get_mut(&account.account_no)
            .ok_or_else(|| StoreError::NotFound(account.account_no.clone()))?;
        if stored.version != account.version {
            return Err(StoreError::Conflict(account.account_no));
        }
        account.version += 1;
        account.updated_at = Utc::now();
        *stored = account.clone();
        Ok(account)
    }

    async fn commit(&self, commit: LedgerCommit) -> StoreResult<Transaction> {
        let mut state = self.state.write().await;

        // Validate everything before touching anything.
        for account in &commit.accounts {
            let stored = state
                .accounts
                .get(&account.account_no)
                .ok_or_else(|| StoreError::NotFound(account.account_no.clone()))?;
            if stored.version != account.version {
                return Err(StoreError::Conflict(account.account_no.clone()));
            }
        }
        if let Some(id) = commit.scheduled_id {
            match state.scheduled.get(&id) {
                None => return Err(StoreError::NotFound(format!("scheduled transfer {id}"))),
                Some(st) if st.status != ScheduledStatus::Pending => {
                    return Err(StoreError::AlreadyApplied(id));
                }
                Some(_) => {}
            }
        }

        let now = Utc::now();
        let mut transaction = commit.transaction;
        state.next_tx_id += 1;
        transaction.id = state.next_tx_id;
        transaction.scheduled_id = commit.scheduled_id;

        for mut account in commit.accounts {
            account.version += 1;
            account.updated_at = now;
            if transaction.account.account_no == account.account_no {
                transaction.account = account.clone();
            }
            if let Some(receiver) = transaction.receiver.as_mut()
                && receiver.account_no == account.account_no
            {
                *receiver = account.clone();
            }
            state.accounts.insert(account.account_no.clone(), account);
        }

        if let Some(id) = commit.scheduled_id
            && let Some(st) = state.scheduled.get_mut(&id)
        {
            st.status = ScheduledStatus::Processed;
            st.updated_at = now;
        }

        state.transactions.insert(transaction.id, transaction.clone());
        Ok(transaction)
    }

    async fn get_all(&self) -> StoreResult<Vec<Account>> {
        let state = self.state.read().await;
        let mut accounts: Vec<Account> = state.accounts.values().cloned().collect();
        accounts.sort_by(|a, b| a.account_no.cmp(&b.account_no));
        Ok(accounts)
    }
}

#[async_trait]
impl TransactionStore for InMemoryLedger {
    async fn get(&self, tx_id: u64) -> StoreResult<Option<Transaction>> {
        let state = self.state.read().await;
        Ok(state.transactions.get(&tx_id).cloned())
    }

    async fn for_account(&self, account_no: &str) -> StoreResult<Vec<Transaction>> {
        let state = self.state.read().await;
        Ok(state
            .transactions
            .values()
            .filter(|tx| {
                tx.account.account_no == account_no
                    || tx
                        .receiver
                        .as_ref()
                        .is_some_and(|r| r.account_no == account_no)
            })
            .cloned()
            .collect())
    }
}

#[async_trait]
impl ScheduledTransferStore for InMemoryLedger {
    async fn save(&self, mut scheduled: ScheduledTransaction) -> StoreResult<ScheduledTransaction> {
        let mut state = self.state.write().await;
        state.next_scheduled_id += 1;
        scheduled.id = state.next_scheduled_id;
        scheduled.status = ScheduledStatus::Pending;
        state.scheduled.insert(scheduled.id, scheduled.clone());
        Ok(scheduled)
    }

    async fn get(&self, id: u64) -> StoreResult<Option<ScheduledTransaction>> {
        let state = self.state.read().await;
        Ok(state.scheduled.get(&id).cloned())
    }

    async fn due(&self, at: DateTime<Utc>) -> StoreResult<Vec<ScheduledTransaction>> {
        let state = self.state.read().await;
        Ok(state
            .scheduled
            .values()
            .filter(|st| st.is_due(at))
            .cloned()
            .collect())
    }

    async fn record_failure(
        &self,
        id: u64,
        reason: String,
        policy: FailurePolicy,
    ) -> StoreResult<ScheduledTransaction> {
        let mut state = self.state.write().await;
        let st = state
            .scheduled
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("scheduled transfer {id}")))?;
        if st.status != ScheduledStatus::Pending {
            return Err(StoreError::AlreadyApplied(id));
        }
        st.record_failure(reason, &policy);
        Ok(st.clone())
    }
}
