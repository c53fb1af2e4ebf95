use super::ledger::LedgerAccessor;
use super::limits::LimitGuard;
use super::locks::AccountLocks;
use super::notifications::NotificationPublisher;
use crate::config::EngineConfig;
use crate::domain::account::{Account, AccountStatus, Amount, Balance};
use crate::domain::fee;
use crate::domain::ports::{
    BrokerRef, CacheRef, ClockRef, LedgerCommit, ScheduledStoreRef, Stores, TransactionStoreRef,
};
use crate::domain::transaction::{
    ScheduledStatus, ScheduledTransaction, Transaction, TransactionType,
};
use crate::error::{Result, StoreError, TransferError};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::future::Future;
use tracing::{info, instrument, warn};

/// The money-movement engine.
///
/// Withdraw, deposit and transfer each end in one atomic ledger commit.
/// Read-modify-write on an account is serialized in-process by
/// [`AccountLocks`] and across processes by the store's version check.
pub struct TransferEngine {
    config: EngineConfig,
    ledger: LedgerAccessor,
    limits: LimitGuard,
    transactions: TransactionStoreRef,
    scheduled: ScheduledStoreRef,
    notifier: NotificationPublisher,
    locks: AccountLocks,
    clock: ClockRef,
}

impl TransferEngine {
    pub fn new(
        config: EngineConfig,
        stores: Stores,
        cache: CacheRef,
        broker: BrokerRef,
        clock: ClockRef,
    ) -> Self {
        Self {
            ledger: LedgerAccessor::new(stores.accounts, cache.clone()),
            limits: LimitGuard::new(cache, clock.clone(), config.fallback_daily_limit),
            transactions: stores.transactions,
            scheduled: stores.scheduled,
            notifier: NotificationPublisher::new(broker),
            locks: AccountLocks::new(),
            clock,
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn clock(&self) -> &ClockRef {
        &self.clock
    }

    pub fn ledger(&self) -> &LedgerAccessor {
        &self.ledger
    }

    pub fn limits(&self) -> &LimitGuard {
        &self.limits
    }

    pub fn scheduled_store(&self) -> &ScheduledStoreRef {
        &self.scheduled
    }

    pub async fn transactions_for(&self, account_no: &str) -> Result<Vec<Transaction>> {
        Ok(self.transactions.for_account(account_no).await?)
    }

    pub async fn accounts(&self) -> Result<Vec<Account>> {
        Ok(self.ledger.all().await?)
    }

    #[instrument(skip(self), fields(op = "withdraw"))]
    pub async fn withdraw(&self, account_no: &str, amount: Decimal) -> Result<Transaction> {
        let amount = Amount::new(amount)?;
        let tx = self
            .with_deadline(async {
                let _guard = self.locks.acquire(&[account_no]).await;
                self.retry_on_conflict(|| self.try_single(TransactionType::Withdraw, account_no, amount))
                    .await
            })
            .await?;
        info!(tx_id = tx.id, remaining = %tx.account.balance, "Withdraw committed");
        self.notifier.publish(&tx);
        Ok(tx)
    }

    #[instrument(skip(self), fields(op = "deposit"))]
    pub async fn deposit(&self, account_no: &str, amount: Decimal) -> Result<Transaction> {
        let amount = Amount::new(amount)?;
        let tx = self
            .with_deadline(async {
                let _guard = self.locks.acquire(&[account_no]).await;
                self.retry_on_conflict(|| self.try_single(TransactionType::Deposit, account_no, amount))
                    .await
            })
            .await?;
        info!(tx_id = tx.id, balance = %tx.account.balance, "Deposit committed");
        self.notifier.publish(&tx);
        Ok(tx)
    }

    #[instrument(skip(self), fields(op = "transfer"))]
    pub async fn transfer(
        &self,
        sender_no: &str,
        receiver_no: &str,
        amount: Decimal,
    ) -> Result<Transaction> {
        let amount = validate_transfer(sender_no, receiver_no, amount)?;
        self.locked_transfer(sender_no, receiver_no, amount, None)
            .await
    }

    /// Records a transfer to run once `execute_at` is reached by the poller.
    #[instrument(skip(self), fields(op = "schedule"))]
    pub async fn schedule(
        &self,
        declared_type: &str,
        sender_no: &str,
        receiver_no: &str,
        amount: Decimal,
        execute_at: DateTime<Utc>,
    ) -> Result<ScheduledTransaction> {
        TransactionType::Transfer.check_declared(declared_type)?;
        let amount = validate_transfer(sender_no, receiver_no, amount)?;
        let saved = self
            .with_deadline(async {
                let mut record = ScheduledTransaction::new(sender_no, receiver_no, amount, execute_at);
                record.submitted_at = self.clock.now();
                Ok(self.scheduled.save(record).await?)
            })
            .await?;
        info!(scheduled_id = saved.id, %execute_at, "Transfer scheduled");
        Ok(saved)
    }

    /// Runs a due scheduled transfer. The commit flips the record to
    /// processed, so a second application fails with
    /// [`TransferError::DuplicateScheduledTransfer`].
    #[instrument(skip(self, scheduled), fields(op = "apply_scheduled", scheduled_id = scheduled.id))]
    pub async fn apply_scheduled(&self, scheduled: &ScheduledTransaction) -> Result<Transaction> {
        TransactionType::Transfer.check_declared(scheduled.r#type.as_str())?;
        let amount = validate_transfer(
            &scheduled.account_no,
            &scheduled.receiver_no,
            scheduled.amount.value(),
        )?;
        self.locked_transfer(
            &scheduled.account_no,
            &scheduled.receiver_no,
            amount,
            Some(scheduled.id),
        )
        .await
    }

    async fn locked_transfer(
        &self,
        sender_no: &str,
        receiver_no: &str,
        amount: Amount,
        scheduled_id: Option<u64>,
    ) -> Result<Transaction> {
        let (_guard, tx) = self
            .with_deadline(async {
                let guard = self.locks.acquire(&[sender_no, receiver_no]).await;

                if let Some(id) = scheduled_id {
                    match self.scheduled.get(id).await? {
                        Some(record) if record.status == ScheduledStatus::Pending => {}
                        Some(_) => return Err(TransferError::DuplicateScheduledTransfer(id)),
                        None => {
                            return Err(TransferError::from(StoreError::NotFound(format!(
                                "scheduled transfer {id}"
                            ))));
                        }
                    }
                }

                let tx = self
                    .retry_on_conflict(|| {
                        self.try_transfer(sender_no, receiver_no, amount, scheduled_id)
                    })
                    .await?;
                Ok((guard, tx))
            })
            .await?;

        // Committed: the running sum is recorded whatever the deadline says,
        // and still under the sender lock so check and record stay paired.
        if let Err(e) = self.limits.record_transfer(sender_no, amount.value()).await {
            warn!(error = %e, sender_no, "Failed to record daily running sum");
        }
        info!(
            tx_id = tx.id,
            fee = %tx.fee,
            total = %tx.total,
            remaining = %tx.account.balance,
            "Transfer committed"
        );
        self.notifier.publish(&tx);
        Ok(tx)
    }

    async fn try_transfer(
        &self,
        sender_no: &str,
        receiver_no: &str,
        amount: Amount,
        scheduled_id: Option<u64>,
    ) -> Result<Transaction> {
        self.limits.check_daily(sender_no, amount.value()).await?;

        let mut sender = self.load_source(sender_no).await?;
        let mut receiver = self
            .ledger
            .get(receiver_no)
            .await?
            .ok_or_else(|| TransferError::RecipientNotFound(receiver_no.to_string()))?;
        if receiver.status == AccountStatus::Inactive {
            return Err(TransferError::RecipientInactive(receiver_no.to_string()));
        }

        self.limits
            .check_per_transaction(sender_no, amount.value())
            .await?;

        let fee = fee::transfer_fee(&sender, &receiver);
        let total = fee::total(amount.value(), fee);
        sender.withdraw(Balance::new(total))?;
        receiver.deposit(amount.into());

        let tx = Transaction::new(
            TransactionType::Transfer,
            amount,
            fee,
            sender.clone(),
            Some(receiver.clone()),
            self.clock.now(),
        );
        self.ledger
            .commit(LedgerCommit {
                accounts: vec![sender, receiver],
                transaction: tx,
                scheduled_id,
            })
            .await
            .map_err(|e| match e {
                StoreError::AlreadyApplied(id) => TransferError::DuplicateScheduledTransfer(id),
                other => other.into(),
            })
    }

    async fn try_single(
        &self,
        r#type: TransactionType,
        account_no: &str,
        amount: Amount,
    ) -> Result<Transaction> {
        let mut account = self.load_source(account_no).await?;
        match r#type {
            TransactionType::Deposit => {
                self.limits.check_deposit(amount.value()).await?;
                account.deposit(amount.into());
            }
            _ => account.withdraw(amount.into())?,
        }

        let tx = Transaction::new(
            r#type,
            amount,
            Decimal::ZERO,
            account.clone(),
            None,
            self.clock.now(),
        );
        Ok(self
            .ledger
            .commit(LedgerCommit {
                accounts: vec![account],
                transaction: tx,
                scheduled_id: None,
            })
            .await?)
    }

    async fn load_source(&self, account_no: &str) -> Result<Account> {
        let account = self
            .ledger
            .get(account_no)
            .await?
            .ok_or_else(|| TransferError::AccountNotFound(account_no.to_string()))?;
        if !account.status.can_send() {
            return Err(TransferError::AccountInactive(account_no.to_string()));
        }
        Ok(account)
    }

    /// Re-runs `attempt` after a version conflict with fresh reads, up to
    /// `max_conflict_retries` times.
    async fn retry_on_conflict<F, Fut>(&self, mut attempt: F) -> Result<Transaction>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Transaction>>,
    {
        let mut conflicts = 0;
        loop {
            match attempt().await {
                Err(TransferError::Internal(StoreError::Conflict(account_no))) => {
                    conflicts += 1;
                    self.ledger.invalidate(&account_no).await;
                    if conflicts > self.config.max_conflict_retries {
                        return Err(TransferError::ConsistencyViolation(format!(
                            "account {account_no} kept changing after {conflicts} attempts"
                        )));
                    }
                    warn!(account_no, conflicts, "Version conflict, retrying");
                }
                other => return other,
            }
        }
    }

    /// Bounds the part of an operation that ends in the commit. Work after a
    /// successful commit must not go through here.
    async fn with_deadline<T>(&self, operation: impl Future<Output = Result<T>>) -> Result<T> {
        tokio::time::timeout(self.config.operation_timeout, operation)
            .await
            .map_err(|_| TransferError::Timeout)?
    }
}

fn validate_transfer(sender_no: &str, receiver_no: &str, amount: Decimal) -> Result<Amount> {
    if sender_no == receiver_no {
        return Err(TransferError::SameAccountTransfer);
    }
    Amount::new(amount)
}
