use crate::domain::account::Account;
use crate::domain::cache_keys;
use crate::domain::ports::{AccountStoreRef, CacheRef, LedgerCommit};
use crate::domain::transaction::Transaction;
use crate::error::StoreResult;
use tracing::warn;

/// Read-through view of the ledger with account snapshots cached under
/// `account_no:<n>`.
///
/// The store stays authoritative: a stale snapshot can only cause a version
/// conflict on commit, never a lost update.
#[derive(Clone)]
pub struct LedgerAccessor {
    store: AccountStoreRef,
    cache: CacheRef,
}

impl LedgerAccessor {
    pub fn new(store: AccountStoreRef, cache: CacheRef) -> Self {
        Self { store, cache }
    }

    pub async fn get(&self, account_no: &str) -> StoreResult<Option<Account>> {
        let key = cache_keys::account_snapshot(account_no);
        match self.cache.get(&key).await {
            Ok(Some(raw)) => match serde_json::from_str::<Account>(&raw) {
                Ok(account) => return Ok(Some(account)),
                Err(e) => {
                    warn!(account_no, error = %e, "Dropping unreadable account snapshot");
                    self.forget(&key).await;
                }
            },
            Ok(None) => {}
            Err(e) => warn!(account_no, error = %e, "Account cache read failed"),
        }

        let account = self.store.get(account_no).await?;
        if let Some(account) = &account {
            match serde_json::to_string(account) {
                Ok(raw) => {
                    if let Err(e) = self.cache.set(&key, raw, None).await {
                        warn!(account_no, error = %e, "Account cache write failed");
                    }
                }
                Err(e) => warn!(account_no, error = %e, "Account snapshot not serializable"),
            }
        }
        Ok(account)
    }

    /// Commits and drops the snapshots of every touched account, whether the
    /// commit went through or not.
    pub async fn commit(&self, commit: LedgerCommit) -> StoreResult<Transaction> {
        let touched: Vec<String> = commit
            .accounts
            .iter()
            .map(|account| account.account_no.clone())
            .collect();
        let result = self.store.commit(commit).await;
        for account_no in &touched {
            self.invalidate(account_no).await;
        }
        result
    }

    pub async fn invalidate(&self, account_no: &str) {
        self.forget(&cache_keys::account_snapshot(account_no)).await;
    }

    pub async fn all(&self) -> StoreResult<Vec<Account>> {
        self.store.get_all().await
    }

    async fn forget(&self, key: &str) {
        if let Err(e) = self.cache.delete(key).await {
            warn!(key, error = %e, "Account cache invalidation failed");
        }
    }
}
