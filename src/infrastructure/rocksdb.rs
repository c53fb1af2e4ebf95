use crate::domain::account::Account;
use crate::domain::ports::{AccountStore, LedgerCommit, ScheduledTransferStore, TransactionStore};
use crate::domain::transaction::{FailurePolicy, ScheduledStatus, ScheduledTransaction, Transaction};
use crate::error::{StoreError, StoreResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, DB, IteratorMode, Options, WriteBatch};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Column Family for storing account states.
pub const CF_ACCOUNTS: &str = "accounts";
/// Column Family for storing transaction records.
pub const CF_TRANSACTIONS: &str = "transactions";
/// Column Family for storing scheduled transfers.
pub const CF_SCHEDULED: &str = "scheduled";
/// Column Family for id sequences.
pub const CF_META: &str = "meta";

const NEXT_TX_ID: &[u8] = b"next_tx_id";
const NEXT_SCHEDULED_ID: &[u8] = b"next_scheduled_id";

/// A persistent ledger backed by RocksDB.
///
/// Accounts, transaction records and scheduled transfers live in separate
/// Column Families. A [`LedgerCommit`] is written as one `WriteBatch`, and all
/// read-check-write sequences run under `write_lock` so version checks and id
/// sequences cannot interleave within the process.
///
/// This struct is thread-safe (`Clone` shares the underlying `Arc<DB>`).
#[derive(Clone)]
pub struct RocksDBStore {
    db: Arc<DB>,
    write_lock: Arc<Mutex<()>>,
}

impl RocksDBStore {
    /// Opens or creates a RocksDB instance at the specified path, creating the
    /// column families on first use.
    pub fn open<P: AsRef<Path>>(path: P) -> StoreResult<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let descriptors = [CF_ACCOUNTS, CF_TRANSACTIONS, CF_SCHEDULED, CF_META]
            .into_iter()
            .map(|name| ColumnFamilyDescriptor::new(name, Options::default()))
            .collect::<Vec<_>>();

        let db = DB::open_cf_descriptors(&opts, path, descriptors)?;

        Ok(Self {
            db: Arc::new(db),
            write_lock: Arc::new(Mutex::new(())),
        })
    }

    fn cf(&self, name: &str) -> StoreResult<&ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StoreError::NotFound(format!("column family {name}")))
    }

    fn read<T: DeserializeOwned>(&self, cf: &str, key: &[u8]) -> StoreResult<Option<T>> {
        match self.db.get_cf(self.cf(cf)?, key)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn read_all<T: DeserializeOwned>(&self, cf: &str) -> StoreResult<Vec<T>> {
        let mut out = Vec::new();
        for item in self.db.iterator_cf(self.cf(cf)?, IteratorMode::Start) {
            let (_key, value) = item?;
            out.push(serde_json::from_slice(&value)?);
        }
        Ok(out)
    }

    fn put<T: Serialize>(
        &self,
        batch: &mut WriteBatch,
        cf: &str,
        key: &[u8],
        value: &T,
    ) -> StoreResult<()> {
        batch.put_cf(self.cf(cf)?, key, serde_json::to_vec(value)?);
        Ok(())
    }

    fn next_id(&self, batch: &mut WriteBatch, key: &[u8]) -> StoreResult<u64> {
        let current: u64 = self.read(CF_META, key)?.unwrap_or(0);
        let next = current + 1;
        self.put(batch, CF_META, key, &next)?;
        Ok(next)
    }

    fn lock(&self) -> StoreResult<std::sync::MutexGuard<'_, ()>> {
        self.write_lock
            .lock()
            .map_err(|_| StoreError::Closed("rocksdb write lock poisoned".into()))
    }
}

#[async_trait]
impl AccountStore for RocksDBStore {
    async fn insert(&self, account: Account) -> StoreResult<()> {
        let _guard = self.lock()?;
        let mut batch = WriteBatch::default();
        self.put(&mut batch, CF_ACCOUNTS, account.account_no.as_bytes(), &account)?;
        self.db.write(batch)?;
        Ok(())
    }

    async fn get(&self, account_no: &str) -> StoreResult<Option<Account>> {
        self.read(CF_ACCOUNTS, account_no.as_bytes())
    }

    async fn update(&self, mut account: Account) -> StoreResult<Account> {
        let _guard = self.lock()?;
        let stored: Account = self
            .read(CF_ACCOUNTS, account.account_no.as_bytes())?
            .ok_or_else(|| StoreError::NotFound(account.account_no.clone()))?;
        if stored.version != account.version {
            return Err(StoreError::Conflict(account.account_no));
        }
        account.version += 1;
        account.updated_at = Utc::now();
        let mut batch = WriteBatch::default();
        self.put(&mut batch, CF_ACCOUNTS, account.account_no.as_bytes(), &account)?;
        self.db.write(batch)?;
        Ok(account)
    }

    async fn commit(&self, commit: LedgerCommit) -> StoreResult<Transaction> {
        let _guard = self.lock()?;

        for account in &commit.accounts {
            let stored: Account = self
                .read(CF_ACCOUNTS, account.account_no.as_bytes())?
                .ok_or_else(|| StoreError::NotFound(account.account_no.clone()))?;
            if stored.version != account.version {
                return Err(StoreError::Conflict(account.account_no.clone()));
            }
        }

        let mut scheduled = match commit.scheduled_id {
            Some(id) => {
                let st: ScheduledTransaction = self
                    .read(CF_SCHEDULED, &id.to_be_bytes())?
                    .ok_or_else(|| StoreError::NotFound(format!("scheduled transfer {id}")))?;
                if st.status != ScheduledStatus::Pending {
                    return Err(StoreError::AlreadyApplied(id));
                }
                Some(st)
            }
            None => None,
        };

        let now = Utc::now();
        let mut batch = WriteBatch::default();
        let mut transaction = commit.transaction;
        transaction.id = self.next_id(&mut batch, NEXT_TX_ID)?;
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
            self.put(&mut batch, CF_ACCOUNTS, account.account_no.as_bytes(), &account)?;
        }

        if let Some(st) = scheduled.as_mut() {
            st.status = ScheduledStatus::Processed;
            st.updated_at = now;
            self.put(&mut batch, CF_SCHEDULED, &st.id.to_be_bytes(), &*st)?;
        }

        self.put(
            &mut batch,
            CF_TRANSACTIONS,
            &transaction.id.to_be_bytes(),
            &transaction,
        )?;
        self.db.write(batch)?;
        Ok(transaction)
    }

    async fn get_all(&self) -> StoreResult<Vec<Account>> {
        self.read_all(CF_ACCOUNTS)
    }
}

#[async_trait]
impl TransactionStore for RocksDBStore {
    async fn get(&self, tx_id: u64) -> StoreResult<Option<Transaction>> {
        self.read(CF_TRANSACTIONS, &tx_id.to_be_bytes())
    }

    async fn for_account(&self, account_no: &str) -> StoreResult<Vec<Transaction>> {
        let all: Vec<Transaction> = self.read_all(CF_TRANSACTIONS)?;
        Ok(all
            .into_iter()
            .filter(|tx| {
                tx.account.account_no == account_no
                    || tx
                        .receiver
                        .as_ref()
                        .is_some_and(|r| r.account_no == account_no)
            })
            .collect())
    }
}

#[async_trait]
impl ScheduledTransferStore for RocksDBStore {
    async fn save(&self, mut scheduled: ScheduledTransaction) -> StoreResult<ScheduledTransaction> {
        let _guard = self.lock()?;
        let mut batch = WriteBatch::default();
        scheduled.id = self.next_id(&mut batch, NEXT_SCHEDULED_ID)?;
        scheduled.status = ScheduledStatus::Pending;
        self.put(&mut batch, CF_SCHEDULED, &scheduled.id.to_be_bytes(), &scheduled)?;
        self.db.write(batch)?;
        Ok(scheduled)
    }

    async fn get(&self, id: u64) -> StoreResult<Option<ScheduledTransaction>> {
        self.read(CF_SCHEDULED, &id.to_be_bytes())
    }

    async fn due(&self, at: DateTime<Utc>) -> StoreResult<Vec<ScheduledTransaction>> {
        let all: Vec<ScheduledTransaction> = self.read_all(CF_SCHEDULED)?;
        Ok(all.into_iter().filter(|st| st.is_due(at)).collect())
    }

    async fn record_failure(
        &self,
        id: u64,
        reason: String,
        policy: FailurePolicy,
    ) -> StoreResult<ScheduledTransaction> {
        let _guard = self.lock()?;
        let mut st: ScheduledTransaction = self
            .read(CF_SCHEDULED, &id.to_be_bytes())?
            .ok_or_else(|| StoreError::NotFound(format!("scheduled transfer {id}")))?;
        if st.status != ScheduledStatus::Pending {
            return Err(StoreError::AlreadyApplied(id));
        }
        st.record_failure(reason, &policy);
        let mut batch = WriteBatch::default();
        self.put(&mut batch, CF_SCHEDULED, &id.to_be_bytes(), &st)?;
        self.db.write(batch)?;
        Ok(st)
    }
}
