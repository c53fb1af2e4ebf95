#![allow(dead_code)]

use atm_core::application::engine::TransferEngine;
use atm_core::config::EngineConfig;
use atm_core::domain::account::Account;
use atm_core::domain::ports::{AccountStore, Cache, Stores, TransactionStore};
use atm_core::infrastructure::broker::InMemoryBroker;
use atm_core::infrastructure::cache::InMemoryCache;
use atm_core::infrastructure::clock::ManualClock;
use atm_core::infrastructure::in_memory::InMemoryLedger;
use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use std::io::{Error, Write};
use std::sync::Arc;
use tempfile::NamedTempFile;

pub struct Harness {
    pub engine: Arc<TransferEngine>,
    pub store: Arc<InMemoryLedger>,
    pub cache: Arc<InMemoryCache>,
    pub broker: Arc<InMemoryBroker>,
    pub clock: Arc<ManualClock>,
}

pub fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap()
}

impl Harness {
    pub async fn new(accounts: Vec<Account>) -> Self {
        Self::with_config(EngineConfig::default(), accounts).await
    }

    pub async fn with_config(config: EngineConfig, accounts: Vec<Account>) -> Self {
        let store = Arc::new(InMemoryLedger::new());
        for account in accounts {
            store.insert(account).await.unwrap();
        }
        let cache = Arc::new(InMemoryCache::new());
        cache
            .set("min_deposit_amount", "20.00".into(), None)
            .await
            .unwrap();
        let broker = Arc::new(InMemoryBroker::new());
        let clock = Arc::new(ManualClock::new(start_time()));
        let engine = Arc::new(TransferEngine::new(
            config,
            Stores::from_backend(store.clone()),
            cache.clone(),
            broker.clone(),
            clock.clone(),
        ));
        Self {
            engine,
            store,
            cache,
            broker,
            clock,
        }
    }

    pub async fn set(&self, key: &str, value: &str) {
        self.cache.set(key, value.to_string(), None).await.unwrap();
    }

    pub async fn balance(&self, account_no: &str) -> Decimal {
        AccountStore::get(&*self.store, account_no)
            .await
            .unwrap()
            .unwrap()
            .balance
            .value()
    }

    pub async fn total_balance(&self) -> Decimal {
        self.store
            .get_all()
            .await
            .unwrap()
            .iter()
            .map(|account| account.balance.value())
            .sum()
    }

    pub async fn transaction_count(&self, account_no: &str) -> usize {
        self.store.for_account(account_no).await.unwrap().len()
    }
}

/// Writes `header` plus `rows` to a temp CSV file.
pub fn csv_file(header: &str, rows: &[&str]) -> Result<NamedTempFile, Error> {
    let mut file = NamedTempFile::new()?;
    writeln!(file, "{header}")?;
    for row in rows {
        writeln!(file, "{row}")?;
    }
    file.flush()?;
    Ok(file)
}

pub const ACCOUNTS_HEADER: &str =
    "account_no, owner, institution, status, balance, daily_limit, per_transaction_limit";
pub const REQUESTS_HEADER: &str = "op, type, account, receiver, amount, execute_at";
