//! ATM money-movement core.
//!
//! Seeds a ledger from an accounts CSV, runs a requests CSV through the
//! engine while the scheduled-transfer pipeline runs in the background, and
//! prints the resulting ledger to stdout.
//!
//! ```bash
//! atm-core --accounts accounts.csv --requests requests.csv
//! ATM_POLL_INTERVAL_MS=1000 atm-core --accounts accounts.csv --serve
//! ```

use atm_core::application::engine::TransferEngine;
use atm_core::application::notifications::NotificationRenderer;
use atm_core::application::scheduler::{Poller, ScheduledConsumer};
use atm_core::config::EngineConfig;
use atm_core::domain::cache_keys;
use atm_core::domain::ports::{AccountStore, BrokerRef, Cache, CacheRef, ClockRef, Stores};
use atm_core::infrastructure::broker::InMemoryBroker;
use atm_core::infrastructure::cache::InMemoryCache;
use atm_core::infrastructure::clock::SystemClock;
use atm_core::infrastructure::in_memory::InMemoryLedger;
#[cfg(feature = "storage-rocksdb")]
use atm_core::infrastructure::rocksdb::RocksDBStore;
use atm_core::interfaces::csv::account_reader::AccountReader;
use atm_core::interfaces::csv::account_writer::AccountWriter;
use atm_core::interfaces::csv::request_reader::RequestReader;
use atm_core::interfaces::requests::{self, RequestOutcome};
use clap::Parser;
use miette::{IntoDiagnostic, Result};
use rust_decimal::Decimal;
use std::fs::File;
use std::io::{self, IsTerminal};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, error, info, info_span, warn};
use tracing_subscriber::{EnvFilter, fmt};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Accounts CSV: account_no, owner, institution, status, balance[, daily_limit, per_transaction_limit]
    #[arg(long, env = "ATM_ACCOUNTS")]
    accounts: PathBuf,

    /// Requests CSV: op, type, account, receiver, amount, execute_at
    #[arg(long, env = "ATM_REQUESTS")]
    requests: Option<PathBuf>,

    /// Path to persistent database (optional). If provided, uses RocksDB.
    #[arg(long, env = "ATM_DB_PATH")]
    db_path: Option<PathBuf>,

    /// Minimum deposit amount
    #[arg(long, env = "ATM_MIN_DEPOSIT", default_value = "100")]
    min_deposit: Decimal,

    /// Daily limit for accounts without their own
    #[arg(long, env = "ATM_DEFAULT_DAILY_LIMIT")]
    default_daily_limit: Option<Decimal>,

    #[arg(long, env = "ATM_OPERATION_TIMEOUT_MS", default_value = "2000")]
    operation_timeout_ms: u64,

    #[arg(long, env = "ATM_POLL_INTERVAL_MS", default_value = "15000")]
    poll_interval_ms: u64,

    /// Scheduled transfers become eligible in buckets of this width
    #[arg(long, env = "ATM_BUCKET_SECS", default_value = "300")]
    bucket_secs: u64,

    #[arg(long, env = "ATM_MAX_ATTEMPTS", default_value = "5")]
    max_attempts: u32,

    /// Keep the pipeline running this long after the requests are processed
    #[arg(long, env = "ATM_LINGER_MS", default_value = "0")]
    linger_ms: u64,

    /// Run until Ctrl+C or SIGTERM instead of exiting after the requests
    #[arg(long)]
    serve: bool,

    #[arg(long, env = "ATM_LOG_LEVEL", default_value = "info")]
    log_level: String,

    #[arg(long, env = "ATM_JSON_LOGS")]
    json_logs: bool,
}

impl Cli {
    fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            operation_timeout: Duration::from_millis(self.operation_timeout_ms),
            poll_interval: Duration::from_millis(self.poll_interval_ms.max(1)),
            bucket_width: Duration::from_secs(self.bucket_secs),
            max_attempts: self.max_attempts.max(1),
            ..EngineConfig::default()
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level, cli.json_logs);

    let config = cli.engine_config();
    let stores = open_stores(cli.db_path.as_deref())?;
    let cache: CacheRef = Arc::new(InMemoryCache::new());
    let broker: BrokerRef = Arc::new(InMemoryBroker::new());
    let clock: ClockRef = Arc::new(SystemClock);

    seed_settings(&cache, &cli).await?;
    seed_accounts(&stores, &cache, &cli.accounts).await?;

    let engine = Arc::new(TransferEngine::new(
        config.clone(),
        stores,
        cache,
        broker.clone(),
        clock,
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let tasks: Vec<(&str, JoinHandle<()>)> = vec![
        (
            "consumer",
            tokio::spawn(
                ScheduledConsumer::new(engine.clone(), broker.clone())
                    .run(shutdown_rx.clone())
                    .instrument(info_span!("consumer")),
            ),
        ),
        (
            "notifications",
            tokio::spawn(
                NotificationRenderer::new(broker.clone())
                    .run(shutdown_rx.clone())
                    .instrument(info_span!("notifications")),
            ),
        ),
        (
            "poller",
            tokio::spawn(
                Poller::new(engine.clone(), broker.clone())
                    .run(shutdown_rx)
                    .instrument(info_span!("poller")),
            ),
        ),
    ];

    if let Some(path) = &cli.requests {
        process_requests(&engine, path).await?;
    }

    if cli.serve {
        info!("Serving, press Ctrl+C to stop");
        shutdown_signal().await;
    } else if cli.linger_ms > 0 {
        tokio::select! {
            _ = tokio::time::sleep(Duration::from_millis(cli.linger_ms)) => {}
            _ = shutdown_signal() => {}
        }
    }

    info!("Shutting down");
    let _ = shutdown_tx.send(true);
    for (name, handle) in tasks {
        match tokio::time::timeout(config.shutdown_grace, handle).await {
            Ok(Ok(())) => debug!(task = name, "Stopped"),
            Ok(Err(e)) => error!(task = name, error = %e, "Task failed"),
            Err(_) => warn!(task = name, "Shutdown timed out"),
        }
    }

    let accounts = engine.accounts().await.into_diagnostic()?;
    let stdout = io::stdout();
    let mut writer = AccountWriter::new(stdout.lock());
    writer.write_accounts(&accounts).into_diagnostic()?;

    Ok(())
}

fn open_stores(db_path: Option<&Path>) -> Result<Stores> {
    match db_path {
        #[cfg(feature = "storage-rocksdb")]
        Some(path) => {
            let store = RocksDBStore::open(path).into_diagnostic()?;
            info!(path = %path.display(), "Using RocksDB storage");
            Ok(Stores::from_backend(Arc::new(store)))
        }
        #[cfg(not(feature = "storage-rocksdb"))]
        Some(_) => {
            warn!(
                "Persistent storage requested via --db-path, but 'storage-rocksdb' feature is not enabled. Falling back to in-memory storage."
            );
            Ok(Stores::from_backend(Arc::new(InMemoryLedger::new())))
        }
        None => Ok(Stores::from_backend(Arc::new(InMemoryLedger::new()))),
    }
}

async fn seed_settings(cache: &CacheRef, cli: &Cli) -> Result<()> {
    cache
        .set(cache_keys::MIN_DEPOSIT_AMOUNT, cli.min_deposit.to_string(), None)
        .await
        .into_diagnostic()?;
    if let Some(limit) = cli.default_daily_limit {
        cache
            .set(cache_keys::DEFAULT_DAILY_LIMIT, limit.to_string(), None)
            .await
            .into_diagnostic()?;
    }
    Ok(())
}

/// Loads accounts that are not in the store yet, along with their limits.
async fn seed_accounts(stores: &Stores, cache: &CacheRef, path: &Path) -> Result<()> {
    let file = File::open(path).into_diagnostic()?;
    let mut seeded = 0usize;
    for record in AccountReader::new(file).accounts() {
        let record = match record {
            Ok(record) => record,
            Err(e) => {
                warn!(error = %e, "Skipping account row");
                continue;
            }
        };
        let account = match record.to_account() {
            Ok(account) => account,
            Err(e) => {
                warn!(error = %e, "Skipping account row");
                continue;
            }
        };

        if let Some(limit) = record.daily_limit {
            cache
                .set(&cache_keys::daily_limit(&account.account_no), limit.to_string(), None)
                .await
                .into_diagnostic()?;
        }
        if let Some(cap) = record.per_transaction_limit {
            cache
                .set(
                    &cache_keys::limit_per_transaction(&account.account_no),
                    cap.to_string(),
                    None,
                )
                .await
                .into_diagnostic()?;
        }

        if stores
            .accounts
            .get(&account.account_no)
            .await
            .into_diagnostic()?
            .is_some()
        {
            debug!(account_no = %account.account_no, "Account already stored");
            continue;
        }
        stores.accounts.insert(account).await.into_diagnostic()?;
        seeded += 1;
    }
    info!(seeded, "Accounts loaded");
    Ok(())
}

async fn process_requests(engine: &TransferEngine, path: &Path) -> Result<()> {
    let file = File::open(path).into_diagnostic()?;
    for (line, request) in RequestReader::new(file).requests().enumerate() {
        let request = match request {
            Ok(request) => request,
            Err(e) => {
                warn!(line = line + 1, error = %e, "Error reading request");
                continue;
            }
        };
        match requests::submit(engine, &request).await {
            Ok(RequestOutcome::Committed(tx)) => info!(
                line = line + 1,
                tx_id = tx.id,
                kind = %tx.r#type,
                amount = %tx.amount,
                fee = %tx.fee,
                "Request committed"
            ),
            Ok(RequestOutcome::Scheduled(st)) => info!(
                line = line + 1,
                scheduled_id = st.id,
                execute_at = %st.execute_at,
                "Request scheduled"
            ),
            Err(e) => warn!(
                line = line + 1,
                status = e.status_code(),
                error = %e,
                "Request rejected"
            ),
        }
    }
    Ok(())
}

fn init_tracing(level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    if json {
        fmt()
            .with_env_filter(filter)
            .with_writer(io::stderr)
            .json()
            .init();
    } else {
        fmt()
            .with_env_filter(filter)
            .with_writer(io::stderr)
            .with_ansi(io::stderr().is_terminal())
            .init();
    }
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
