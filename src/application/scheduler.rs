use super::engine::TransferEngine;
use crate::domain::events::{SCHEDULED_TRANSFER_TOPIC, ScheduledTransferMessage};
use crate::domain::ports::BrokerRef;
use crate::domain::transaction::{ScheduledStatus, ScheduledTransaction};
use crate::error::{Result, StoreError, TransferError};
use crate::interfaces::wire::{self, WireMessage};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, instrument, warn};

/// Truncates `at` down to a multiple of `width` since the Unix epoch.
pub fn bucket_floor(at: DateTime<Utc>, width: Duration) -> DateTime<Utc> {
    let width = i64::try_from(width.as_secs()).unwrap_or(i64::MAX);
    if width <= 0 {
        return at;
    }
    let secs = at.timestamp();
    DateTime::from_timestamp(secs - secs.rem_euclid(width), 0).unwrap_or(at)
}

/// Periodically publishes due scheduled transfers to the broker.
pub struct Poller {
    engine: Arc<TransferEngine>,
    broker: BrokerRef,
}

impl Poller {
    pub fn new(engine: Arc<TransferEngine>, broker: BrokerRef) -> Self {
        Self { engine, broker }
    }

    /// Publishes every pending record due at the current bucket. Returns how
    /// many were published.
    #[instrument(skip(self))]
    pub async fn poll_once(&self) -> Result<usize> {
        let bucket = bucket_floor(self.engine.clock().now(), self.engine.config().bucket_width);
        let due = self.engine.scheduled_store().due(bucket).await?;
        for record in &due {
            let payload = wire::encode_scheduled(&ScheduledTransferMessage::from(record))?;
            self.broker.publish(SCHEDULED_TRANSFER_TOPIC, payload).await?;
        }
        debug!(%bucket, published = due.len(), "Poll finished");
        Ok(due.len())
    }

    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.engine.config().poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(interval = ?self.engine.config().poll_interval, "Scheduler poller started");

        loop {
            tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                _ = ticker.tick() => match self.poll_once().await {
                    Ok(0) => {}
                    Ok(published) => info!(published, "Published due scheduled transfers"),
                    Err(e) => warn!(error = %e, "Scheduled transfer poll failed"),
                },
            }
        }
        info!("Scheduler poller stopped");
    }
}

/// What happened to one scheduled-transfer delivery.
#[derive(Debug, Clone, PartialEq)]
pub enum ApplyOutcome {
    Applied { tx_id: u64 },
    /// Already processed or failed; a duplicate delivery.
    Skipped,
    /// Not yet eligible; the poller will publish it again.
    NotDue,
    Retrying { attempts: u32, retry_at: DateTime<Utc> },
    Failed { attempts: u32 },
    /// Undecodable payload or unknown id.
    Dropped,
    /// The store could not be read or written; the poller will pick it up again.
    Deferred,
}

/// Consumes `scheduled_transactions` and applies each transfer exactly once.
#[derive(Clone)]
pub struct ScheduledConsumer {
    engine: Arc<TransferEngine>,
    broker: BrokerRef,
}

impl ScheduledConsumer {
    pub fn new(engine: Arc<TransferEngine>, broker: BrokerRef) -> Self {
        Self { engine, broker }
    }

    /// Receives until shutdown, one task per delivery. In-flight tasks are
    /// drained before returning.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut tasks: JoinSet<ApplyOutcome> = JoinSet::new();
        info!("Scheduled transfer consumer started");

        if !*shutdown.borrow() {
            loop {
                tokio::select! {
                    biased;
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                    Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                        if let Err(e) = joined {
                            error!(error = %e, "Scheduled transfer task failed");
                        }
                    }
                    delivery = self.broker.receive(SCHEDULED_TRANSFER_TOPIC) => match delivery {
                        Ok(delivery) => {
                            let consumer = self.clone();
                            tasks.spawn(async move { consumer.handle(delivery.tag, &delivery.payload).await });
                        }
                        Err(e) => {
                            error!(error = %e, "Scheduled transfer receive failed");
                            break;
                        }
                    },
                }
            }
        }

        let in_flight = tasks.len();
        if in_flight > 0 {
            info!(in_flight, "Draining scheduled transfer tasks");
        }
        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "Scheduled transfer task failed");
            }
        }
        info!("Scheduled transfer consumer stopped");
    }

    /// Processes one delivery and acknowledges it.
    pub async fn handle(&self, tag: u64, payload: &[u8]) -> ApplyOutcome {
        let outcome = self.process(payload).await;
        debug!(tag, ?outcome, "Scheduled delivery processed");
        if let Err(e) = self.broker.ack(SCHEDULED_TRANSFER_TOPIC, tag).await {
            warn!(tag, error = %e, "Scheduled delivery ack failed");
        }
        outcome
    }

    pub async fn process(&self, payload: &[u8]) -> ApplyOutcome {
        let message = match wire::decode(payload) {
            Ok(WireMessage::ScheduledTransfer(message)) => message,
            Ok(other) => {
                error!(?other, "Unexpected message on scheduled transfer topic");
                return ApplyOutcome::Dropped;
            }
            Err(e) => {
                error!(error = %e, "Dropping undecodable scheduled transfer");
                return ApplyOutcome::Dropped;
            }
        };

        let record = match self.engine.scheduled_store().get(message.id).await {
            Ok(Some(record)) => record,
            Ok(None) => {
                error!(scheduled_id = message.id, "Scheduled transfer does not exist");
                return ApplyOutcome::Dropped;
            }
            Err(e) => {
                warn!(scheduled_id = message.id, error = %e, "Scheduled transfer lookup failed");
                return ApplyOutcome::Deferred;
            }
        };
        if record.status != ScheduledStatus::Pending {
            debug!(scheduled_id = record.id, status = ?record.status, "Skipping settled scheduled transfer");
            return ApplyOutcome::Skipped;
        }
        if !record.is_due(self.engine.clock().now()) {
            return ApplyOutcome::NotDue;
        }
        if message != ScheduledTransferMessage::from(&record) {
            warn!(scheduled_id = record.id, "Message differs from stored record, using the stored record");
        }

        match self.engine.apply_scheduled(&record).await {
            Ok(tx) => ApplyOutcome::Applied { tx_id: tx.id },
            Err(TransferError::DuplicateScheduledTransfer(_)) => ApplyOutcome::Skipped,
            Err(e) => self.record_failure(&record, e).await,
        }
    }

    async fn record_failure(&self, record: &ScheduledTransaction, err: TransferError) -> ApplyOutcome {
        let policy = self
            .engine
            .config()
            .failure_policy(err.is_permanent(), self.engine.clock().now());

        match self
            .engine
            .scheduled_store()
            .record_failure(record.id, err.to_string(), policy)
            .await
        {
            Ok(updated) => match updated.retry_at {
                Some(retry_at) if updated.status == ScheduledStatus::Pending => {
                    warn!(scheduled_id = record.id, attempts = updated.attempts, %retry_at, error = %err, "Scheduled transfer failed, will retry");
                    ApplyOutcome::Retrying {
                        attempts: updated.attempts,
                        retry_at,
                    }
                }
                _ => {
                    error!(scheduled_id = record.id, attempts = updated.attempts, error = %err, "Scheduled transfer failed permanently");
                    ApplyOutcome::Failed {
                        attempts: updated.attempts,
                    }
                }
            },
            Err(StoreError::AlreadyApplied(_)) => ApplyOutcome::Skipped,
            Err(e) => {
                error!(scheduled_id = record.id, error = %e, "Could not record scheduled transfer failure");
                ApplyOutcome::Deferred
            }
        }
    }
}
