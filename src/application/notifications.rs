use crate::domain::events::{NOTIFICATION_TOPIC, TransactionNotification};
use crate::domain::ports::BrokerRef;
use crate::domain::transaction::{Transaction, TransactionType};
use crate::interfaces::wire::{self, WireMessage};
use tokio::sync::watch;
use tracing::{debug, info, warn};

const NOTIFICATION_TIME: &str = "%Y-%m-%d %H:%M:%S";

/// Publishes a [`TransactionNotification`] for every committed operation.
#[derive(Clone)]
pub struct NotificationPublisher {
    broker: BrokerRef,
}

impl NotificationPublisher {
    pub fn new(broker: BrokerRef) -> Self {
        Self { broker }
    }

    /// Fire-and-forget: the committed operation never waits on or fails
    /// because of the broker.
    pub fn publish(&self, tx: &Transaction) {
        let event = TransactionNotification::from(tx);
        let broker = self.broker.clone();
        tokio::spawn(async move {
            let payload = match wire::encode_notification(&event) {
                Ok(payload) => payload,
                Err(e) => {
                    warn!(error = %e, account_no = %event.account_no, "Notification encode failed");
                    return;
                }
            };
            if let Err(e) = broker.publish(NOTIFICATION_TOPIC, payload).await {
                warn!(error = %e, account_no = %event.account_no, "Notification publish failed");
            }
        });
    }
}

/// Human-readable message for a notification.
pub fn render(event: &TransactionNotification) -> String {
    let at = event.created_at.format(NOTIFICATION_TIME);
    match event.r#type {
        TransactionType::Withdraw => format!(
            "{:.2} Baht has been withdrawn from account no: {} at {}\nRemaining balance: {:.2}",
            event.amount, event.account_no, at, event.remaining_balance
        ),
        TransactionType::Deposit => format!(
            "{:.2} Baht has been deposited into account no: {} at {}\nRemaining balance: {:.2}",
            event.amount, event.account_no, at, event.remaining_balance
        ),
        TransactionType::Transfer => format!(
            "{:.2} Baht has been transferred from account no: {} to account no: {} at {}",
            event.amount,
            event.account_no,
            event.receiver_no.as_deref().unwrap_or("unknown"),
            at
        ),
    }
}

/// Consumes `sms_transaction` and renders each notification to the log.
/// Delivery of the text to a phone is someone else's job.
pub struct NotificationRenderer {
    broker: BrokerRef,
}

impl NotificationRenderer {
    pub fn new(broker: BrokerRef) -> Self {
        Self { broker }
    }

    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!("Notification renderer started");
        loop {
            tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                delivery = self.broker.receive(NOTIFICATION_TOPIC) => {
                    let delivery = match delivery {
                        Ok(delivery) => delivery,
                        Err(e) => {
                            warn!(error = %e, "Notification receive failed");
                            break;
                        }
                    };
                    match wire::decode(&delivery.payload) {
                        Ok(WireMessage::TransactionNotification(event)) => {
                            info!(target: "sms", "{}", render(&event));
                        }
                        Ok(other) => debug!(?other, "Ignoring unexpected message on notification topic"),
                        Err(e) => warn!(error = %e, "Dropping undecodable notification"),
                    }
                    if let Err(e) = self.broker.ack(NOTIFICATION_TOPIC, delivery.tag).await {
                        warn!(error = %e, tag = delivery.tag, "Notification ack failed");
                    }
                }
            }
        }
        info!("Notification renderer stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::account::{Account, Amount};
    use crate::domain::ports::Broker;
    use crate::infrastructure::broker::InMemoryBroker;
    use chrono::{TimeZone, Utc};
    use rust_decimal_macros::dec;
    use std::sync::Arc;
    use std::time::Duration;

    fn event(r#type: TransactionType, receiver_no: Option<&str>) -> TransactionNotification {
        TransactionNotification {
            r#type,
            amount: dec!(200),
            account_no: "111".into(),
            created_at: Utc.with_ymd_and_hms(2024, 3, 1, 9, 30, 0).unwrap(),
            remaining_balance: dec!(300),
            receiver_no: receiver_no.map(str::to_string),
        }
    }

    #[test]
    fn test_render_messages() {
        assert_eq!(
            render(&event(TransactionType::Withdraw, None)),
            "200.00 Baht has been withdrawn from account no: 111 at 2024-03-01 09:30:00\nRemaining balance: 300.00"
        );
        assert!(render(&event(TransactionType::Deposit, None)).contains("deposited into account no: 111"));
        assert_eq!(
            render(&event(TransactionType::Transfer, Some("222"))),
            "200.00 Baht has been transferred from account no: 111 to account no: 222 at 2024-03-01 09:30:00"
        );
    }

    #[tokio::test]
    async fn test_publish_reaches_topic() {
        let broker = Arc::new(InMemoryBroker::new());
        let publisher = NotificationPublisher::new(broker.clone());
        let tx = Transaction::new(
            TransactionType::Deposit,
            Amount::new(dec!(100)).unwrap(),
            dec!(0),
            Account::new("111", "KBANK", dec!(600)),
            None,
            Utc::now(),
        );
        publisher.publish(&tx);

        let delivery = tokio::time::timeout(Duration::from_secs(1), broker.receive(NOTIFICATION_TOPIC))
            .await
            .unwrap()
            .unwrap();
        let WireMessage::TransactionNotification(event) = wire::decode(&delivery.payload).unwrap()
        else {
            panic!("expected a notification");
        };
        assert_eq!(event.account_no, "111");
        assert_eq!(event.remaining_balance, dec!(600));
    }

    #[tokio::test]
    async fn test_renderer_acks_and_stops() {
        let broker = Arc::new(InMemoryBroker::new());
        let payload = wire::encode_notification(&event(TransactionType::Withdraw, None)).unwrap();
        broker.publish(NOTIFICATION_TOPIC, payload).await.unwrap();
        broker.publish(NOTIFICATION_TOPIC, b"garbage".to_vec()).await.unwrap();

        let (tx, rx) = watch::channel(false);
        let renderer = NotificationRenderer::new(broker.clone());
        let handle = tokio::spawn(renderer.run(rx));

        for _ in 0..100 {
            if broker.outstanding(NOTIFICATION_TOPIC).await == 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(broker.outstanding(NOTIFICATION_TOPIC).await, 0);

        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
