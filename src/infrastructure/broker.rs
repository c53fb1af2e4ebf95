use crate::domain::ports::{Broker, Delivery};
use crate::error::{StoreError, StoreResult};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{Mutex, Notify};

struct Queued {
    tag: u64,
    payload: Vec<u8>,
    redelivered: bool,
}

#[derive(Default)]
struct TopicState {
    queue: VecDeque<Queued>,
    /// Handed out, not yet acknowledged.
    in_flight: BTreeMap<u64, Vec<u8>>,
    notify: Arc<Notify>,
}

/// In-process at-least-once broker.
///
/// A received message stays in flight until acked. [`InMemoryBroker::redeliver_unacked`]
/// puts everything still in flight back on the queue, which is what a broker
/// does when a consumer dies before acknowledging.
#[derive(Default, Clone)]
pub struct InMemoryBroker {
    topics: Arc<Mutex<HashMap<String, TopicState>>>,
    next_tag: Arc<AtomicU64>,
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requeues every unacknowledged message on `topic`. Returns how many.
    pub async fn redeliver_unacked(&self, topic: &str) -> usize {
        let mut topics = self.topics.lock().await;
        let state = topics.entry(topic.to_string()).or_default();
        let in_flight = std::mem::take(&mut state.in_flight);
        let count = in_flight.len();
        for (tag, payload) in in_flight.into_iter().rev() {
            state.queue.push_front(Queued {
                tag,
                payload,
                redelivered: true,
            });
        }
        for _ in 0..count {
            state.notify.notify_one();
        }
        count
    }

    /// Messages queued or in flight on `topic`.
    pub async fn outstanding(&self, topic: &str) -> usize {
        let topics = self.topics.lock().await;
        topics
            .get(topic)
            .map(|state| state.queue.len() + state.in_flight.len())
            .unwrap_or(0)
    }
}

#[async_trait]
impl Broker for InMemoryBroker {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> StoreResult<()> {
        let tag = self.next_tag.fetch_add(1, Ordering::Relaxed) + 1;
        let mut topics = self.topics.lock().await;
        let state = topics.entry(topic.to_string()).or_default();
        state.queue.push_back(Queued {
            tag,
            payload,
            redelivered: false,
        });
        state.notify.notify_one();
        Ok(())
    }

    async fn receive(&self, topic: &str) -> StoreResult<Delivery> {
        loop {
            let notify = {
                let mut topics = self.topics.lock().await;
                let state = topics.entry(topic.to_string()).or_default();
                if let Some(msg) = state.queue.pop_front() {
                    state.in_flight.insert(msg.tag, msg.payload.clone());
                    return Ok(Delivery {
                        tag: msg.tag,
                        payload: msg.payload,
                        redelivered: msg.redelivered,
                    });
                }
                state.notify.clone()
            };
            // A publish between the unlock and here leaves a permit behind.
            notify.notified().await;
        }
    }

    async fn ack(&self, topic: &str, tag: u64) -> StoreResult<()> {
        let mut topics = self.topics.lock().await;
        let state = topics
            .get_mut(topic)
            .ok_or_else(|| StoreError::NotFound(format!("topic {topic}")))?;
        state
            .in_flight
            .remove(&tag)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(format!("delivery {tag} on {topic}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_publish_receive_ack() {
        let broker = InMemoryBroker::new();
        broker.publish("t", b"one".to_vec()).await.unwrap();
        broker.publish("t", b"two".to_vec()).await.unwrap();

        let first = broker.receive("t").await.unwrap();
        assert_eq!(first.payload, b"one");
        assert!(!first.redelivered);
        broker.ack("t", first.tag).await.unwrap();

        let second = broker.receive("t").await.unwrap();
        assert_eq!(second.payload, b"two");
        assert_eq!(broker.outstanding("t").await, 1);
        broker.ack("t", second.tag).await.unwrap();
        assert_eq!(broker.outstanding("t").await, 0);
    }

    #[tokio::test]
    async fn test_unacked_message_is_redelivered() {
        let broker = InMemoryBroker::new();
        broker.publish("t", b"one".to_vec()).await.unwrap();

        let delivery = broker.receive("t").await.unwrap();
        assert_eq!(broker.redeliver_unacked("t").await, 1);

        let again = broker.receive("t").await.unwrap();
        assert_eq!(again.tag, delivery.tag);
        assert!(again.redelivered);

        // The first hand-out is gone; acking it now fails once it was re-acked.
        broker.ack("t", again.tag).await.unwrap();
        assert!(broker.ack("t", delivery.tag).await.is_err());
    }

    #[tokio::test]
    async fn test_receive_waits_for_publish() {
        let broker = InMemoryBroker::new();
        let receiver = broker.clone();
        let handle = tokio::spawn(async move { receiver.receive("t").await });

        tokio::time::sleep(Duration::from_millis(20)).await;
        broker.publish("t", b"late".to_vec()).await.unwrap();

        let delivery = tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(delivery.payload, b"late");
    }

    #[tokio::test]
    async fn test_cancelled_receive_loses_nothing() {
        let broker = InMemoryBroker::new();
        let waited =
            tokio::time::timeout(Duration::from_millis(10), broker.receive("t")).await;
        assert!(waited.is_err());

        broker.publish("t", b"kept".to_vec()).await.unwrap();
        let delivery = broker.receive("t").await.unwrap();
        assert_eq!(delivery.payload, b"kept");
    }
}
