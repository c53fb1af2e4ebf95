use crate::domain::ports::Cache;
use crate::error::{StoreError, StoreResult};
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;

struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|at| at > now)
    }
}

/// In-memory stand-in for the shared cache, with per-key expiry.
///
/// Expiry is measured on the tokio clock so paused-time tests can advance it.
#[derive(Default, Clone)]
pub struct InMemoryCache {
    entries: Arc<RwLock<HashMap<String, Entry>>>,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Cache for InMemoryCache {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let entries = self.entries.read().await;
        let now = Instant::now();
        Ok(entries
            .get(key)
            .filter(|entry| entry.is_live(now))
            .map(|entry| entry.value.clone()))
    }

    async fn set(&self, key: &str, value: String, ttl: Option<Duration>) -> StoreResult<()> {
        let mut entries = self.entries.write().await;
        entries.insert(
            key.to_string(),
            Entry {
                value,
                expires_at: ttl.map(|ttl| Instant::now() + ttl),
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        let mut entries = self.entries.write().await;
        entries.remove(key);
        Ok(())
    }

    async fn incr_by(
        &self,
        key: &str,
        delta: Decimal,
        ttl: Option<Duration>,
    ) -> StoreResult<Decimal> {
        let mut entries = self.entries.write().await;
        let now = Instant::now();
        let current = match entries.get(key).filter(|entry| entry.is_live(now)) {
            Some(entry) => Some((
                Decimal::from_str(&entry.value).map_err(|e| {
                    StoreError::Serialization(format!("counter {key} is not a decimal: {e}"))
                })?,
                entry.expires_at,
            )),
            None => None,
        };
        let (value, expires_at) = match current {
            Some((value, expires_at)) => (value + delta, expires_at),
            None => (delta, ttl.map(|ttl| now + ttl)),
        };
        entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at,
            },
        );
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn test_set_get_delete() {
        let cache = InMemoryCache::new();
        cache.set("min_deposit_amount", "20".into(), None).await.unwrap();
        assert_eq!(
            cache.get("min_deposit_amount").await.unwrap().as_deref(),
            Some("20")
        );
        cache.delete("min_deposit_amount").await.unwrap();
        assert!(cache.get("min_deposit_amount").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_incr_by_accumulates() {
        let cache = InMemoryCache::new();
        assert_eq!(cache.incr_by("sum", dec!(10.50), None).await.unwrap(), dec!(10.50));
        assert_eq!(cache.incr_by("sum", dec!(0.50), None).await.unwrap(), dec!(11.00));
    }

    #[tokio::test(start_paused = true)]
    async fn test_counter_expires_and_restarts() {
        let cache = InMemoryCache::new();
        let ttl = Some(Duration::from_secs(60));
        cache.incr_by("sum", dec!(100), ttl).await.unwrap();
        // Later increments keep the original expiry.
        tokio::time::advance(Duration::from_secs(30)).await;
        cache.incr_by("sum", dec!(1), ttl).await.unwrap();
        tokio::time::advance(Duration::from_secs(31)).await;

        assert!(cache.get("sum").await.unwrap().is_none());
        assert_eq!(cache.incr_by("sum", dec!(5), ttl).await.unwrap(), dec!(5));
    }

    #[tokio::test]
    async fn test_incr_by_rejects_garbage() {
        let cache = InMemoryCache::new();
        cache.set("sum", "abc".into(), None).await.unwrap();
        assert!(matches!(
            cache.incr_by("sum", dec!(1), None).await,
            Err(StoreError::Serialization(_))
        ));
    }
}
