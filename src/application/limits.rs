use crate::domain::cache_keys;
use crate::domain::ports::{CacheRef, ClockRef};
use crate::error::{Result, TransferError};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use rust_decimal::Decimal;
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

/// Daily and per-transaction limits plus the deposit minimum, all read from
/// the cache.
///
/// Checks never write. [`LimitGuard::record_transfer`] is the only mutation
/// and runs after a transfer has committed.
#[derive(Clone)]
pub struct LimitGuard {
    cache: CacheRef,
    clock: ClockRef,
    fallback_daily_limit: Decimal,
}

impl LimitGuard {
    pub fn new(cache: CacheRef, clock: ClockRef, fallback_daily_limit: Decimal) -> Self {
        Self {
            cache,
            clock,
            fallback_daily_limit,
        }
    }

    /// Account-specific limit, else the shared default, else the configured fallback.
    pub async fn daily_limit(&self, account_no: &str) -> Result<Decimal> {
        if let Some(limit) = self.read_decimal(&cache_keys::daily_limit(account_no)).await? {
            return Ok(limit);
        }
        if let Some(limit) = self.read_decimal(cache_keys::DEFAULT_DAILY_LIMIT).await? {
            return Ok(limit);
        }
        debug!(account_no, limit = %self.fallback_daily_limit, "Using fallback daily limit");
        Ok(self.fallback_daily_limit)
    }

    /// Total transferred today, zero if nothing was recorded yet.
    pub async fn daily_total(&self, account_no: &str) -> Result<Decimal> {
        Ok(self
            .read_decimal(&cache_keys::daily_transaction(account_no))
            .await?
            .unwrap_or(Decimal::ZERO))
    }

    pub async fn check_daily(&self, account_no: &str, amount: Decimal) -> Result<()> {
        let limit = self.daily_limit(account_no).await?;
        let spent = self.daily_total(account_no).await?;
        if spent + amount > limit {
            return Err(TransferError::DailyLimitExceeded { limit });
        }
        Ok(())
    }

    /// A missing or zero cap means no per-transaction limit.
    pub async fn check_per_transaction(&self, account_no: &str, amount: Decimal) -> Result<()> {
        match self
            .read_decimal(&cache_keys::limit_per_transaction(account_no))
            .await?
        {
            Some(cap) if !cap.is_zero() && amount > cap => {
                Err(TransferError::PerTransactionLimitExceeded { limit: cap })
            }
            _ => Ok(()),
        }
    }

    pub async fn minimum_deposit(&self) -> Result<Decimal> {
        self.read_decimal(cache_keys::MIN_DEPOSIT_AMOUNT)
            .await?
            .ok_or_else(|| TransferError::ConfigurationMissing(cache_keys::MIN_DEPOSIT_AMOUNT.into()))
    }

    pub async fn check_deposit(&self, amount: Decimal) -> Result<()> {
        let minimum = self.minimum_deposit().await?;
        if amount < minimum {
            return Err(TransferError::MinimumDepositNotMet { amount, minimum });
        }
        Ok(())
    }

    /// Adds a committed transfer to today's running sum. The counter expires
    /// at the next UTC midnight.
    pub async fn record_transfer(&self, account_no: &str, amount: Decimal) -> Result<Decimal> {
        let ttl = until_end_of_day(self.clock.now());
        let total = self
            .cache
            .incr_by(&cache_keys::daily_transaction(account_no), amount, Some(ttl))
            .await?;
        Ok(total)
    }

    async fn read_decimal(&self, key: &str) -> Result<Option<Decimal>> {
        match self.cache.get(key).await? {
            None => Ok(None),
            Some(raw) => Decimal::from_str(raw.trim())
                .map(Some)
                .map_err(|_| TransferError::ConfigurationMissing(key.to_string())),
        }
    }
}

/// Time left until the next UTC midnight, never zero.
pub fn until_end_of_day(now: DateTime<Utc>) -> Duration {
    let next_midnight = (now.date_naive() + ChronoDuration::days(1))
        .and_hms_opt(0, 0, 0)
        .map(|midnight| midnight.and_utc())
        .unwrap_or(now + ChronoDuration::days(1));
    (next_midnight - now)
        .to_std()
        .unwrap_or(Duration::from_secs(1))
        .max(Duration::from_secs(1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::Cache;
    use crate::infrastructure::cache::InMemoryCache;
    use crate::infrastructure::clock::ManualClock;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;
    use std::sync::Arc;

    fn guard() -> (LimitGuard, Arc<InMemoryCache>) {
        let cache = Arc::new(InMemoryCache::new());
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 3, 1, 22, 0, 0).unwrap(),
        ));
        (LimitGuard::new(cache.clone(), clock, dec!(50000.00)), cache)
    }

    #[tokio::test]
    async fn test_daily_limit_resolution_order() {
        let (guard, cache) = guard();
        assert_eq!(guard.daily_limit("111").await.unwrap(), dec!(50000.00));

        cache.set("default_daily_limit", "20000".into(), None).await.unwrap();
        assert_eq!(guard.daily_limit("111").await.unwrap(), dec!(20000));

        cache.set("daily_limit_111", "5000".into(), None).await.unwrap();
        assert_eq!(guard.daily_limit("111").await.unwrap(), dec!(5000));
        assert_eq!(guard.daily_limit("222").await.unwrap(), dec!(20000));
    }

    #[tokio::test]
    async fn test_daily_boundary() {
        let (guard, cache) = guard();
        cache.set("daily_limit_111", "1000.00".into(), None).await.unwrap();
        cache.set("daily_transaction_111", "400.00".into(), None).await.unwrap();

        assert!(guard.check_daily("111", dec!(600.00)).await.is_ok());
        assert!(matches!(
            guard.check_daily("111", dec!(600.01)).await,
            Err(TransferError::DailyLimitExceeded { limit }) if limit == dec!(1000.00)
        ));
    }

    #[tokio::test]
    async fn test_per_transaction_cap() {
        let (guard, cache) = guard();
        assert!(guard.check_per_transaction("111", dec!(1000000)).await.is_ok());

        cache
            .set("limit_per_transaction:111", "0".into(), None)
            .await
            .unwrap();
        assert!(guard.check_per_transaction("111", dec!(1000000)).await.is_ok());

        cache
            .set("limit_per_transaction:111", "500.00".into(), None)
            .await
            .unwrap();
        assert!(guard.check_per_transaction("111", dec!(500.00)).await.is_ok());
        assert!(matches!(
            guard.check_per_transaction("111", dec!(500.01)).await,
            Err(TransferError::PerTransactionLimitExceeded { .. })
        ));
    }

    #[tokio::test]
    async fn test_deposit_minimum_requires_setting() {
        let (guard, cache) = guard();
        assert!(matches!(
            guard.check_deposit(dec!(100)).await,
            Err(TransferError::ConfigurationMissing(key)) if key == "min_deposit_amount"
        ));

        cache.set("min_deposit_amount", "100".into(), None).await.unwrap();
        assert!(guard.check_deposit(dec!(100)).await.is_ok());
        assert!(matches!(
            guard.check_deposit(dec!(99.99)).await,
            Err(TransferError::MinimumDepositNotMet { .. })
        ));
    }

    #[tokio::test]
    async fn test_garbage_setting_fails_closed() {
        let (guard, cache) = guard();
        cache.set("daily_limit_111", "lots".into(), None).await.unwrap();
        assert!(matches!(
            guard.check_daily("111", dec!(1)).await,
            Err(TransferError::ConfigurationMissing(_))
        ));
    }

    #[tokio::test]
    async fn test_record_transfer_accumulates() {
        let (guard, _cache) = guard();
        guard.record_transfer("111", dec!(100)).await.unwrap();
        let total = guard.record_transfer("111", dec!(50.50)).await.unwrap();
        assert_eq!(total, dec!(150.50));
        assert_eq!(guard.daily_total("111").await.unwrap(), dec!(150.50));
    }

    #[test]
    fn test_until_end_of_day() {
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 22, 0, 0).unwrap();
        assert_eq!(until_end_of_day(now), Duration::from_secs(2 * 3600));

        let midnight = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        assert_eq!(until_end_of_day(midnight), Duration::from_secs(24 * 3600));
    }
}
