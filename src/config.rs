//! Engine configuration.

use crate::domain::transaction::{FailurePolicy, backoff};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::time::Duration;

/// Tunables for the engine and its background pipeline.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Deadline for each operation, up to and including its commit.
    pub operation_timeout: Duration,
    /// How often the poller scans for due scheduled transfers.
    pub poll_interval: Duration,
    /// Poll time is truncated down to a multiple of this width.
    pub bucket_width: Duration,
    /// Daily limit used when the cache holds neither an account-specific
    /// nor a default value.
    pub fallback_daily_limit: Decimal,
    /// Retries of a transfer whose commit hit a version conflict.
    pub max_conflict_retries: u32,
    /// Attempts before a scheduled transfer is marked failed.
    pub max_attempts: u32,
    pub retry_base_delay: Duration,
    pub retry_max_delay: Duration,
    /// How long shutdown waits for each background task.
    pub shutdown_grace: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            operation_timeout: Duration::from_secs(2),
            poll_interval: Duration::from_secs(15),
            bucket_width: Duration::from_secs(5 * 60),
            fallback_daily_limit: dec!(50000.00),
            max_conflict_retries: 3,
            max_attempts: 5,
            retry_base_delay: Duration::from_secs(60),
            retry_max_delay: Duration::from_secs(60 * 60),
            shutdown_grace: Duration::from_secs(10),
        }
    }
}

impl EngineConfig {
    /// Delay before retrying a scheduled transfer after `attempts` failures.
    pub fn retry_delay(&self, attempts: u32) -> Duration {
        backoff(self.retry_base_delay, self.retry_max_delay, attempts)
    }

    pub fn failure_policy(&self, permanent: bool, now: DateTime<Utc>) -> FailurePolicy {
        FailurePolicy {
            permanent,
            max_attempts: self.max_attempts,
            base_delay: self.retry_base_delay,
            max_delay: self.retry_max_delay,
            now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_delay_doubles_and_caps() {
        let config = EngineConfig::default();
        assert_eq!(config.retry_delay(1), Duration::from_secs(60));
        assert_eq!(config.retry_delay(2), Duration::from_secs(120));
        assert_eq!(config.retry_delay(3), Duration::from_secs(240));
        assert_eq!(config.retry_delay(40), Duration::from_secs(3600));
    }
}
