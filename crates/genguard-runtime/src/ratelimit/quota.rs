//! Per-user daily generation quota.
//!
//! One counter per user that expires at the next local midnight of a fixed
//! reference timezone. The TTL is set by the first increment of the day.

use chrono::FixedOffset;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

use genguard_core::{seconds_until_next_midnight, system_clock, Clock};

use super::store::{CounterStore, StoreError};
use crate::config::DailyQuotaConfig;

/// Outcome of a daily quota check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DailyQuotaResult {
    pub allowed: bool,
    pub used: u64,
    pub limit: u64,
    /// Time until the counter resets
    pub resets_in: Duration,
}

/// Daily quota over a counter store.
///
/// A store error allows the request: availability wins over strict
/// enforcement.
pub struct DailyQuota {
    store: Arc<dyn CounterStore>,
    offset: FixedOffset,
    key_prefix: String,
    default_limit: u64,
    clock: Arc<dyn Clock>,
}

impl DailyQuota {
    pub fn new(store: Arc<dyn CounterStore>, config: &DailyQuotaConfig) -> Self {
        Self::with_clock(store, config, system_clock())
    }

    pub fn with_clock(
        store: Arc<dyn CounterStore>,
        config: &DailyQuotaConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            offset: config.offset(),
            key_prefix: config.key_prefix.clone(),
            default_limit: config.daily_limit,
            clock,
        }
    }

    pub fn default_limit(&self) -> u64 {
        self.default_limit
    }

    /// Time until the current quota day ends.
    pub fn seconds_until_reset(&self) -> u64 {
        seconds_until_next_midnight(self.clock.now(), self.offset)
    }

    /// Count one generation for `user_id` and compare against `cap`.
    ///
    /// Every call increments, including refused ones.
    pub async fn check_daily_quota(&self, user_id: &str, cap: u64) -> DailyQuotaResult {
        let ttl = Duration::from_secs(self.seconds_until_reset());
        let key = self.key(user_id);

        match self.store.increment(&key, 1, Some(ttl)).await {
            Ok(counter) => {
                let allowed = counter.value <= cap;
                let resets_in = counter
                    .expires_at
                    .and_then(|at| (at - self.clock.now()).to_std().ok())
                    .unwrap_or(ttl);
                if !allowed {
                    tracing::info!(user = user_id, used = counter.value, limit = cap, "Daily quota exceeded");
                }
                DailyQuotaResult {
                    allowed,
                    used: counter.value,
                    limit: cap,
                    resets_in,
                }
            }
            Err(e) => {
                tracing::error!(user = user_id, error = %e, "Daily quota check failed, allowing request");
                DailyQuotaResult {
                    allowed: true,
                    used: 0,
                    limit: cap,
                    resets_in: ttl,
                }
            }
        }
    }

    /// Check against the configured daily limit.
    pub async fn check(&self, user_id: &str) -> DailyQuotaResult {
        self.check_daily_quota(user_id, self.default_limit).await
    }

    /// Generations counted today, without counting one.
    pub async fn usage(&self, user_id: &str) -> Result<u64, StoreError> {
        Ok(self
            .store
            .get(&self.key(user_id))
            .await?
            .map_or(0, |counter| counter.value))
    }

    pub async fn reset_user(&self, user_id: &str) -> Result<(), StoreError> {
        self.store.delete(&self.key(user_id)).await?;
        tracing::info!(user = user_id, "Daily quota reset");
        Ok(())
    }

    fn key(&self, user_id: &str) -> String {
        format!("{}:{}", self.key_prefix, user_id)
    }
}

impl std::fmt::Debug for DailyQuota {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DailyQuota")
            .field("store", &self.store.name())
            .field("offset", &self.offset)
            .field("default_limit", &self.default_limit)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ratelimit::{CounterSnapshot, MemoryCounterStore};
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use genguard_core::ManualClock;

    struct DownStore;

    #[async_trait]
    impl CounterStore for DownStore {
        fn name(&self) -> &str {
            "down"
        }

        async fn increment(
            &self,
            _key: &str,
            _delta: i64,
            _ttl: Option<Duration>,
        ) -> Result<CounterSnapshot, StoreError> {
            Err(StoreError::Unavailable("down".to_string()))
        }

        async fn get(&self, _key: &str) -> Result<Option<CounterSnapshot>, StoreError> {
            Err(StoreError::Unavailable("down".to_string()))
        }

        async fn delete(&self, _key: &str) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("down".to_string()))
        }

        async fn ping(&self) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("down".to_string()))
        }
    }

    fn quota_at(clock: &ManualClock) -> DailyQuota {
        let clock: Arc<dyn Clock> = Arc::new(clock.clone());
        let store = Arc::new(MemoryCounterStore::with_clock(Arc::clone(&clock)));
        DailyQuota::with_clock(store, &DailyQuotaConfig::default(), clock)
    }

    #[tokio::test]
    async fn test_quota_counts_and_refuses() {
        // 20:00 UTC = 23:00 at UTC+3
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2025, 3, 10, 20, 0, 0).unwrap());
        let quota = quota_at(&clock);

        for used in 1..=3 {
            let result = quota.check_daily_quota("u1", 3).await;
            assert!(result.allowed);
            assert_eq!(result.used, used);
        }

        let refused = quota.check_daily_quota("u1", 3).await;
        assert!(!refused.allowed);
        assert_eq!(refused.used, 4);
        assert_eq!(refused.resets_in, Duration::from_secs(3600));
        assert_eq!(quota.usage("u1").await.unwrap(), 4);
    }

    #[tokio::test]
    async fn test_quota_resets_at_local_midnight() {
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2025, 3, 10, 20, 0, 0).unwrap());
        let quota = quota_at(&clock);

        assert!(quota.check_daily_quota("u1", 1).await.allowed);
        assert!(!quota.check_daily_quota("u1", 1).await.allowed);

        clock.advance(Duration::from_secs(3600));
        let next_day = quota.check_daily_quota("u1", 1).await;
        assert!(next_day.allowed);
        assert_eq!(next_day.used, 1);
        assert_eq!(next_day.resets_in, Duration::from_secs(86_400));
    }

    #[tokio::test]
    async fn test_reset_user() {
        let clock = ManualClock::starting_now();
        let quota = quota_at(&clock);
        quota.check("u1").await;
        quota.reset_user("u1").await.unwrap();
        assert_eq!(quota.usage("u1").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_store_error_fails_open() {
        let quota = DailyQuota::new(Arc::new(DownStore), &DailyQuotaConfig::default());
        let result = quota.check_daily_quota("u1", 1).await;
        assert!(result.allowed);
        assert_eq!(result.used, 0);
        assert!(quota.usage("u1").await.is_err());
    }
}
