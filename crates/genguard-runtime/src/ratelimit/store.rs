//! Shared counter store abstraction.
//!
//! A durable backend (Redis or similar) makes limits correct across process
//! instances. It must offer an atomic increment that sets a TTL only when the
//! key is created. [`MemoryCounterStore`](super::MemoryCounterStore) is the
//! in-process fallback.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;
use thiserror::Error;

/// Errors from a counter store.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("Counter store unavailable: {0}")]
    Unavailable(String),

    #[error("Counter store error: {0}")]
    Backend(String),
}

/// A counter value and its expiry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CounterSnapshot {
    pub value: u64,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Outcome of [`CounterStore::try_consume`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConsumeOutcome {
    pub allowed: bool,
    pub counter: CounterSnapshot,
}

/// Counter backend shared by the rate limiter and the daily quota.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Backend name for logs.
    fn name(&self) -> &str;

    /// Atomically add `delta` (may be negative; values floor at zero).
    ///
    /// `ttl` is applied only when this call creates the key.
    async fn increment(
        &self,
        key: &str,
        delta: i64,
        ttl: Option<Duration>,
    ) -> Result<CounterSnapshot, StoreError>;

    async fn get(&self, key: &str) -> Result<Option<CounterSnapshot>, StoreError>;

    async fn delete(&self, key: &str) -> Result<(), StoreError>;

    /// Cheap liveness probe.
    async fn ping(&self) -> Result<(), StoreError>;

    /// Add `points` unless the counter would exceed `limit`.
    ///
    /// The default increments and rolls back on overshoot, so the counter
    /// never stays above `limit`. Two racing callers near the limit may both
    /// be refused; backends with scripting should override this with a
    /// single atomic operation.
    async fn try_consume(
        &self,
        key: &str,
        points: u64,
        limit: u64,
        ttl: Duration,
    ) -> Result<ConsumeOutcome, StoreError> {
        let delta = i64::try_from(points)
            .map_err(|_| StoreError::Backend(format!("points out of range: {}", points)))?;

        let counter = self.increment(key, delta, Some(ttl)).await?;
        if counter.value <= limit {
            return Ok(ConsumeOutcome {
                allowed: true,
                counter,
            });
        }

        let counter = self.increment(key, -delta, None).await?;
        Ok(ConsumeOutcome {
            allowed: false,
            counter,
        })
    }
}
