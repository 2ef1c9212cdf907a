//! In-process counter store.
//!
//! Used when no durable store is configured or reachable. Counts are per
//! process, so under horizontal scaling each instance enforces its own
//! limits.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;

use genguard_core::clock::to_chrono;
use genguard_core::{consume_window, system_clock, Clock, FixedWindow};

use super::store::{ConsumeOutcome, CounterSnapshot, CounterStore, StoreError};

#[derive(Debug, Clone, Copy)]
struct Entry {
    value: u64,
    expires_at: Option<DateTime<Utc>>,
}

impl Entry {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }

    /// The entry as a rate-limit window; counters without a TTL have none.
    fn window(&self) -> Option<FixedWindow> {
        self.expires_at.map(|reset_at| FixedWindow {
            count: self.value,
            reset_at,
        })
    }

    fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            value: self.value,
            expires_at: self.expires_at,
        }
    }
}

/// Map-backed [`CounterStore`].
///
/// Every read-check-write happens under one lock with no await in between.
pub struct MemoryCounterStore {
    entries: Mutex<HashMap<String, Entry>>,
    clock: Arc<dyn Clock>,
}

impl MemoryCounterStore {
    pub fn new() -> Self {
        Self::with_clock(system_clock())
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            clock,
        }
    }

    /// Drop expired counters. Returns how many were removed.
    pub fn sweep(&self) -> usize {
        let now = self.clock.now();
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired(now));
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Sweep every `every` until the store is dropped.
    pub fn spawn_sweeper(self: &Arc<Self>, every: Duration) -> JoinHandle<()> {
        let store: Weak<Self> = Arc::downgrade(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(store) = store.upgrade() else {
                    break;
                };
                let removed = store.sweep();
                if removed > 0 {
                    tracing::debug!(removed, remaining = store.len(), "Swept expired counters");
                }
            }
        })
    }

    /// Live entry for `key`, creating it with `ttl` if absent or expired.
    fn live_entry<'a>(
        entries: &'a mut HashMap<String, Entry>,
        key: &str,
        ttl: Option<Duration>,
        now: DateTime<Utc>,
    ) -> &'a mut Entry {
        let fresh = Entry {
            value: 0,
            expires_at: ttl.map(|ttl| now + to_chrono(ttl)),
        };
        let entry = entries.entry(key.to_string()).or_insert(fresh);
        if entry.is_expired(now) {
            *entry = fresh;
        }
        entry
    }
}

impl Default for MemoryCounterStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MemoryCounterStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryCounterStore")
            .field("entries", &self.len())
            .finish()
    }
}

#[async_trait]
impl CounterStore for MemoryCounterStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn increment(
        &self,
        key: &str,
        delta: i64,
        ttl: Option<Duration>,
    ) -> Result<CounterSnapshot, StoreError> {
        let now = self.clock.now();
        let mut entries = self.entries.lock();
        let entry = Self::live_entry(&mut entries, key, ttl, now);
        entry.value = if delta >= 0 {
            entry.value.saturating_add(delta.unsigned_abs())
        } else {
            entry.value.saturating_sub(delta.unsigned_abs())
        };
        Ok(entry.snapshot())
    }

    async fn get(&self, key: &str) -> Result<Option<CounterSnapshot>, StoreError> {
        let now = self.clock.now();
        let entries = self.entries.lock();
        Ok(entries
            .get(key)
            .filter(|entry| !entry.is_expired(now))
            .map(Entry::snapshot))
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.entries.lock().remove(key);
        Ok(())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn try_consume(
        &self,
        key: &str,
        points: u64,
        limit: u64,
        ttl: Duration,
    ) -> Result<ConsumeOutcome, StoreError> {
        let now = self.clock.now();
        let mut entries = self.entries.lock();

        let current = entries.get(key).and_then(Entry::window);
        let (window, allowed) = consume_window(current, points, limit, ttl, now);
        let entry = Entry {
            value: window.count,
            expires_at: Some(window.reset_at),
        };
        entries.insert(key.to_string(), entry);

        Ok(ConsumeOutcome {
            allowed,
            counter: entry.snapshot(),
        })
    }
}
