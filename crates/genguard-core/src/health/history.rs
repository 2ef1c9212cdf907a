//! Time-windowed generation history.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// One generation outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationRecord {
    pub timestamp: DateTime<Utc>,
    pub success: bool,
}

impl GenerationRecord {
    pub fn new(timestamp: DateTime<Utc>, success: bool) -> Self {
        Self { timestamp, success }
    }
}

/// Totals over the retained window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct WindowStats {
    pub total: usize,
    pub failed: usize,
}

impl WindowStats {
    /// Failure ratio in [0, 1]; zero for an empty window.
    pub fn failure_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.failed as f64 / self.total as f64
        }
    }
}

/// Append-ordered ring of recent outcomes.
///
/// Length never exceeds `capacity`; after [`prune`](Self::prune) every
/// record is newer than `now - window`. Records arrive in time order, so
/// eviction is always a prefix trim.
#[derive(Debug, Clone)]
pub struct GenerationHistory {
    records: VecDeque<GenerationRecord>,
    capacity: usize,
    window: chrono::Duration,
}

impl GenerationHistory {
    pub fn new(capacity: usize, window: chrono::Duration) -> Self {
        Self {
            records: VecDeque::with_capacity(capacity.min(1024)),
            capacity: capacity.max(1),
            window,
        }
    }

    /// Append a record, evicting the oldest on overflow.
    pub fn push(&mut self, record: GenerationRecord) {
        while self.records.len() >= self.capacity {
            self.records.pop_front();
        }
        self.records.push_back(record);
    }

    /// Insert a record at its place in time order, evicting the oldest on
    /// overflow. Records with equal timestamps keep insertion order.
    pub fn insert_ordered(&mut self, record: GenerationRecord) {
        let at = self
            .records
            .partition_point(|existing| existing.timestamp <= record.timestamp);
        self.records.insert(at, record);
        while self.records.len() > self.capacity {
            self.records.pop_front();
        }
    }

    /// Drop every record older than the window.
    pub fn prune(&mut self, now: DateTime<Utc>) {
        let cutoff = now - self.window;
        while self
            .records
            .front()
            .is_some_and(|record| record.timestamp < cutoff)
        {
            self.records.pop_front();
        }
    }

    pub fn stats(&self) -> WindowStats {
        WindowStats {
            total: self.records.len(),
            failed: self.records.iter().filter(|r| !r.success).count(),
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &GenerationRecord> {
        self.records.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_prune_trims_stale_prefix() {
        let now = Utc::now();
        let mut history = GenerationHistory::new(100, chrono::Duration::hours(1));

        history.push(GenerationRecord::new(now - chrono::Duration::minutes(90), false));
        history.push(GenerationRecord::new(now - chrono::Duration::minutes(61), false));
        history.push(GenerationRecord::new(now - chrono::Duration::minutes(10), true));

        history.prune(now);
        assert_eq!(history.len(), 1);
        assert_eq!(history.stats(), WindowStats { total: 1, failed: 0 });
    }

    #[test]
    fn test_capacity_evicts_oldest() {
        let now = Utc::now();
        let mut history = GenerationHistory::new(3, chrono::Duration::hours(1));
        history.push(GenerationRecord::new(now, false));
        for _ in 0..3 {
            history.push(GenerationRecord::new(now, true));
        }
        assert_eq!(history.len(), 3);
        assert_eq!(history.stats().failed, 0);
    }

    #[test]
    fn test_insert_ordered_keeps_prune_a_prefix_trim() {
        let now = Utc::now();
        let mut history = GenerationHistory::new(100, chrono::Duration::hours(1));
        history.push(GenerationRecord::new(now, true));
        history.insert_ordered(GenerationRecord::new(now - chrono::Duration::minutes(50), false));
        history.insert_ordered(GenerationRecord::new(now - chrono::Duration::minutes(5), false));

        let stamps: Vec<_> = history.iter().map(|r| r.timestamp).collect();
        assert!(stamps.windows(2).all(|pair| pair[0] <= pair[1]));

        history.prune(now + chrono::Duration::minutes(20));
        assert_eq!(history.stats(), WindowStats { total: 2, failed: 1 });
    }

    #[test]
    fn test_failure_rate() {
        let stats = WindowStats { total: 20, failed: 3 };
        assert!((stats.failure_rate() - 0.15).abs() < f64::EPSILON);
        assert_eq!(WindowStats::default().failure_rate(), 0.0);
    }

    proptest! {
        #[test]
        fn prop_bounded_and_fresh(
            cap in 1usize..50,
            ages in proptest::collection::vec(0i64..7200, 0..200),
        ) {
            let now = Utc::now();
            let mut history = GenerationHistory::new(cap, chrono::Duration::hours(1));
            let mut sorted = ages;
            sorted.sort_unstable_by(|a, b| b.cmp(a));
            for age in sorted {
                history.push(GenerationRecord::new(now - chrono::Duration::seconds(age), age % 2 == 0));
                prop_assert!(history.len() <= cap);
            }
            history.prune(now);
            let cutoff = now - chrono::Duration::hours(1);
            prop_assert!(history.iter().all(|r| r.timestamp >= cutoff));
        }

        #[test]
        fn prop_any_insert_order_prunes_fully(
            ages in proptest::collection::vec(0i64..7200, 0..100),
            advance in 0i64..3600,
        ) {
            let start = Utc::now();
            let mut history = GenerationHistory::new(1000, chrono::Duration::hours(1));
            for age in ages {
                history.insert_ordered(GenerationRecord::new(start - chrono::Duration::seconds(age), false));
            }
            let now = start + chrono::Duration::seconds(advance);
            history.prune(now);
            let cutoff = now - chrono::Duration::hours(1);
            prop_assert!(history.iter().all(|r| r.timestamp >= cutoff));
        }
    }
}
