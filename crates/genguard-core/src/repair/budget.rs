//! Per-generation repair budget.

use std::sync::atomic::{AtomicU32, Ordering};

/// Repair attempts allowed for one generation run.
pub const MAX_REPAIR_ATTEMPTS: u32 = 10;

/// Counts repair attempts for one generation run.
///
/// Shared by every repair in the run (wrap in `Arc` for concurrent
/// repairs). Each attempt takes one unit whether or not it succeeds;
/// `used` never exceeds `cap`.
#[derive(Debug)]
pub struct RepairBudget {
    cap: u32,
    used: AtomicU32,
}

impl RepairBudget {
    pub fn new() -> Self {
        Self::with_cap(MAX_REPAIR_ATTEMPTS)
    }

    pub fn with_cap(cap: u32) -> Self {
        Self {
            cap,
            used: AtomicU32::new(0),
        }
    }

    /// Take one unit. Returns `false` once the budget is exhausted.
    pub fn try_consume(&self) -> bool {
        self.used
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |used| {
                (used < self.cap).then_some(used + 1)
            })
            .is_ok()
    }

    pub fn used(&self) -> u32 {
        self.used.load(Ordering::SeqCst)
    }

    pub fn remaining(&self) -> u32 {
        self.cap.saturating_sub(self.used())
    }

    pub fn cap(&self) -> u32 {
        self.cap
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining() == 0
    }
}

impl Default for RepairBudget {
    fn default() -> Self {
        Self::new()
    }
}
