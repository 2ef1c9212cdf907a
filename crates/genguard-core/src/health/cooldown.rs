//! Per-kind alert cooldowns.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::time::Duration;

use super::alert::AlertKind;
use crate::clock::to_chrono;

/// Remembers when each gated alert kind last fired.
///
/// Kinds without a configured period are never gated. A suppressed check
/// does not touch the stored time, and stored times never move backwards.
#[derive(Debug, Clone, Default)]
pub struct CooldownTracker {
    periods: HashMap<AlertKind, Duration>,
    last_fired: HashMap<AlertKind, DateTime<Utc>>,
}

impl CooldownTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Gate `kind` behind `period`.
    pub fn with_period(mut self, kind: AlertKind, period: Duration) -> Self {
        self.periods.insert(kind, period);
        self
    }

    /// Remaining cooldown for `kind` at `now`, if it is still cooling down.
    pub fn remaining(&self, kind: AlertKind, now: DateTime<Utc>) -> Option<Duration> {
        let period = self.periods.get(&kind)?;
        let last = self.last_fired.get(&kind)?;
        let ready_at = *last + to_chrono(*period);
        if now < ready_at {
            (ready_at - now).to_std().ok()
        } else {
            None
        }
    }

    /// Stamp `kind` as fired at `now`.
    pub fn mark_fired(&mut self, kind: AlertKind, now: DateTime<Utc>) {
        if !self.periods.contains_key(&kind) {
            return;
        }
        let entry = self.last_fired.entry(kind).or_insert(now);
        if now > *entry {
            *entry = now;
        }
    }

    pub fn last_fired(&self, kind: AlertKind) -> Option<DateTime<Utc>> {
        self.last_fired.get(&kind).copied()
    }

    /// Forget every fire time; periods are kept.
    pub fn clear(&mut self) {
        self.last_fired.clear();
    }
}
