//! Fixed-window rate-limit arithmetic.
//!
//! Stores keep one [`FixedWindow`] per (limiter, key). The first consumption
//! opens a window ending at `now + window`; later consumptions inside it add
//! to the count; a consumption that would exceed the limit is refused and
//! leaves the count untouched.

use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::clock::to_chrono;

/// Definition of a named limiter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimiterSpec {
    /// Limiter name (e.g. "generation", "api")
    pub name: String,

    /// Points allowed per window
    pub max_points: u32,

    /// Window length
    #[serde(with = "crate::duration")]
    pub window: Duration,
}

impl LimiterSpec {
    pub fn new(name: impl Into<String>, max_points: u32, window: Duration) -> Self {
        Self {
            name: name.into(),
            max_points,
            window,
        }
    }
}

/// Outcome of a consume call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RateLimitResult {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    pub reset_at: DateTime<Utc>,
}

impl RateLimitResult {
    /// Time a rejected caller should wait, relative to `now`.
    pub fn retry_after(&self, now: DateTime<Utc>) -> Duration {
        (self.reset_at - now).to_std().unwrap_or(Duration::ZERO)
    }
}

/// Counter state of one key inside its current window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedWindow {
    pub count: u64,
    pub reset_at: DateTime<Utc>,
}

impl FixedWindow {
    /// Open a fresh, empty window at `now`.
    pub fn open(now: DateTime<Utc>, window: Duration) -> Self {
        Self {
            count: 0,
            reset_at: now + to_chrono(window),
        }
    }

    /// Whether the window has elapsed.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.reset_at
    }

    /// Try to add `points`; returns whether they fit under `limit`.
    pub fn try_add(&mut self, points: u64, limit: u64) -> bool {
        match self.count.checked_add(points) {
            Some(next) if next <= limit => {
                self.count = next;
                true
            }
            _ => false,
        }
    }

    /// Render as a result for `limit`.
    pub fn result(&self, allowed: bool, limit: u32) -> RateLimitResult {
        RateLimitResult {
            allowed,
            limit,
            remaining: (limit as u64).saturating_sub(self.count) as u32,
            reset_at: self.reset_at,
        }
    }
}

/// Consume `points` against an optional existing window.
///
/// An absent or elapsed window is replaced by a fresh one of length
/// `window`. Returns the window to keep and whether the points fit under
/// `limit`; a refused consume leaves the count unchanged.
pub fn consume_window(
    current: Option<FixedWindow>,
    points: u64,
    limit: u64,
    window: Duration,
    now: DateTime<Utc>,
) -> (FixedWindow, bool) {
    let mut state = match current {
        Some(w) if !w.is_expired(now) => w,
        _ => FixedWindow::open(now, window),
    };
    let allowed = state.try_add(points, limit);
    (state, allowed)
}

/// Seconds from `now` until the next midnight in `offset`'s local time.
///
/// Always at least one second so a TTL computed from it is never zero.
pub fn seconds_until_next_midnight(now: DateTime<Utc>, offset: FixedOffset) -> u64 {
    let local = now.with_timezone(&offset);
    let next_midnight = local
        .date_naive()
        .succ_opt()
        .and_then(|day| day.and_hms_opt(0, 0, 0));

    match next_midnight {
        Some(midnight) => (midnight - local.naive_local()).num_seconds().max(1) as u64,
        None => 86_400,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;

    const MINUTE: Duration = Duration::from_secs(60);

    #[test]
    fn test_limit_exactly_then_reject() {
        let now = Utc::now();
        let mut window = None;

        for expected_remaining in [2, 1, 0] {
            let (w, allowed) = consume_window(window, 1, 3, MINUTE, now);
            let result = w.result(allowed, 3);
            assert!(result.allowed);
            assert_eq!(result.remaining, expected_remaining);
            window = Some(w);
        }

        let (w, allowed) = consume_window(window, 1, 3, MINUTE, now);
        let result = w.result(allowed, 3);
        assert!(!result.allowed);
        assert_eq!(result.remaining, 0);
        assert_eq!(w.count, 3, "rejected consume must not increment");
        assert!(result.reset_at > now);
    }

    #[test]
    fn test_window_resets_after_expiry() {
        let start = Utc::now();

        let (w, _) = consume_window(None, 1, 1, MINUTE, start);
        let (w, allowed) = consume_window(Some(w), 1, 1, MINUTE, start + chrono::Duration::seconds(30));
        assert!(!allowed);

        let later = start + chrono::Duration::seconds(60);
        let (fresh, allowed) = consume_window(Some(w), 1, 1, MINUTE, later);
        assert!(allowed);
        assert_eq!(fresh.reset_at, later + chrono::Duration::seconds(60));
    }

    #[test]
    fn test_retry_after() {
        let now = Utc::now();
        let result = RateLimitResult {
            allowed: false,
            limit: 1,
            remaining: 0,
            reset_at: now + chrono::Duration::seconds(42),
        };
        assert_eq!(result.retry_after(now), Duration::from_secs(42));
        assert_eq!(result.retry_after(now + chrono::Duration::seconds(50)), Duration::ZERO);
    }

    #[test]
    fn test_seconds_until_midnight_in_offset() {
        let msk = FixedOffset::east_opt(3 * 3600).unwrap();
        // 20:00 UTC is 23:00 in UTC+3: one hour to local midnight.
        let now = Utc.with_ymd_and_hms(2025, 3, 10, 20, 0, 0).unwrap();
        assert_eq!(seconds_until_next_midnight(now, msk), 3600);

        // 21:00 UTC is exactly local midnight: a full day until the next one.
        let at_midnight = Utc.with_ymd_and_hms(2025, 3, 10, 21, 0, 0).unwrap();
        assert_eq!(seconds_until_next_midnight(at_midnight, msk), 86_400);
    }

    proptest! {
        #[test]
        fn prop_never_exceeds_limit(max in 1u32..50, attempts in 0usize..120, points in 1u32..4) {
            let now = Utc::now();
            let mut window = None;
            let mut allowed_points = 0u64;

            for _ in 0..attempts {
                let (w, allowed) = consume_window(window, points as u64, max as u64, Duration::from_secs(3600), now);
                if allowed {
                    allowed_points += points as u64;
                }
                prop_assert!(w.count <= max as u64);
                window = Some(w);
            }
            prop_assert!(allowed_points <= max as u64);
        }

        #[test]
        fn prop_midnight_within_a_day(secs in 0i64..4_000_000_000i64, offset_h in -12i32..14) {
            let now = Utc.timestamp_opt(secs, 0).unwrap();
            let offset = FixedOffset::east_opt(offset_h * 3600).unwrap();
            let ttl = seconds_until_next_midnight(now, offset);
            prop_assert!((1..=86_400).contains(&ttl));
        }
    }
}
