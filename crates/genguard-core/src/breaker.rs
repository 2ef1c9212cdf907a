//! Circuit breaker guarding the upstream AI provider.
//!
//! When generation calls fail repeatedly, the circuit opens and callers fail
//! fast instead of queueing more work against a dead endpoint.
//!
//! ```text
//! Closed   → Open      consecutive failures >= failure_threshold
//! Open     → HalfOpen  first is_open() check once reset_timeout has elapsed
//! HalfOpen → Closed    probe succeeds
//! HalfOpen → Open      probe fails
//! ```
//!
//! The breaker never errors. Callers ask [`CircuitBreaker::is_open`] before
//! each attempt and report the outcome of their own call afterwards.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::clock::{system_clock, to_chrono, Clock};

/// Circuit breaker configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before opening the circuit
    pub failure_threshold: u32,

    /// Time after the last failure before a probe is allowed
    #[serde(with = "crate::duration")]
    pub reset_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_timeout: Duration::from_secs(60),
        }
    }
}

/// State of the circuit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    /// Normal operation
    Closed,

    /// Upstream assumed down, calls fail fast
    Open,

    /// A single probe call is testing recovery
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "CLOSED"),
            CircuitState::Open => write!(f, "OPEN"),
            CircuitState::HalfOpen => write!(f, "HALF_OPEN"),
        }
    }
}

/// Point-in-time view of a breaker, for admin endpoints and logs.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BreakerSnapshot {
    pub name: String,
    pub state: CircuitState,
    pub consecutive_failures: u32,
    pub last_failure_at: Option<DateTime<Utc>>,
    pub failure_threshold: u32,
    pub reset_timeout_ms: u64,
}

#[derive(Debug)]
struct BreakerInner {
    config: CircuitBreakerConfig,
    state: CircuitState,
    consecutive_failures: u32,
    last_failure_at: Option<DateTime<Utc>>,
    probe_started_at: Option<DateTime<Utc>>,
}

/// Failure-aware gate around one upstream dependency.
pub struct CircuitBreaker {
    name: String,
    inner: RwLock<BreakerInner>,
    clock: Arc<dyn Clock>,
}

impl CircuitBreaker {
    /// Create a breaker using the system clock.
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self::with_clock(name, config, system_clock())
    }

    /// Create a breaker reading time from `clock`.
    pub fn with_clock(
        name: impl Into<String>,
        config: CircuitBreakerConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            name: name.into(),
            inner: RwLock::new(BreakerInner {
                config,
                state: CircuitState::Closed,
                consecutive_failures: 0,
                last_failure_at: None,
                probe_started_at: None,
            }),
            clock,
        }
    }

    /// Name of the guarded dependency.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Check whether calls must fail fast.
    ///
    /// Side-effecting: once the reset timeout has elapsed in `Open`, this
    /// call moves the circuit to `HalfOpen` and admits the caller as the
    /// recovery probe. While the probe is outstanding other callers are
    /// refused, unless the probe has been silent for a whole reset timeout.
    pub fn is_open(&self) -> bool {
        let now = self.clock.now();
        let mut inner = self.inner.write();
        let reset_timeout = to_chrono(inner.config.reset_timeout);

        match inner.state {
            CircuitState::Closed => false,
            CircuitState::Open => {
                let elapsed_enough = inner
                    .last_failure_at
                    .map(|at| now - at >= reset_timeout)
                    .unwrap_or(true);
                if elapsed_enough {
                    inner.state = CircuitState::HalfOpen;
                    inner.probe_started_at = Some(now);
                    tracing::info!(breaker = %self.name, "Circuit half-open, admitting recovery probe");
                    false
                } else {
                    true
                }
            }
            CircuitState::HalfOpen => {
                let probe_lost = inner
                    .probe_started_at
                    .map(|at| now - at >= reset_timeout)
                    .unwrap_or(true);
                if probe_lost {
                    inner.probe_started_at = Some(now);
                    tracing::warn!(breaker = %self.name, "Recovery probe never reported, admitting another");
                    false
                } else {
                    true
                }
            }
        }
    }

    /// Convenience inverse of [`is_open`](Self::is_open).
    pub fn is_call_allowed(&self) -> bool {
        !self.is_open()
    }

    /// Record a successful upstream call.
    pub fn record_success(&self) {
        let mut inner = self.inner.write();
        match inner.state {
            CircuitState::HalfOpen => {
                inner.state = CircuitState::Closed;
                inner.consecutive_failures = 0;
                inner.probe_started_at = None;
                tracing::info!(breaker = %self.name, "Circuit closed after successful probe");
            }
            CircuitState::Closed => {
                inner.consecutive_failures = 0;
            }
            CircuitState::Open => {
                // A call admitted before the circuit opened. The count resets;
                // only the probe may close the circuit.
                inner.consecutive_failures = 0;
                tracing::debug!(breaker = %self.name, "Late success while open, circuit stays open");
            }
        }
    }

    /// Record a failed (or timed out) upstream call.
    pub fn record_failure(&self) {
        let now = self.clock.now();
        let mut inner = self.inner.write();
        inner.consecutive_failures = inner.consecutive_failures.saturating_add(1);
        inner.last_failure_at = Some(now);

        match inner.state {
            CircuitState::Closed => {
                if inner.consecutive_failures >= inner.config.failure_threshold {
                    inner.state = CircuitState::Open;
                    tracing::warn!(
                        breaker = %self.name,
                        failures = inner.consecutive_failures,
                        "Circuit opened after repeated failures"
                    );
                }
            }
            CircuitState::HalfOpen => {
                inner.state = CircuitState::Open;
                inner.probe_started_at = None;
                tracing::warn!(breaker = %self.name, "Circuit reopened after failed probe");
            }
            CircuitState::Open => {}
        }
    }

    /// Record an outcome classified by the caller.
    pub fn record_outcome(&self, success: bool) {
        if success {
            self.record_success();
        } else {
            self.record_failure();
        }
    }

    /// Current state. Never mutates.
    pub fn state(&self) -> CircuitState {
        self.inner.read().state
    }

    /// Current consecutive failure count.
    pub fn consecutive_failures(&self) -> u32 {
        self.inner.read().consecutive_failures
    }

    /// Snapshot for observability.
    pub fn snapshot(&self) -> BreakerSnapshot {
        let inner = self.inner.read();
        BreakerSnapshot {
            name: self.name.clone(),
            state: inner.state,
            consecutive_failures: inner.consecutive_failures,
            last_failure_at: inner.last_failure_at,
            failure_threshold: inner.config.failure_threshold,
            reset_timeout_ms: inner.config.reset_timeout.as_millis() as u64,
        }
    }

    /// Replace thresholds in place. Last writer wins.
    pub fn update_config(&self, config: CircuitBreakerConfig) {
        let mut inner = self.inner.write();
        tracing::info!(
            breaker = %self.name,
            failure_threshold = config.failure_threshold,
            reset_timeout_ms = config.reset_timeout.as_millis() as u64,
            "Circuit breaker reconfigured"
        );
        inner.config = config;
    }

    /// Force the circuit closed with zeroed counters.
    pub fn reset(&self) {
        let mut inner = self.inner.write();
        inner.state = CircuitState::Closed;
        inner.consecutive_failures = 0;
        inner.last_failure_at = None;
        inner.probe_started_at = None;
    }
}

impl std::fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.read();
        f.debug_struct("CircuitBreaker")
            .field("name", &self.name)
            .field("state", &inner.state)
            .field("consecutive_failures", &inner.consecutive_failures)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use proptest::prelude::*;

    fn breaker(threshold: u32, reset_secs: u64) -> (CircuitBreaker, ManualClock) {
        let clock = ManualClock::starting_now();
        let config = CircuitBreakerConfig {
            failure_threshold: threshold,
            reset_timeout: Duration::from_secs(reset_secs),
        };
        let cb = CircuitBreaker::with_clock("ai", config, Arc::new(clock.clone()));
        (cb, clock)
    }

    #[test]
    fn test_circuit_starts_closed() {
        let (cb, _) = breaker(3, 60);
        assert!(!cb.is_open());
        assert_eq!(cb.state(), CircuitState::Closed);
    }

    #[test]
    fn test_circuit_opens_at_threshold() {
        let (cb, _) = breaker(3, 60);

        cb.record_failure();
        cb.record_failure();
        assert!(!cb.is_open());

        cb.record_failure();
        assert!(cb.is_open());
        assert_eq!(cb.state(), CircuitState::Open);
    }

    #[test]
    fn test_success_resets_failures() {
        let (cb, _) = breaker(3, 60);

        cb.record_failure();
        cb.record_failure();
        cb.record_success();
        assert_eq!(cb.consecutive_failures(), 0);

        cb.record_failure();
        cb.record_failure();
        assert!(!cb.is_open());
    }

    #[test]
    fn test_open_until_reset_timeout() {
        let (cb, clock) = breaker(1, 60);
        cb.record_failure();

        clock.advance(Duration::from_secs(59));
        assert!(cb.is_open());

        clock.advance(Duration::from_secs(1));
        assert!(!cb.is_open());
        assert_eq!(cb.state(), CircuitState::HalfOpen);
    }

    #[test]
    fn test_half_open_admits_single_probe() {
        let (cb, clock) = breaker(1, 60);
        cb.record_failure();
        clock.advance(Duration::from_secs(60));

        assert!(!cb.is_open());
        assert!(cb.is_open(), "second caller must wait for the probe");

        // Probe never reports back; after another timeout a new probe is admitted.
        clock.advance(Duration::from_secs(60));
        assert!(!cb.is_open());
    }

    #[test]
    fn test_half_open_failure_reopens() {
        let (cb, clock) = breaker(5, 60);
        for _ in 0..5 {
            cb.record_failure();
        }
        clock.advance(Duration::from_secs(61));
        assert!(!cb.is_open());

        cb.record_failure();
        assert_eq!(cb.state(), CircuitState::Open);
        assert!(cb.is_open());
    }

    #[test]
    fn test_half_open_success_closes() {
        let (cb, clock) = breaker(2, 10);
        cb.record_failure();
        cb.record_failure();
        clock.advance(Duration::from_secs(10));
        assert!(!cb.is_open());

        cb.record_success();
        cb.record_success();
        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.consecutive_failures(), 0);
    }

    #[test]
    fn test_late_success_while_open_resets_count_only() {
        let (cb, clock) = breaker(2, 60);
        cb.record_failure();
        cb.record_failure();
        assert_eq!(cb.consecutive_failures(), 2);

        cb.record_success();
        assert_eq!(cb.consecutive_failures(), 0);
        assert_eq!(cb.state(), CircuitState::Open);
        assert!(cb.is_open());

        // the reset timeout still runs from the last failure
        clock.advance(Duration::from_secs(60));
        assert!(!cb.is_open());
        assert_eq!(cb.state(), CircuitState::HalfOpen);
    }

    #[test]
    fn test_state_is_read_only() {
        let (cb, clock) = breaker(1, 10);
        cb.record_failure();
        clock.advance(Duration::from_secs(30));

        // state() must not perform the Open -> HalfOpen transition
        assert_eq!(cb.state(), CircuitState::Open);
        assert_eq!(cb.snapshot().state, CircuitState::Open);
    }

    #[test]
    fn test_reset_and_update_config() {
        let (cb, _) = breaker(1, 10);
        cb.record_failure();
        assert!(cb.is_open());

        cb.reset();
        assert_eq!(cb.state(), CircuitState::Closed);

        cb.update_config(CircuitBreakerConfig {
            failure_threshold: 3,
            reset_timeout: Duration::from_secs(5),
        });
        cb.record_failure();
        cb.record_failure();
        assert!(!cb.is_open());
        assert_eq!(cb.snapshot().failure_threshold, 3);
    }

    #[test]
    fn test_config_parses_humantime() {
        let config: CircuitBreakerConfig =
            serde_json::from_str(r#"{"failure_threshold": 4, "reset_timeout": "2m"}"#).unwrap();
        assert_eq!(config.failure_threshold, 4);
        assert_eq!(config.reset_timeout, Duration::from_secs(120));
    }

    proptest! {
        #[test]
        fn prop_opens_iff_threshold_consecutive_failures(
            threshold in 1u32..8,
            outcomes in proptest::collection::vec(any::<bool>(), 0..40),
        ) {
            let (cb, _) = breaker(threshold, 3600);
            let mut run = 0u32;
            let mut opened = false;

            for success in outcomes {
                if opened {
                    break;
                }
                cb.record_outcome(success);
                run = if success { 0 } else { run + 1 };
                opened = run >= threshold;
                prop_assert_eq!(cb.state() == CircuitState::Open, opened);
            }
        }
    }
}
