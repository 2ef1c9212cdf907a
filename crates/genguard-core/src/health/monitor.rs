//! Generation health monitor.
//!
//! Detects systemic AI degradation from three signals:
//! - failure ratio over a sliding window (cooldown-gated)
//! - consecutive AI call timeouts (cooldown-gated, separate clock)
//! - individual low quality scores (never gated)
//!
//! The monitor only decides. Delivering the resulting [`Alert`] is the
//! caller's job, so evaluation never waits on a notification channel.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use super::alert::{Alert, AlertDecision, AlertKind};
use super::cooldown::CooldownTracker;
use super::history::{GenerationHistory, GenerationRecord, WindowStats};
use crate::clock::{system_clock, to_chrono, Clock};

/// Monitor thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthMonitorConfig {
    /// Sliding window for the error-rate check
    #[serde(with = "crate::duration")]
    pub window: Duration,

    /// Hard cap on retained records
    pub max_records: usize,

    /// Fewer samples than this never fire an error-rate alert
    pub min_samples: usize,

    /// Failure ratio that must be exceeded (0.10 = 10%)
    pub failure_rate_threshold: f64,

    /// Consecutive timeouts that trigger an alert
    pub timeout_threshold: u32,

    #[serde(with = "crate::duration")]
    pub error_rate_cooldown: Duration,

    #[serde(with = "crate::duration")]
    pub timeout_cooldown: Duration,

    /// Scores strictly below this trigger a low-quality alert (0-10 scale)
    pub low_quality_threshold: f64,
}

impl Default for HealthMonitorConfig {
    fn default() -> Self {
        Self {
            window: Duration::from_secs(3600),
            max_records: 1000,
            min_samples: 5,
            failure_rate_threshold: 0.10,
            timeout_threshold: 3,
            error_rate_cooldown: Duration::from_secs(30 * 60),
            timeout_cooldown: Duration::from_secs(30 * 60),
            low_quality_threshold: 8.0,
        }
    }
}

/// Outcome of a single AI call as classified by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AiCallOutcome {
    pub success: bool,
    pub is_timeout: bool,
}

impl AiCallOutcome {
    pub fn success() -> Self {
        Self {
            success: true,
            is_timeout: false,
        }
    }

    pub fn failure() -> Self {
        Self {
            success: false,
            is_timeout: false,
        }
    }

    pub fn timeout() -> Self {
        Self {
            success: false,
            is_timeout: true,
        }
    }
}

/// A quality score for one generated piece of content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityScoreEvent {
    /// Score on a 0-10 scale
    pub score: f64,
    pub topic: String,
    pub subject: String,
    pub grade: u8,
}

/// Introspection view of the monitor.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthMetrics {
    pub window_total: usize,
    pub window_failed: usize,
    pub failure_rate: f64,
    pub consecutive_timeouts: u32,
    pub last_error_rate_alert_at: Option<DateTime<Utc>>,
    pub last_timeout_alert_at: Option<DateTime<Utc>>,
    pub low_quality_alerts: u64,
    pub suppressed_alerts: u64,
}

#[derive(Debug)]
struct MonitorState {
    history: GenerationHistory,
    consecutive_timeouts: u32,
    cooldowns: CooldownTracker,
    low_quality_alerts: u64,
    suppressed_alerts: u64,
}

impl MonitorState {
    fn new(config: &HealthMonitorConfig) -> Self {
        Self {
            history: GenerationHistory::new(config.max_records, to_chrono(config.window)),
            consecutive_timeouts: 0,
            cooldowns: CooldownTracker::new()
                .with_period(AlertKind::ErrorRate, config.error_rate_cooldown)
                .with_period(AlertKind::ConsecutiveTimeouts, config.timeout_cooldown),
            low_quality_alerts: 0,
            suppressed_alerts: 0,
        }
    }
}

/// Process-wide health monitor for AI generation.
pub struct GenerationHealthMonitor {
    config: HealthMonitorConfig,
    state: Mutex<MonitorState>,
    clock: Arc<dyn Clock>,
}

impl GenerationHealthMonitor {
    pub fn new(config: HealthMonitorConfig) -> Self {
        Self::with_clock(config, system_clock())
    }

    pub fn with_clock(config: HealthMonitorConfig, clock: Arc<dyn Clock>) -> Self {
        let state = Mutex::new(MonitorState::new(&config));
        Self {
            config,
            state,
            clock,
        }
    }

    pub fn config(&self) -> &HealthMonitorConfig {
        &self.config
    }

    /// Record a finished generation and evaluate the error-rate alert.
    pub fn record_generation_outcome(&self, success: bool) -> AlertDecision {
        let now = self.clock.now();
        let mut state = self.state.lock();
        state.history.push(GenerationRecord::new(now, success));
        self.evaluate_error_rate(&mut state, now)
    }

    /// Evaluate the error-rate alert without recording anything.
    pub fn check_error_rate(&self) -> AlertDecision {
        let now = self.clock.now();
        let mut state = self.state.lock();
        self.evaluate_error_rate(&mut state, now)
    }

    /// Record an AI call outcome and evaluate the consecutive-timeout alert.
    ///
    /// A timeout increments the counter; a non-timeout success resets it; a
    /// non-timeout failure leaves it unchanged.
    pub fn record_ai_call_outcome(&self, outcome: AiCallOutcome) -> AlertDecision {
        let now = self.clock.now();
        let mut state = self.state.lock();

        if outcome.is_timeout {
            state.consecutive_timeouts = state.consecutive_timeouts.saturating_add(1);
        } else if outcome.success {
            state.consecutive_timeouts = 0;
        }

        let count = state.consecutive_timeouts;
        if count < self.config.timeout_threshold {
            return AlertDecision::NotTriggered;
        }

        let message = format!(
            "AI provider timed out {} times in a row (threshold={})",
            count, self.config.timeout_threshold
        );
        self.gate(&mut state, AlertKind::ConsecutiveTimeouts, message, now)
    }

    /// Evaluate the low-quality alert for one score. Never cooldown-gated.
    pub fn check_low_quality_score(&self, event: &QualityScoreEvent) -> AlertDecision {
        if !(event.score < self.config.low_quality_threshold) {
            return AlertDecision::NotTriggered;
        }

        let now = self.clock.now();
        let mut state = self.state.lock();
        state.low_quality_alerts += 1;

        let message = format!(
            "Low quality score {}/10 for topic \"{}\" (subject={}, grade={})",
            format_score(event.score),
            event.topic,
            event.subject,
            event.grade
        );
        AlertDecision::Fire(Alert::new(AlertKind::LowQuality, message, now))
    }

    /// Current metrics, after pruning stale history.
    pub fn metrics(&self) -> HealthMetrics {
        let now = self.clock.now();
        let mut state = self.state.lock();
        state.history.prune(now);
        let stats = state.history.stats();

        HealthMetrics {
            window_total: stats.total,
            window_failed: stats.failed,
            failure_rate: stats.failure_rate(),
            consecutive_timeouts: state.consecutive_timeouts,
            last_error_rate_alert_at: state.cooldowns.last_fired(AlertKind::ErrorRate),
            last_timeout_alert_at: state.cooldowns.last_fired(AlertKind::ConsecutiveTimeouts),
            low_quality_alerts: state.low_quality_alerts,
            suppressed_alerts: state.suppressed_alerts,
        }
    }

    // Test and admin hooks. Each touches only its own piece of state.

    /// Merge synthetic records into the history by timestamp. Does not
    /// evaluate alerts.
    pub fn inject_history(&self, records: impl IntoIterator<Item = GenerationRecord>) {
        let mut state = self.state.lock();
        for record in records {
            state.history.insert_ordered(record);
        }
    }

    /// Force the consecutive-timeout counter.
    pub fn set_consecutive_timeouts(&self, count: u32) {
        self.state.lock().consecutive_timeouts = count;
    }

    /// Clear history, counters and cooldowns.
    pub fn reset(&self) {
        *self.state.lock() = MonitorState::new(&self.config);
    }

    /// Clear only the cooldown clocks.
    pub fn reset_cooldowns(&self) {
        self.state.lock().cooldowns.clear();
    }

    fn evaluate_error_rate(&self, state: &mut MonitorState, now: DateTime<Utc>) -> AlertDecision {
        state.history.prune(now);
        let stats = state.history.stats();

        if !self.error_rate_exceeded(&stats) {
            return AlertDecision::NotTriggered;
        }

        let message = format!(
            "High AI generation failure rate: {:.1}% over the last {} (total={}, failed={})",
            stats.failure_rate() * 100.0,
            humantime::format_duration(self.config.window),
            stats.total,
            stats.failed
        );
        self.gate(state, AlertKind::ErrorRate, message, now)
    }

    fn error_rate_exceeded(&self, stats: &WindowStats) -> bool {
        stats.total >= self.config.min_samples
            && stats.failure_rate() > self.config.failure_rate_threshold
    }

    fn gate(
        &self,
        state: &mut MonitorState,
        kind: AlertKind,
        message: String,
        now: DateTime<Utc>,
    ) -> AlertDecision {
        if let Some(remaining) = state.cooldowns.remaining(kind, now) {
            state.suppressed_alerts += 1;
            tracing::info!(
                kind = %kind,
                remaining_secs = remaining.as_secs(),
                "Alert suppressed by cooldown"
            );
            return AlertDecision::Suppressed { kind, remaining };
        }

        state.cooldowns.mark_fired(kind, now);
        tracing::warn!(kind = %kind, message = %message, "Alert condition met");
        AlertDecision::Fire(Alert::new(kind, message, now))
    }
}

impl std::fmt::Debug for GenerationHealthMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenerationHealthMonitor")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

fn format_score(score: f64) -> String {
    if score.fract() == 0.0 {
        format!("{:.0}", score)
    } else {
        format!("{:.1}", score)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::health::Severity;

    fn monitor() -> (GenerationHealthMonitor, ManualClock) {
        let clock = ManualClock::starting_now();
        let monitor =
            GenerationHealthMonitor::with_clock(HealthMonitorConfig::default(), Arc::new(clock.clone()));
        (monitor, clock)
    }

    fn history(now: DateTime<Utc>, total: usize, failed: usize) -> Vec<GenerationRecord> {
        (0..total)
            .map(|i| {
                let at = now - chrono::Duration::minutes((total - i) as i64);
                GenerationRecord::new(at, i >= failed)
            })
            .collect()
    }

    #[test]
    fn test_error_rate_fires_with_counts() {
        let (monitor, clock) = monitor();
        monitor.inject_history(history(clock.now(), 20, 3));

        match monitor.check_error_rate() {
            AlertDecision::Fire(alert) => {
                assert_eq!(alert.kind, AlertKind::ErrorRate);
                assert_eq!(alert.severity, Severity::Critical);
                assert!(alert.message.contains("total=20"));
                assert!(alert.message.contains("failed=3"));
            }
            other => panic!("expected fire, got {:?}", other),
        }
    }

    #[test]
    fn test_error_rate_needs_min_samples() {
        let (monitor, clock) = monitor();
        monitor.inject_history(history(clock.now(), 4, 4));
        assert_eq!(monitor.check_error_rate(), AlertDecision::NotTriggered);
    }

    #[test]
    fn test_error_rate_threshold_is_strict() {
        let (monitor, clock) = monitor();
        // exactly 10% must not fire
        monitor.inject_history(history(clock.now(), 10, 1));
        assert_eq!(monitor.check_error_rate(), AlertDecision::NotTriggered);
    }

    #[test]
    fn test_error_rate_fires_once_per_cooldown() {
        let (monitor, clock) = monitor();
        monitor.inject_history(history(clock.now(), 10, 5));

        assert!(monitor.check_error_rate().is_fire());
        let first_fired = monitor.metrics().last_error_rate_alert_at;

        for _ in 0..5 {
            clock.advance(Duration::from_secs(60));
            assert!(!monitor.record_generation_outcome(false).is_fire());
        }
        // suppression did not move the cooldown clock
        assert_eq!(monitor.metrics().last_error_rate_alert_at, first_fired);

        clock.advance(Duration::from_secs(25 * 60));
        assert!(monitor.record_generation_outcome(false).is_fire());
    }

    #[test]
    fn test_stale_records_are_evicted() {
        let (monitor, clock) = monitor();
        monitor.inject_history(history(clock.now(), 10, 10));
        clock.advance(Duration::from_secs(2 * 3600));

        assert_eq!(monitor.check_error_rate(), AlertDecision::NotTriggered);
        assert_eq!(monitor.metrics().window_total, 0);
    }

    #[test]
    fn test_injected_records_older_than_live_ones_still_expire() {
        let (monitor, clock) = monitor();
        monitor.record_generation_outcome(true);
        let injected_at = clock.now() - chrono::Duration::minutes(50);
        monitor.inject_history((0..10).map(|_| GenerationRecord::new(injected_at, false)));
        assert_eq!(monitor.metrics().window_failed, 10);

        clock.advance(Duration::from_secs(20 * 60));

        let metrics = monitor.metrics();
        assert_eq!(metrics.window_total, 1);
        assert_eq!(metrics.window_failed, 0);
        assert_eq!(monitor.check_error_rate(), AlertDecision::NotTriggered);
    }

    #[test]
    fn test_timeouts_fire_at_threshold() {
        let (monitor, _) = monitor();
        assert!(!monitor.record_ai_call_outcome(AiCallOutcome::timeout()).is_fire());
        assert!(!monitor.record_ai_call_outcome(AiCallOutcome::timeout()).is_fire());

        let decision = monitor.record_ai_call_outcome(AiCallOutcome::timeout());
        let alert = decision.into_alert().expect("third timeout should alert");
        assert_eq!(alert.kind, AlertKind::ConsecutiveTimeouts);
        assert!(alert.message.contains("3 times"));
    }

    #[test]
    fn test_success_between_timeouts_prevents_alert() {
        let (monitor, _) = monitor();
        let outcomes = [
            AiCallOutcome::timeout(),
            AiCallOutcome::timeout(),
            AiCallOutcome::success(),
            AiCallOutcome::timeout(),
        ];
        for outcome in outcomes {
            assert!(!monitor.record_ai_call_outcome(outcome).is_fire());
        }
        assert_eq!(monitor.metrics().consecutive_timeouts, 1);
    }

    #[test]
    fn test_plain_failure_keeps_timeout_count() {
        let (monitor, _) = monitor();
        monitor.set_consecutive_timeouts(2);
        monitor.record_ai_call_outcome(AiCallOutcome::failure());
        assert_eq!(monitor.metrics().consecutive_timeouts, 2);
        assert!(monitor.record_ai_call_outcome(AiCallOutcome::timeout()).is_fire());
    }

    #[test]
    fn test_timeout_cooldown_independent_of_error_rate() {
        let (monitor, clock) = monitor();
        monitor.inject_history(history(clock.now(), 10, 5));
        assert!(monitor.check_error_rate().is_fire());

        monitor.set_consecutive_timeouts(5);
        assert!(monitor.record_ai_call_outcome(AiCallOutcome::timeout()).is_fire());
        assert!(monitor.record_ai_call_outcome(AiCallOutcome::timeout()).is_suppressed());
    }

    #[test]
    fn test_low_quality_never_suppressed() {
        let (monitor, clock) = monitor();
        monitor.inject_history(history(clock.now(), 10, 5));
        assert!(monitor.check_error_rate().is_fire());

        let event = QualityScoreEvent {
            score: 5.0,
            topic: "Деление с остатком".to_string(),
            subject: "math".to_string(),
            grade: 3,
        };
        for _ in 0..3 {
            let alert = monitor
                .check_low_quality_score(&event)
                .into_alert()
                .expect("low quality must always alert");
            assert_eq!(alert.severity, Severity::Warning);
            assert!(alert.message.contains('5'));
            assert!(alert.message.contains("Деление с остатком"));
        }
        assert_eq!(monitor.metrics().low_quality_alerts, 3);
    }

    #[test]
    fn test_low_quality_threshold() {
        let (monitor, _) = monitor();
        let mut event = QualityScoreEvent {
            score: 8.0,
            topic: "Fractions".to_string(),
            subject: "math".to_string(),
            grade: 5,
        };
        assert_eq!(monitor.check_low_quality_score(&event), AlertDecision::NotTriggered);

        event.score = 7.9;
        assert!(monitor.check_low_quality_score(&event).is_fire());
    }

    #[test]
    fn test_hooks_are_independent() {
        let (monitor, clock) = monitor();
        monitor.inject_history(history(clock.now(), 10, 5));
        assert!(monitor.check_error_rate().is_fire());
        monitor.set_consecutive_timeouts(7);

        monitor.reset_cooldowns();
        let metrics = monitor.metrics();
        assert_eq!(metrics.window_total, 10);
        assert_eq!(metrics.consecutive_timeouts, 7);
        assert!(metrics.last_error_rate_alert_at.is_none());
        assert!(monitor.check_error_rate().is_fire());

        monitor.reset();
        let metrics = monitor.metrics();
        assert_eq!(metrics.window_total, 0);
        assert_eq!(metrics.consecutive_timeouts, 0);
    }
}
