//! Alert evaluation plus fire-and-forget delivery.
//!
//! [`HealthService`] feeds outcomes to the [`GenerationHealthMonitor`] and
//! hands every fired alert to a spawned task. The caller never waits on the
//! notification channel and never sees its failures.

use backon::{ExponentialBuilder, Retryable};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

use genguard_core::{
    AiCallOutcome, Alert, AlertDecision, GenerationHealthMonitor, HealthMetrics, QualityScoreEvent,
};

use super::notifier::{NotifyError, NotifyReport, OperatorNotifier};
use crate::config::NotifierConfig;

/// Retry policy for deliveries that reach nobody.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryRetry {
    pub max_retries: usize,
    pub min_delay: Duration,
}

impl Default for DeliveryRetry {
    fn default() -> Self {
        Self {
            max_retries: 2,
            min_delay: Duration::from_secs(1),
        }
    }
}

impl From<&NotifierConfig> for DeliveryRetry {
    fn from(config: &NotifierConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            min_delay: config.retry_min_delay,
        }
    }
}

/// An evaluated alert condition and, if it fired, its delivery task.
#[derive(Debug)]
pub struct Dispatched {
    pub decision: AlertDecision,

    /// Await only in tests or shutdown paths
    pub delivery: Option<JoinHandle<NotifyReport>>,
}

impl Dispatched {
    pub fn fired(&self) -> bool {
        self.decision.is_fire()
    }
}

/// Health monitor plus operator notification.
pub struct HealthService {
    monitor: Arc<GenerationHealthMonitor>,
    notifier: Arc<dyn OperatorNotifier>,
    retry: DeliveryRetry,
}

impl HealthService {
    pub fn new(monitor: Arc<GenerationHealthMonitor>, notifier: Arc<dyn OperatorNotifier>) -> Self {
        Self {
            monitor,
            notifier,
            retry: DeliveryRetry::default(),
        }
    }

    pub fn with_retry(mut self, retry: DeliveryRetry) -> Self {
        self.retry = retry;
        self
    }

    pub fn monitor(&self) -> &Arc<GenerationHealthMonitor> {
        &self.monitor
    }

    pub fn metrics(&self) -> HealthMetrics {
        self.monitor.metrics()
    }

    pub fn record_generation_outcome(&self, success: bool) -> Dispatched {
        self.dispatch(self.monitor.record_generation_outcome(success))
    }

    pub fn record_ai_call_outcome(&self, outcome: AiCallOutcome) -> Dispatched {
        self.dispatch(self.monitor.record_ai_call_outcome(outcome))
    }

    pub fn check_error_rate(&self) -> Dispatched {
        self.dispatch(self.monitor.check_error_rate())
    }

    pub fn check_low_quality_score(&self, event: &QualityScoreEvent) -> Dispatched {
        self.dispatch(self.monitor.check_low_quality_score(event))
    }

    /// Spawn delivery for a fired decision.
    ///
    /// Outside a tokio runtime the alert is logged and not delivered.
    pub fn dispatch(&self, decision: AlertDecision) -> Dispatched {
        let AlertDecision::Fire(alert) = &decision else {
            return Dispatched {
                decision,
                delivery: None,
            };
        };

        let delivery = match tokio::runtime::Handle::try_current() {
            Ok(handle) => Some(handle.spawn(deliver(
                Arc::clone(&self.notifier),
                alert.clone(),
                self.retry,
            ))),
            Err(_) => {
                tracing::error!(
                    kind = %alert.kind,
                    severity = %alert.severity,
                    message = %alert.message,
                    "No async runtime, alert not delivered"
                );
                None
            }
        };

        Dispatched { decision, delivery }
    }
}

impl std::fmt::Debug for HealthService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HealthService")
            .field("notifier", &self.notifier.name())
            .field("retry", &self.retry)
            .finish()
    }
}

/// Deliver `alert`, retrying while nobody is reached.
async fn deliver(
    notifier: Arc<dyn OperatorNotifier>,
    alert: Alert,
    retry: DeliveryRetry,
) -> NotifyReport {
    let notifier = notifier.as_ref();
    let alert_ref = &alert;

    let attempt = || async move {
        let report = notifier
            .notify(&alert_ref.message, alert_ref.severity)
            .await?;
        if report.reached_nobody() {
            return Err(NotifyError::Undelivered {
                attempted: report.attempted,
            });
        }
        Ok(report)
    };

    let result = attempt
        .retry(
            ExponentialBuilder::default()
                .with_min_delay(retry.min_delay)
                .with_max_times(retry.max_retries),
        )
        .when(|e| matches!(e, NotifyError::Undelivered { .. }))
        .notify(|e, delay| {
            tracing::warn!(
                kind = %alert_ref.kind,
                error = %e,
                retry_in_ms = delay.as_millis() as u64,
                "Alert delivery failed, retrying"
            );
        })
        .await;

    match result {
        Ok(report) => {
            tracing::info!(
                kind = %alert.kind,
                severity = %alert.severity,
                sent = report.sent_count,
                attempted = report.attempted,
                "Alert delivered"
            );
            report
        }
        Err(e) => {
            tracing::error!(kind = %alert.kind, error = %e, "Alert delivery gave up");
            match e {
                NotifyError::Undelivered { attempted } => NotifyReport::failed(attempted),
                NotifyError::Failed(_) => NotifyReport::failed(0),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use genguard_core::{AlertKind, HealthMonitorConfig, Severity};
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Records messages; fails the first `fail_first` deliveries.
    #[derive(Default)]
    struct RecordingNotifier {
        sent: Mutex<Vec<(String, Severity)>>,
        calls: AtomicUsize,
        fail_first: usize,
    }

    #[async_trait]
    impl OperatorNotifier for RecordingNotifier {
        async fn notify(&self, message: &str, severity: Severity) -> Result<NotifyReport, NotifyError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.fail_first {
                return Ok(NotifyReport::delivered(2, 0));
            }
            self.sent.lock().push((message.to_string(), severity));
            Ok(NotifyReport::delivered(2, 1))
        }

        fn name(&self) -> &str {
            "recording"
        }
    }

    fn service(notifier: Arc<RecordingNotifier>) -> HealthService {
        let monitor = Arc::new(GenerationHealthMonitor::new(HealthMonitorConfig::default()));
        HealthService::new(monitor, notifier).with_retry(DeliveryRetry {
            max_retries: 2,
            min_delay: Duration::from_millis(1),
        })
    }

    #[tokio::test]
    async fn test_repeat_timeout_alert_suppressed() {
        let notifier = Arc::new(RecordingNotifier::default());
        let service = service(notifier.clone());

        for _ in 0..3 {
            service.record_ai_call_outcome(AiCallOutcome::timeout());
        }
        let dispatched = service.record_ai_call_outcome(AiCallOutcome::timeout());
        // fourth timeout is inside the cooldown
        assert!(dispatched.decision.is_suppressed());
        assert!(dispatched.delivery.is_none());

        tokio::task::yield_now().await;
        let metrics = service.metrics();
        assert_eq!(metrics.consecutive_timeouts, 4);
        assert!(metrics.last_timeout_alert_at.is_some());
    }

    #[tokio::test]
    async fn test_delivery_report_and_payload() {
        let notifier = Arc::new(RecordingNotifier::default());
        let service = service(notifier.clone());
        service.monitor().set_consecutive_timeouts(2);

        let dispatched = service.record_ai_call_outcome(AiCallOutcome::timeout());
        assert!(dispatched.fired());
        let report = dispatched.delivery.unwrap().await.unwrap();

        assert!(report.success);
        let sent = notifier.sent.lock();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].1, Severity::Critical);
    }

    #[tokio::test]
    async fn test_delivery_retried_when_nobody_reached() {
        let notifier = Arc::new(RecordingNotifier {
            fail_first: 2,
            ..Default::default()
        });
        let service = service(notifier.clone());

        let event = QualityScoreEvent {
            score: 4.0,
            topic: "Fractions".to_string(),
            subject: "math".to_string(),
            grade: 5,
        };
        let dispatched = service.check_low_quality_score(&event);
        let report = dispatched.delivery.unwrap().await.unwrap();

        assert!(report.success);
        assert_eq!(notifier.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_delivery_gives_up_after_retries() {
        let notifier = Arc::new(RecordingNotifier {
            fail_first: usize::MAX,
            ..Default::default()
        });
        let service = service(notifier.clone());
        let alert = Alert::new(AlertKind::ErrorRate, "boom", chrono::Utc::now());

        let report = service
            .dispatch(AlertDecision::Fire(alert))
            .delivery
            .unwrap()
            .await
            .unwrap();

        assert!(!report.success);
        assert_eq!(report.attempted, 2);
        assert_eq!(notifier.calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_dispatch_without_runtime_logs_only() {
        let service = service(Arc::new(RecordingNotifier::default()));
        let alert = Alert::new(AlertKind::LowQuality, "low", chrono::Utc::now());
        let dispatched = service.dispatch(AlertDecision::Fire(alert));
        assert!(dispatched.fired());
        assert!(dispatched.delivery.is_none());
    }
}
