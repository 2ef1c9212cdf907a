//! Operator notification channels.

use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;

use genguard_core::Severity;

use crate::config::NotifierConfig;

/// Errors from a notifier.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NotifyError {
    #[error("No operator reached ({attempted} attempted)")]
    Undelivered { attempted: usize },

    #[error("Notifier failed: {0}")]
    Failed(String),
}

/// Delivery summary for one notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct NotifyReport {
    /// Recipients tried
    pub attempted: usize,

    /// Recipients reached
    pub sent_count: usize,

    pub success: bool,
}

impl NotifyReport {
    /// Partial delivery counts as success; so does having nobody to notify.
    pub fn delivered(attempted: usize, sent_count: usize) -> Self {
        Self {
            attempted,
            sent_count,
            success: sent_count > 0 || attempted == 0,
        }
    }

    pub fn failed(attempted: usize) -> Self {
        Self {
            attempted,
            sent_count: 0,
            success: false,
        }
    }

    /// Recipients existed but none was reached.
    pub fn reached_nobody(&self) -> bool {
        self.attempted > 0 && self.sent_count == 0
    }
}

/// "Notify all subscribed operators".
///
/// Individual recipients may fail; that is reported in the
/// [`NotifyReport`], not as an error.
#[async_trait]
pub trait OperatorNotifier: Send + Sync {
    async fn notify(&self, message: &str, severity: Severity) -> Result<NotifyReport, NotifyError>;

    fn name(&self) -> &str;
}

/// Writes alerts to the log only.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl OperatorNotifier for LogNotifier {
    async fn notify(&self, message: &str, severity: Severity) -> Result<NotifyReport, NotifyError> {
        match severity {
            Severity::Critical => tracing::error!(severity = %severity, "{}", message),
            Severity::Warning => tracing::warn!(severity = %severity, "{}", message),
        }
        Ok(NotifyReport::delivered(0, 0))
    }

    fn name(&self) -> &str {
        "log"
    }
}

/// Pick the notifier for `config`.
///
/// Without webhook URLs (or without the `webhook` feature) alerts are only
/// logged.
pub fn notifier_from_config(config: &NotifierConfig) -> Arc<dyn OperatorNotifier> {
    if config.webhook_urls.is_empty() {
        tracing::warn!("No operator notification channel configured, alerts will only be logged");
        return Arc::new(LogNotifier);
    }

    #[cfg(feature = "webhook")]
    {
        match super::WebhookNotifier::from_config(config) {
            Ok(notifier) => return Arc::new(notifier),
            Err(e) => {
                tracing::error!(error = %e, "Webhook notifier unavailable, alerts will only be logged");
            }
        }
    }

    #[cfg(not(feature = "webhook"))]
    tracing::warn!(
        recipients = config.webhook_urls.len(),
        "Webhook URLs configured but the 'webhook' feature is disabled, alerts will only be logged"
    );

    Arc::new(LogNotifier)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_semantics() {
        assert!(NotifyReport::delivered(0, 0).success);
        assert!(!NotifyReport::delivered(0, 0).reached_nobody());

        let partial = NotifyReport::delivered(3, 1);
        assert!(partial.success);
        assert!(!partial.reached_nobody());

        let none = NotifyReport::delivered(2, 0);
        assert!(!none.success);
        assert!(none.reached_nobody());
    }

    #[tokio::test]
    async fn test_log_notifier_always_succeeds() {
        let report = LogNotifier.notify("disk on fire", Severity::Critical).await.unwrap();
        assert!(report.success);
        assert_eq!(report.sent_count, 0);
    }

    #[test]
    fn test_no_urls_means_log_only() {
        let notifier = notifier_from_config(&NotifierConfig::default());
        assert_eq!(notifier.name(), "log");
    }
}
