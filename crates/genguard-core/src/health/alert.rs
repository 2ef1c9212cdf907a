//! Alert values produced by the health monitor.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Kind of operator alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    /// Failure ratio over the recent window is too high
    ErrorRate,

    /// Too many AI calls in a row timed out
    ConsecutiveTimeouts,

    /// A single generated item scored below the quality bar
    LowQuality,
}

impl AlertKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertKind::ErrorRate => "error_rate",
            AlertKind::ConsecutiveTimeouts => "consecutive_timeouts",
            AlertKind::LowQuality => "low_quality",
        }
    }

    /// Severity attached to notifications of this kind.
    pub fn severity(&self) -> Severity {
        match self {
            AlertKind::ErrorRate | AlertKind::ConsecutiveTimeouts => Severity::Critical,
            AlertKind::LowQuality => Severity::Warning,
        }
    }
}

impl std::fmt::Display for AlertKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Notification severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Critical,
    Warning,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Critical => write!(f, "critical"),
            Severity::Warning => write!(f, "warning"),
        }
    }
}

/// An alert ready to be sent to operators.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Alert {
    pub kind: AlertKind,
    pub severity: Severity,
    pub message: String,
    pub raised_at: DateTime<Utc>,
}

impl Alert {
    pub fn new(kind: AlertKind, message: impl Into<String>, raised_at: DateTime<Utc>) -> Self {
        Self {
            kind,
            severity: kind.severity(),
            message: message.into(),
            raised_at,
        }
    }
}

/// Result of evaluating one alert condition.
#[derive(Debug, Clone, PartialEq)]
pub enum AlertDecision {
    /// Condition holds and no cooldown blocks it
    Fire(Alert),

    /// Condition holds but the kind is cooling down
    Suppressed { kind: AlertKind, remaining: Duration },

    /// Condition does not hold
    NotTriggered,
}

impl AlertDecision {
    /// The alert to send, if any.
    pub fn into_alert(self) -> Option<Alert> {
        match self {
            AlertDecision::Fire(alert) => Some(alert),
            _ => None,
        }
    }

    pub fn is_fire(&self) -> bool {
        matches!(self, AlertDecision::Fire(_))
    }

    pub fn is_suppressed(&self) -> bool {
        matches!(self, AlertDecision::Suppressed { .. })
    }
}
