//! Generation health monitoring.

mod alert;
mod cooldown;
mod history;
mod monitor;

pub use alert::{Alert, AlertDecision, AlertKind, Severity};
pub use cooldown::CooldownTracker;
pub use history::{GenerationHistory, GenerationRecord, WindowStats};
pub use monitor::{
    AiCallOutcome, GenerationHealthMonitor, HealthMetrics, HealthMonitorConfig, QualityScoreEvent,
};
