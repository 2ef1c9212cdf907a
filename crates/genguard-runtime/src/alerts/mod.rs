//! Operator alerting: notification channels and fire-and-forget dispatch.

mod dispatch;
mod notifier;
#[cfg(feature = "webhook")]
mod webhook;

pub use dispatch::{DeliveryRetry, Dispatched, HealthService};
pub use notifier::{notifier_from_config, LogNotifier, NotifyError, NotifyReport, OperatorNotifier};
#[cfg(feature = "webhook")]
pub use webhook::WebhookNotifier;
