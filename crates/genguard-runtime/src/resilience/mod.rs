//! Resilience around the upstream AI dependency.
//!
//! The breaker state machine itself lives in `genguard-core`; this module
//! wraps provider calls with it.

mod guard;

pub use guard::{AiCallGuard, CallError};
