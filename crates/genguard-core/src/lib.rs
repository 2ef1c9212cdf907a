//! # genguard-core
//!
//! Deterministic resilience and quality state for AI content generation.
//!
//! This crate answers, without doing any I/O:
//! - May we call the AI provider right now?
//! - Has this caller spent its window?
//! - Is generation degrading badly enough to page an operator?
//! - How should this flagged item be repaired, and may we still try?
//!
//! ## Key Guarantees
//!
//! 1. **Clock-injected**: every time check goes through [`Clock`]
//! 2. **Synchronous**: state updates never straddle an await
//! 3. **Values, not errors**: breaker checks, window results and alert
//!    decisions are plain values
//!
//! ## Example
//!
//! ```rust,ignore
//! use genguard_core::{CircuitBreaker, CircuitBreakerConfig};
//!
//! let breaker = CircuitBreaker::new("ai-provider", CircuitBreakerConfig::default());
//! if breaker.is_call_allowed() {
//!     match call_provider().await {
//!         Ok(_) => breaker.record_success(),
//!         Err(_) => breaker.record_failure(),
//!     }
//! }
//! ```

pub mod breaker;
pub mod clock;
pub mod duration;
pub mod health;
pub mod repair;
pub mod window;

// Re-export main types at crate root
pub use breaker::{BreakerSnapshot, CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use clock::{system_clock, Clock, ManualClock, SystemClock};
pub use health::{
    AiCallOutcome, Alert, AlertDecision, AlertKind, GenerationHealthMonitor, GenerationRecord,
    HealthMetrics, HealthMonitorConfig, QualityScoreEvent, Severity,
};
pub use repair::{
    extract_json, AgentIssue, Difficulty, ExtractError, FixContext, FixResult, GeneratedItem,
    IssueCode, ItemReport, ItemStatus, RepairBudget, RepairStrategy, MAX_REPAIR_ATTEMPTS,
};
pub use window::{
    consume_window, seconds_until_next_midnight, FixedWindow, LimiterSpec, RateLimitResult,
};
