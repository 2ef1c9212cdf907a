//! # genguard-runtime
//!
//! Async guardrails around AI worksheet generation.
//!
//! `genguard-core` holds the deterministic state machines. This crate puts
//! them on the request path:
//!
//! - [`AiCallGuard`] wraps every provider call with the circuit breaker, a
//!   timeout and outcome bookkeeping
//! - [`RateLimiter`] and [`DailyQuota`] count against a [`CounterStore`],
//!   falling back to an in-process store
//! - [`HealthService`] evaluates alerts and delivers them in the background
//! - [`ItemFixer`] runs the bounded repair loop
//! - [`GenerationPipeline`] chains all of the above for one generation
//!
//! State that must exist once per process lives in [`Guardrails`].
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use genguard_runtime::{Guardrails, GenerationPipeline, GenerationRequest, RuntimeConfig};
//!
//! let config = RuntimeConfig::from_yaml_file("genguard.yaml")?;
//! let guardrails = Arc::new(Guardrails::in_process(config).await?);
//! let _sweeper = guardrails.spawn_maintenance();
//!
//! let pipeline = GenerationPipeline::builder(guardrails)
//!     .provider(provider)
//!     .checker(checker)
//!     .build()?;
//!
//! let output = pipeline.generate(GenerationRequest::new("user-42", messages, ctx)).await?;
//! ```
//!
//! ## Features
//!
//! - `openai`: OpenAI-compatible HTTP provider
//! - `webhook`: webhook operator notifier

pub mod agents;
pub mod alerts;
pub mod config;
pub mod handle;
pub mod orchestrator;
pub mod prompts;
pub mod providers;
pub mod ratelimit;
pub mod repair;
pub mod resilience;

pub use agents::{AgentError, QualityChecker};
pub use alerts::{
    notifier_from_config, DeliveryRetry, Dispatched, HealthService, LogNotifier, NotifyError,
    NotifyReport, OperatorNotifier,
};
#[cfg(feature = "webhook")]
pub use alerts::WebhookNotifier;
pub use config::{
    ConfigError, DailyQuotaConfig, NotifierConfig, PipelineConfig, ProviderConfig, RepairConfig,
    RuntimeConfig, StoreConfig,
};
pub use handle::{Guardrails, AI_BREAKER};
pub use orchestrator::{
    GenerationOutput, GenerationPipeline, GenerationPipelineBuilder, GenerationRequest,
    PipelineError,
};
pub use providers::{
    ApiCredential, ChatMessage, CompletionConfig, CompletionResponse, LlmProvider, ProviderError,
    TokenUsage,
};
#[cfg(feature = "openai")]
pub use providers::OpenAiProvider;
pub use ratelimit::{
    BackendMode, CounterSnapshot, CounterStore, DailyQuota, DailyQuotaResult, MemoryCounterStore,
    RateLimitError, RateLimiter, StoreError,
};
pub use repair::{ItemFixer, RepairCache, RepairOutcome};
pub use resilience::{AiCallGuard, CallError};

/// Re-export of the deterministic core.
pub use genguard_core as core;
