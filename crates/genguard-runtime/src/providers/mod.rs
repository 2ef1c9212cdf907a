//! AI provider abstractions for genguard-runtime.
//!
//! The generation pipeline and the item fixer only ever talk to an
//! [`LlmProvider`]. An OpenAI-compatible HTTP provider ships behind the
//! `openai` feature; tests plug in scripted providers.
//!
//! ## Security
//!
//! Providers hold their API key in an [`ApiCredential`], which redacts
//! itself in `Debug` and `Display`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

pub mod secrets;

#[cfg(feature = "openai")]
mod openai;

pub use secrets::{ApiCredential, CredentialSource};

#[cfg(feature = "openai")]
pub use openai::{OpenAiProvider, OPENAI_API_KEY_ENV};

/// Errors from AI providers.
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("HTTP request failed: {0}")]
    HttpError(String),

    #[error("Rate limit exceeded, retry after {retry_after:?}")]
    RateLimited { retry_after: Option<Duration> },

    #[error("API error: {status} - {message}")]
    ApiError { status: u16, message: String },

    #[error("JSON parse error: {0}")]
    ParseError(String),

    #[error("Authentication failed")]
    AuthError,

    #[error("Timeout after {0:?}")]
    Timeout(Duration),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),
}

impl ProviderError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, ProviderError::Timeout(_))
    }
}

/// Configuration for a completion request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompletionConfig {
    /// Model to use
    pub model: String,

    /// Maximum tokens to generate
    pub max_tokens: u32,

    pub temperature: f32,

    /// Upper bound on one call, enforced by the call guard
    #[serde(with = "genguard_core::duration")]
    pub timeout: Duration,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
            max_tokens: 2000,
            temperature: 0.3,
            timeout: Duration::from_secs(30),
        }
    }
}

impl CompletionConfig {
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }
}

/// A chat message for completion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Role: "system", "user", or "assistant"
    pub role: String,

    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

/// Response from a completion.
#[derive(Debug, Clone)]
pub struct CompletionResponse {
    /// Generated content
    pub content: String,

    pub usage: TokenUsage,

    /// Model that answered
    pub model: String,

    pub stop_reason: Option<String>,
}

/// Token usage from a completion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

impl TokenUsage {
    /// Total tokens used.
    pub fn total(&self) -> u32 {
        self.prompt_tokens + self.completion_tokens
    }
}

/// Provider abstraction allows swapping AI backends.
///
/// Implementations only perform the call. Breaker checks, timeouts and
/// outcome bookkeeping belong to [`AiCallGuard`](crate::resilience::AiCallGuard).
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Execute a chat completion.
    async fn complete(
        &self,
        messages: Vec<ChatMessage>,
        config: &CompletionConfig,
    ) -> Result<CompletionResponse, ProviderError>;

    /// Check if provider is usable.
    async fn health_check(&self) -> bool;

    /// Provider name for logs.
    fn name(&self) -> &str;
}
