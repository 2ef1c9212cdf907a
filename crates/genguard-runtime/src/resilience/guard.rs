//! Guarded AI calls.
//!
//! Every upstream call goes through [`AiCallGuard::call`], which asks the
//! breaker first, bounds the call with a timeout, classifies the outcome and
//! feeds it to both the breaker and the health monitor. A timed-out call is
//! always recorded.

use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

use genguard_core::{AiCallOutcome, CircuitBreaker};

use crate::alerts::HealthService;
use crate::providers::{ChatMessage, CompletionConfig, CompletionResponse, LlmProvider, ProviderError};

/// Errors from a guarded call.
#[derive(Error, Debug)]
pub enum CallError {
    #[error("Circuit '{0}' is open, failing fast")]
    CircuitOpen(String),

    #[error("AI call timed out after {0:?}")]
    Timeout(Duration),

    #[error(transparent)]
    Provider(#[from] ProviderError),
}

impl CallError {
    pub fn is_timeout(&self) -> bool {
        match self {
            CallError::Timeout(_) => true,
            CallError::Provider(e) => e.is_timeout(),
            CallError::CircuitOpen(_) => false,
        }
    }

    /// The call never reached the provider.
    pub fn is_circuit_open(&self) -> bool {
        matches!(self, CallError::CircuitOpen(_))
    }
}

/// Breaker + timeout + outcome bookkeeping around one provider.
pub struct AiCallGuard {
    provider: Arc<dyn LlmProvider>,
    breaker: Arc<CircuitBreaker>,
    health: Arc<HealthService>,
}

impl AiCallGuard {
    pub fn new(
        provider: Arc<dyn LlmProvider>,
        breaker: Arc<CircuitBreaker>,
        health: Arc<HealthService>,
    ) -> Self {
        Self {
            provider,
            breaker,
            health,
        }
    }

    pub fn provider(&self) -> &Arc<dyn LlmProvider> {
        &self.provider
    }

    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    pub fn health(&self) -> &Arc<HealthService> {
        &self.health
    }

    /// Perform one completion under the breaker and `config.timeout`.
    ///
    /// A refused call records nothing.
    pub async fn call(
        &self,
        messages: Vec<ChatMessage>,
        config: &CompletionConfig,
    ) -> Result<CompletionResponse, CallError> {
        if self.breaker.is_open() {
            tracing::warn!(
                breaker = self.breaker.name(),
                provider = self.provider.name(),
                "AI call refused, circuit open"
            );
            return Err(CallError::CircuitOpen(self.breaker.name().to_string()));
        }

        let started = Instant::now();
        let result = match tokio::time::timeout(config.timeout, self.provider.complete(messages, config)).await
        {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(e)) => Err(CallError::Provider(e)),
            Err(_) => Err(CallError::Timeout(config.timeout)),
        };
        let elapsed_ms = started.elapsed().as_millis() as u64;

        let outcome = match &result {
            Ok(_) => AiCallOutcome::success(),
            Err(e) if e.is_timeout() => AiCallOutcome::timeout(),
            Err(_) => AiCallOutcome::failure(),
        };

        self.breaker.record_outcome(outcome.success);
        self.health.record_ai_call_outcome(outcome);

        match &result {
            Ok(response) => tracing::info!(
                provider = self.provider.name(),
                model = %response.model,
                elapsed_ms,
                tokens = response.usage.total(),
                "AI call succeeded"
            ),
            Err(e) => tracing::warn!(
                provider = self.provider.name(),
                elapsed_ms,
                timeout = outcome.is_timeout,
                state = %self.breaker.state(),
                error = %e,
                "AI call failed"
            ),
        }

        result
    }
}

impl std::fmt::Debug for AiCallGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AiCallGuard")
            .field("provider", &self.provider.name())
            .field("breaker", &self.breaker.name())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::LogNotifier;
    use crate::providers::TokenUsage;
    use async_trait::async_trait;
    use genguard_core::{
        CircuitBreakerConfig, CircuitState, GenerationHealthMonitor, HealthMonitorConfig,
        ManualClock,
    };
    use std::sync::atomic::{AtomicUsize, Ordering};

    enum Behaviour {
        Answer,
        Fail,
        Hang,
    }

    struct ScriptedProvider {
        behaviour: Behaviour,
        calls: AtomicUsize,
    }

    impl ScriptedProvider {
        fn new(behaviour: Behaviour) -> Arc<Self> {
            Arc::new(Self {
                behaviour,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl LlmProvider for ScriptedProvider {
        async fn complete(
            &self,
            _messages: Vec<ChatMessage>,
            config: &CompletionConfig,
        ) -> Result<CompletionResponse, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.behaviour {
                Behaviour::Answer => Ok(CompletionResponse {
                    content: "{}".to_string(),
                    usage: TokenUsage::default(),
                    model: config.model.clone(),
                    stop_reason: None,
                }),
                Behaviour::Fail => Err(ProviderError::ApiError {
                    status: 502,
                    message: "bad gateway".to_string(),
                }),
                Behaviour::Hang => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Err(ProviderError::HttpError("unreachable".to_string()))
                }
            }
        }

        async fn health_check(&self) -> bool {
            true
        }

        fn name(&self) -> &str {
            "scripted"
        }
    }

    fn guard(provider: Arc<ScriptedProvider>, threshold: u32) -> AiCallGuard {
        let clock = Arc::new(ManualClock::starting_now());
        let breaker = Arc::new(CircuitBreaker::with_clock(
            "ai",
            CircuitBreakerConfig {
                failure_threshold: threshold,
                reset_timeout: Duration::from_secs(60),
            },
            clock.clone(),
        ));
        let monitor = Arc::new(GenerationHealthMonitor::with_clock(
            HealthMonitorConfig::default(),
            clock,
        ));
        let health = Arc::new(HealthService::new(monitor, Arc::new(LogNotifier)));
        AiCallGuard::new(provider, breaker, health)
    }

    fn messages() -> Vec<ChatMessage> {
        vec![ChatMessage::user("make a worksheet")]
    }

    #[tokio::test]
    async fn test_success_recorded() {
        let guard = guard(ScriptedProvider::new(Behaviour::Answer), 2);
        let response = guard.call(messages(), &CompletionConfig::default()).await.unwrap();
        assert_eq!(response.content, "{}");
        assert_eq!(guard.breaker().state(), CircuitState::Closed);
        assert_eq!(guard.health().metrics().consecutive_timeouts, 0);
    }

    #[tokio::test]
    async fn test_failures_open_circuit_and_fail_fast() {
        let provider = ScriptedProvider::new(Behaviour::Fail);
        let guard = guard(provider.clone(), 2);
        let config = CompletionConfig::default();

        for _ in 0..2 {
            let err = guard.call(messages(), &config).await.unwrap_err();
            assert!(matches!(err, CallError::Provider(_)));
        }
        assert_eq!(guard.breaker().state(), CircuitState::Open);

        let err = guard.call(messages(), &config).await.unwrap_err();
        assert!(err.is_circuit_open());
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_recorded_as_failure_and_timeout() {
        let guard = guard(ScriptedProvider::new(Behaviour::Hang), 5);
        let config = CompletionConfig {
            timeout: Duration::from_secs(30),
            ..CompletionConfig::default()
        };

        let err = guard.call(messages(), &config).await.unwrap_err();

        assert!(err.is_timeout());
        assert_eq!(guard.breaker().consecutive_failures(), 1);
        assert_eq!(guard.health().metrics().consecutive_timeouts, 1);
    }
}
