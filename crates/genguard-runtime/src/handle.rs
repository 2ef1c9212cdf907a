//! Process-wide guardrail state.
//!
//! [`Guardrails`] owns the one breaker, health monitor, rate limiter and
//! daily quota of a process. Build it once at startup and pass it (usually
//! as `Arc<Guardrails>`) to request handlers; tests build a fresh one each.

use std::sync::Arc;
use tokio::task::JoinHandle;

use genguard_core::{system_clock, CircuitBreaker, Clock, GenerationHealthMonitor, RateLimitResult};

use crate::alerts::{notifier_from_config, DeliveryRetry, HealthService, OperatorNotifier};
use crate::config::{ConfigError, RuntimeConfig};
use crate::providers::LlmProvider;
use crate::ratelimit::{CounterStore, DailyQuota, DailyQuotaResult, RateLimitError, RateLimiter};
use crate::resilience::AiCallGuard;

/// Name of the breaker guarding the AI provider.
pub const AI_BREAKER: &str = "ai-provider";

/// The guardrails of one process.
pub struct Guardrails {
    config: RuntimeConfig,
    clock: Arc<dyn Clock>,
    breaker: Arc<CircuitBreaker>,
    health: Arc<HealthService>,
    rate_limiter: Arc<RateLimiter>,
    daily_quota: Arc<DailyQuota>,
}

impl Guardrails {
    /// Validate `config` and build every component.
    ///
    /// `durable` is probed once; without it (or if it is unreachable) rate
    /// limits and quotas are kept in process.
    pub async fn from_config(
        config: RuntimeConfig,
        durable: Option<Arc<dyn CounterStore>>,
        notifier: Arc<dyn OperatorNotifier>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        let breaker = Arc::new(CircuitBreaker::with_clock(
            AI_BREAKER,
            config.circuit_breaker.clone(),
            Arc::clone(&clock),
        ));

        let monitor = Arc::new(GenerationHealthMonitor::with_clock(
            config.health.clone(),
            Arc::clone(&clock),
        ));
        let health = Arc::new(
            HealthService::new(monitor, notifier).with_retry(DeliveryRetry::from(&config.notifier)),
        );

        let rate_limiter = Arc::new(
            RateLimiter::connect(durable, config.store.key_prefix.clone(), Arc::clone(&clock))
                .await
                .with_specs(config.rate_limits.iter().cloned()),
        );

        let daily_quota = Arc::new(DailyQuota::with_clock(
            rate_limiter.active_store(),
            &config.daily_quota,
            Arc::clone(&clock),
        ));

        tracing::info!(
            backend = ?rate_limiter.backend_mode(),
            limiters = config.rate_limits.len(),
            daily_limit = config.daily_quota.daily_limit,
            "Guardrails initialized"
        );

        Ok(Self {
            config,
            clock,
            breaker,
            health,
            rate_limiter,
            daily_quota,
        })
    }

    /// In-process counters, the configured notifier and the system clock.
    pub async fn in_process(config: RuntimeConfig) -> Result<Self, ConfigError> {
        let notifier = notifier_from_config(&config.notifier);
        Self::from_config(config, None, notifier, system_clock()).await
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    pub fn health(&self) -> &Arc<HealthService> {
        &self.health
    }

    pub fn rate_limiter(&self) -> &Arc<RateLimiter> {
        &self.rate_limiter
    }

    pub fn daily_quota(&self) -> &Arc<DailyQuota> {
        &self.daily_quota
    }

    /// Guard calls to `provider` with this process's breaker and monitor.
    pub fn guard(&self, provider: Arc<dyn LlmProvider>) -> AiCallGuard {
        AiCallGuard::new(provider, Arc::clone(&self.breaker), Arc::clone(&self.health))
    }

    /// Breaker check for callers that make their own AI calls.
    pub fn is_call_allowed(&self) -> bool {
        self.breaker.is_call_allowed()
    }

    /// Report the outcome of a call admitted by [`is_call_allowed`](Self::is_call_allowed).
    pub fn record_outcome(&self, success: bool) {
        self.breaker.record_outcome(success);
    }

    pub async fn consume(&self, limiter: &str, key: &str) -> Result<RateLimitResult, RateLimitError> {
        self.rate_limiter.consume(limiter, key, 1).await
    }

    pub async fn check_daily_quota(&self, user_id: &str, cap: u64) -> DailyQuotaResult {
        self.daily_quota.check_daily_quota(user_id, cap).await
    }

    /// Start background upkeep: sweeping expired in-process counters.
    ///
    /// The task stops by itself once the guardrails are dropped.
    pub fn spawn_maintenance(&self) -> JoinHandle<()> {
        self.rate_limiter
            .fallback_store()
            .spawn_sweeper(self.config.store.sweep_interval)
    }
}

impl std::fmt::Debug for Guardrails {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Guardrails")
            .field("breaker", &self.breaker.snapshot())
            .field("backend", &self.rate_limiter.backend_mode())
            .field("health", &self.health)
            .finish()
    }
}
