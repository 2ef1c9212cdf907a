//! Named fixed-window rate limiters over a counter store.

use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

use genguard_core::{system_clock, Clock, FixedWindow, LimiterSpec, RateLimitResult};

use super::memory::MemoryCounterStore;
use super::store::{CounterSnapshot, CounterStore, StoreError};

/// Errors from the rate limiter.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RateLimitError {
    #[error("Unknown limiter: {0}")]
    UnknownLimiter(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Which store serves the limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendMode {
    /// Shared store; limits hold across instances
    Durable,

    /// Per-process fallback; limits are per instance
    InProcess,
}

/// Registry of named limiters.
///
/// Consumes go to the durable store when one was reachable at startup. If
/// it errors later, that consume is evaluated against the in-process store
/// instead of failing the request.
pub struct RateLimiter {
    specs: RwLock<HashMap<String, LimiterSpec>>,
    durable: Option<Arc<dyn CounterStore>>,
    fallback: Arc<MemoryCounterStore>,
    key_prefix: String,
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    /// A limiter backed only by the in-process store.
    pub fn in_process(key_prefix: impl Into<String>, clock: Arc<dyn Clock>) -> Self {
        Self {
            specs: RwLock::new(HashMap::new()),
            durable: None,
            fallback: Arc::new(MemoryCounterStore::with_clock(Arc::clone(&clock))),
            key_prefix: key_prefix.into(),
            clock,
        }
    }

    /// Probe `durable` once and pick the backend.
    ///
    /// An unreachable or missing durable store selects the in-process
    /// fallback; the degraded mode is logged here, once.
    pub async fn connect(
        durable: Option<Arc<dyn CounterStore>>,
        key_prefix: impl Into<String>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let mut limiter = Self::in_process(key_prefix, clock);

        match durable {
            Some(store) => match store.ping().await {
                Ok(()) => {
                    tracing::info!(store = store.name(), "Rate limiter using durable counter store");
                    limiter.durable = Some(store);
                }
                Err(e) => {
                    tracing::warn!(
                        store = store.name(),
                        error = %e,
                        "Durable counter store unreachable, rate limits are per instance"
                    );
                }
            },
            None => {
                tracing::warn!("No durable counter store configured, rate limits are per instance");
            }
        }

        limiter
    }

    pub fn with_specs(self, specs: impl IntoIterator<Item = LimiterSpec>) -> Self {
        for spec in specs {
            self.define(spec);
        }
        self
    }

    /// Register a limiter. The first definition of a name wins.
    pub fn define(&self, spec: LimiterSpec) -> bool {
        let mut specs = self.specs.write();
        if let Some(existing) = specs.get(&spec.name) {
            if *existing != spec {
                tracing::debug!(limiter = %spec.name, "Limiter already defined, keeping first definition");
            }
            return false;
        }
        specs.insert(spec.name.clone(), spec);
        true
    }

    pub fn spec(&self, limiter: &str) -> Option<LimiterSpec> {
        self.specs.read().get(limiter).cloned()
    }

    pub fn backend_mode(&self) -> BackendMode {
        if self.durable.is_some() {
            BackendMode::Durable
        } else {
            BackendMode::InProcess
        }
    }

    /// The store consumes go to.
    pub fn active_store(&self) -> Arc<dyn CounterStore> {
        match &self.durable {
            Some(store) => Arc::clone(store),
            None => self.fallback.clone() as Arc<dyn CounterStore>,
        }
    }

    pub fn fallback_store(&self) -> &Arc<MemoryCounterStore> {
        &self.fallback
    }

    /// Consume `points` for `key` against the named limiter.
    pub async fn consume(
        &self,
        limiter: &str,
        key: &str,
        points: u32,
    ) -> Result<RateLimitResult, RateLimitError> {
        let spec = self
            .spec(limiter)
            .ok_or_else(|| RateLimitError::UnknownLimiter(limiter.to_string()))?;
        self.consume_spec(&spec, key, points).await
    }

    /// Consume against `spec`, defining it first if needed.
    pub async fn consume_with(
        &self,
        spec: &LimiterSpec,
        key: &str,
        points: u32,
    ) -> Result<RateLimitResult, RateLimitError> {
        self.define(spec.clone());
        let spec = self.spec(&spec.name).unwrap_or_else(|| spec.clone());
        self.consume_spec(&spec, key, points).await
    }

    /// Current state without consuming.
    pub async fn peek(&self, limiter: &str, key: &str) -> Result<RateLimitResult, RateLimitError> {
        let spec = self
            .spec(limiter)
            .ok_or_else(|| RateLimitError::UnknownLimiter(limiter.to_string()))?;
        let storage_key = self.storage_key(limiter, key);

        let counter = match &self.durable {
            Some(store) => match store.get(&storage_key).await {
                Ok(counter) => counter,
                Err(e) => {
                    tracing::warn!(limiter, key, error = %e, "Durable store read failed, reading fallback");
                    self.fallback.get(&storage_key).await?
                }
            },
            None => self.fallback.get(&storage_key).await?,
        };

        Ok(match counter {
            Some(counter) => self.to_result(&spec, counter, true),
            None => FixedWindow::open(self.clock.now(), spec.window).result(true, spec.max_points),
        })
    }

    /// Forget the counter for `key` in both stores.
    pub async fn reset(&self, limiter: &str, key: &str) -> Result<(), RateLimitError> {
        let storage_key = self.storage_key(limiter, key);
        self.fallback.delete(&storage_key).await?;
        if let Some(store) = &self.durable {
            store.delete(&storage_key).await?;
        }
        tracing::info!(limiter, key, "Rate limit counter reset");
        Ok(())
    }

    fn storage_key(&self, limiter: &str, key: &str) -> String {
        format!("{}:{}:{}", self.key_prefix, limiter, key)
    }

    async fn consume_spec(
        &self,
        spec: &LimiterSpec,
        key: &str,
        points: u32,
    ) -> Result<RateLimitResult, RateLimitError> {
        let storage_key = self.storage_key(&spec.name, key);
        let limit = spec.max_points as u64;

        let outcome = match &self.durable {
            Some(store) => {
                match store
                    .try_consume(&storage_key, points as u64, limit, spec.window)
                    .await
                {
                    Ok(outcome) => outcome,
                    Err(e) => {
                        tracing::warn!(
                            limiter = %spec.name,
                            key,
                            error = %e,
                            "Durable store failed, evaluating against in-process store"
                        );
                        self.fallback
                            .try_consume(&storage_key, points as u64, limit, spec.window)
                            .await?
                    }
                }
            }
            None => {
                self.fallback
                    .try_consume(&storage_key, points as u64, limit, spec.window)
                    .await?
            }
        };

        let result = self.to_result(spec, outcome.counter, outcome.allowed);
        if !result.allowed {
            tracing::info!(
                limiter = %spec.name,
                key,
                retry_after_secs = result.retry_after(self.clock.now()).as_secs(),
                "Rate limit exceeded"
            );
        }
        Ok(result)
    }

    fn to_result(&self, spec: &LimiterSpec, counter: CounterSnapshot, allowed: bool) -> RateLimitResult {
        let window = match counter.expires_at {
            Some(reset_at) => FixedWindow {
                count: counter.value,
                reset_at,
            },
            None => FixedWindow {
                count: counter.value,
                ..FixedWindow::open(self.clock.now(), spec.window)
            },
        };
        window.result(allowed, spec.max_points)
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("limiters", &self.specs.read().keys().collect::<Vec<_>>())
            .field("backend", &self.backend_mode())
            .finish()
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::in_process("rl", system_clock())
    }
}
