//! Runtime configuration.
//!
//! Loaded from YAML. Every section has defaults, so an empty document is a
//! valid configuration. Durations accept integer seconds or humantime
//! strings (`"30m"`, `"1h"`).
//!
//! ```yaml
//! circuit_breaker:
//!   failure_threshold: 5
//!   reset_timeout: 60s
//! rate_limits:
//!   - { name: generation, max_points: 20, window: 1h }
//! daily_quota:
//!   daily_limit: 30
//!   utc_offset_minutes: 180
//! notifier:
//!   webhook_urls: ["https://ops.example.com/hooks/genguard"]
//! ```

use chrono::{FixedOffset, Offset, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use genguard_core::{CircuitBreakerConfig, HealthMonitorConfig, LimiterSpec, MAX_REPAIR_ATTEMPTS};

use crate::providers::CompletionConfig;

/// Errors loading or validating configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("Config validation failed: {0}")]
    ValidationError(String),
}

/// Top-level runtime configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub circuit_breaker: CircuitBreakerConfig,

    /// Named fixed-window limiters
    pub rate_limits: Vec<LimiterSpec>,

    pub daily_quota: DailyQuotaConfig,

    pub health: HealthMonitorConfig,

    pub repair: RepairConfig,

    /// Settings for generation calls
    pub completion: CompletionConfig,

    pub provider: ProviderConfig,

    pub pipeline: PipelineConfig,

    pub notifier: NotifierConfig,

    pub store: StoreConfig,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            circuit_breaker: CircuitBreakerConfig::default(),
            rate_limits: vec![
                LimiterSpec::new("generation", 20, Duration::from_secs(3600)),
                LimiterSpec::new("api", 100, Duration::from_secs(60)),
            ],
            daily_quota: DailyQuotaConfig::default(),
            health: HealthMonitorConfig::default(),
            repair: RepairConfig::default(),
            completion: CompletionConfig::default(),
            provider: ProviderConfig::default(),
            pipeline: PipelineConfig::default(),
            notifier: NotifierConfig::default(),
            store: StoreConfig::default(),
        }
    }
}

impl RuntimeConfig {
    /// Parse and validate a YAML document.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config: RuntimeConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse and validate a YAML file.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    pub fn limiter(&self, name: &str) -> Option<&LimiterSpec> {
        self.rate_limits.iter().find(|spec| spec.name == name)
    }

    /// Semantic checks serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let cb = &self.circuit_breaker;
        ensure(cb.failure_threshold > 0, "circuit_breaker.failure_threshold must be > 0")?;
        ensure(!cb.reset_timeout.is_zero(), "circuit_breaker.reset_timeout must be > 0")?;

        self.validate_rate_limits()?;

        let quota = &self.daily_quota;
        ensure(quota.daily_limit > 0, "daily_quota.daily_limit must be > 0")?;
        ensure(
            quota.utc_offset_minutes.abs() < 24 * 60,
            "daily_quota.utc_offset_minutes must be within one day",
        )?;

        let health = &self.health;
        ensure(!health.window.is_zero(), "health.window must be > 0")?;
        ensure(health.max_records > 0, "health.max_records must be > 0")?;
        ensure(health.min_samples > 0, "health.min_samples must be > 0")?;
        ensure(
            health.failure_rate_threshold > 0.0 && health.failure_rate_threshold < 1.0,
            "health.failure_rate_threshold must be between 0 and 1",
        )?;
        ensure(health.timeout_threshold > 0, "health.timeout_threshold must be > 0")?;
        ensure(
            (0.0..=10.0).contains(&health.low_quality_threshold),
            "health.low_quality_threshold must be on the 0-10 scale",
        )?;

        ensure(self.repair.max_attempts > 0, "repair.max_attempts must be > 0")?;
        ensure(!self.completion.timeout.is_zero(), "completion.timeout must be > 0")?;
        ensure(!self.store.sweep_interval.is_zero(), "store.sweep_interval must be > 0")?;

        if self.limiter(&self.pipeline.limiter).is_none() {
            return Err(ConfigError::ValidationError(format!(
                "pipeline.limiter '{}' is not defined in rate_limits",
                self.pipeline.limiter
            )));
        }

        for url in self.notifier.webhook_urls.iter().chain([&self.provider.base_url]) {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(ConfigError::ValidationError(format!(
                    "URL must start with http:// or https://: {}",
                    url
                )));
            }
        }

        Ok(())
    }

    fn validate_rate_limits(&self) -> Result<(), ConfigError> {
        let mut seen = HashSet::new();
        for spec in &self.rate_limits {
            ensure(!spec.name.is_empty(), "rate_limits entries need a name")?;
            if !seen.insert(spec.name.as_str()) {
                return Err(ConfigError::ValidationError(format!(
                    "Duplicate limiter name: {}",
                    spec.name
                )));
            }
            if spec.max_points == 0 || spec.window.is_zero() {
                return Err(ConfigError::ValidationError(format!(
                    "Limiter '{}' needs max_points > 0 and a non-zero window",
                    spec.name
                )));
            }
        }
        Ok(())
    }
}

fn ensure(condition: bool, message: &str) -> Result<(), ConfigError> {
    if condition {
        Ok(())
    } else {
        Err(ConfigError::ValidationError(message.to_string()))
    }
}

/// Per-user daily generation quota.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DailyQuotaConfig {
    /// Generations per user per local day
    pub daily_limit: u64,

    /// Offset of the reference timezone; the day rolls over at its midnight
    pub utc_offset_minutes: i32,

    pub key_prefix: String,
}

impl Default for DailyQuotaConfig {
    fn default() -> Self {
        Self {
            daily_limit: 30,
            utc_offset_minutes: 180,
            key_prefix: "quota:daily".to_string(),
        }
    }
}

impl DailyQuotaConfig {
    /// Reference timezone; UTC if the offset is out of range.
    pub fn offset(&self) -> FixedOffset {
        FixedOffset::east_opt(self.utc_offset_minutes.saturating_mul(60))
            .unwrap_or_else(|| Utc.fix())
    }
}

/// Repair loop settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RepairConfig {
    /// Repair attempts per generation run
    pub max_attempts: u32,

    pub cache_capacity: u64,

    #[serde(with = "genguard_core::duration")]
    pub cache_ttl: Duration,

    /// Sampling temperature for repair calls
    pub temperature: f32,
}

impl Default for RepairConfig {
    fn default() -> Self {
        Self {
            max_attempts: MAX_REPAIR_ATTEMPTS,
            cache_capacity: 1_000,
            cache_ttl: Duration::from_secs(3600),
            temperature: 0.2,
        }
    }
}

/// OpenAI-compatible endpoint settings.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub base_url: String,

    /// Inline key; prefer `api_key_env`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    pub api_key_env: String,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            api_key: None,
            api_key_env: "OPENAI_API_KEY".to_string(),
        }
    }
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("api_key_env", &self.api_key_env)
            .finish()
    }
}

/// Generation pipeline settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Limiter consulted before each generation
    pub limiter: String,

    pub enforce_daily_quota: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            limiter: "generation".to_string(),
            enforce_daily_quota: true,
        }
    }
}

/// Operator notification settings.
///
/// With no webhook URLs, alerts are only logged.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifierConfig {
    pub webhook_urls: Vec<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_token_env: Option<String>,

    /// `source` field of webhook payloads
    pub source: String,

    /// Retries when a delivery reaches nobody
    pub max_retries: usize,

    #[serde(with = "genguard_core::duration")]
    pub retry_min_delay: Duration,

    #[serde(with = "genguard_core::duration")]
    pub request_timeout: Duration,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            webhook_urls: Vec::new(),
            auth_token: None,
            auth_token_env: None,
            source: "genguard".to_string(),
            max_retries: 2,
            retry_min_delay: Duration::from_secs(1),
            request_timeout: Duration::from_secs(10),
        }
    }
}

impl std::fmt::Debug for NotifierConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotifierConfig")
            .field("webhook_urls", &self.webhook_urls)
            .field("auth_token", &self.auth_token.as_ref().map(|_| "[REDACTED]"))
            .field("auth_token_env", &self.auth_token_env)
            .field("source", &self.source)
            .field("max_retries", &self.max_retries)
            .finish_non_exhaustive()
    }
}

/// Counter store settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Prefix of rate-limit keys (`<prefix>:<limiter>:<key>`)
    pub key_prefix: String,

    /// How often the in-process store drops expired counters
    #[serde(with = "genguard_core::duration")]
    pub sweep_interval: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            key_prefix: "rl".to_string(),
            sweep_interval: Duration::from_secs(60),
        }
    }
}
