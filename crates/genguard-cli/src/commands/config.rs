//! `genguard validate-config`

use anyhow::{bail, Result};
use std::path::PathBuf;

use super::load_config;

pub fn validate(file: Option<PathBuf>, format: &str) -> Result<()> {
    let Some(file) = file else {
        bail!("No config file given (pass a path or --config)");
    };
    let mut config = load_config(Some(file.clone()))?;

    if format == "json" {
        let redacted = || "[REDACTED]".to_string();
        config.provider.api_key = config.provider.api_key.map(|_| redacted());
        config.notifier.auth_token = config.notifier.auth_token.map(|_| redacted());
        println!("{}", serde_json::to_string_pretty(&config)?);
        return Ok(());
    }

    println!("Config OK: {}", file.display());
    println!();
    println!(
        "   Circuit breaker: opens after {} failures, probes after {}s",
        config.circuit_breaker.failure_threshold,
        config.circuit_breaker.reset_timeout.as_secs()
    );
    for spec in &config.rate_limits {
        let marker = if spec.name == config.pipeline.limiter { " (pipeline)" } else { "" };
        println!(
            "   Limiter {}: {} per {}s{}",
            spec.name,
            spec.max_points,
            spec.window.as_secs(),
            marker
        );
    }
    println!(
        "   Daily quota: {} per user, UTC{:+}min, enforced={}",
        config.daily_quota.daily_limit,
        config.daily_quota.utc_offset_minutes,
        config.pipeline.enforce_daily_quota
    );
    println!(
        "   Health: failure rate > {:.0}% over {}s (min {} samples), {} consecutive timeouts",
        config.health.failure_rate_threshold * 100.0,
        config.health.window.as_secs(),
        config.health.min_samples,
        config.health.timeout_threshold
    );
    println!("   Repair: {} attempts per generation", config.repair.max_attempts);
    if config.notifier.webhook_urls.is_empty() {
        println!("   Alerts: log only");
    } else {
        println!("   Alerts: {} webhook(s)", config.notifier.webhook_urls.len());
    }

    Ok(())
}
