//! Generation pipeline.
//!
//! One worksheet generation, end to end:
//! - Rate limit and daily quota for the user
//! - Breaker-guarded AI call, recorded in the health monitor
//! - Item extraction from the reply
//! - Quality check and bounded repair of flagged items
//! - Low-quality alert on the residual score
//!
//! Throttling is a normal outcome reported as [`PipelineError::RateLimited`]
//! or [`PipelineError::QuotaExceeded`]; defects that survive repair are kept
//! and reported in the output rather than failing the request.

use serde::Serialize;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use genguard_core::{
    extract_json, FixContext, GeneratedItem, ItemReport, QualityScoreEvent, RateLimitResult,
    RepairBudget,
};

use crate::agents::QualityChecker;
use crate::handle::Guardrails;
use crate::providers::{ChatMessage, LlmProvider, TokenUsage};
use crate::ratelimit::{DailyQuotaResult, RateLimitError};
use crate::repair::{ItemFixer, RepairOutcome};
use crate::resilience::{AiCallGuard, CallError};

/// Errors from the generation pipeline.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Rate limit '{limiter}' exceeded, retry after {retry_after:?}")]
    RateLimited {
        limiter: String,
        retry_after: Duration,
        result: RateLimitResult,
    },

    #[error("Daily quota exceeded")]
    QuotaExceeded(DailyQuotaResult),

    #[error("AI call failed: {0}")]
    Call(#[from] CallError),

    #[error("Malformed AI response: {0}")]
    MalformedResponse(String),

    #[error("Rate limiter error: {0}")]
    RateLimit(#[from] RateLimitError),

    #[error("Pipeline not configured: {0}")]
    NotConfigured(String),
}

impl PipelineError {
    /// Throttled rather than failed.
    pub fn is_throttled(&self) -> bool {
        matches!(
            self,
            PipelineError::RateLimited { .. } | PipelineError::QuotaExceeded(_)
        )
    }
}

/// One generation request.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    /// Rate-limit and quota key
    pub user_id: String,

    /// Prompt for the generation call
    pub messages: Vec<ChatMessage>,

    pub context: FixContext,

    /// Per-user daily cap; the configured limit when `None`
    pub daily_cap: Option<u64>,
}

impl GenerationRequest {
    pub fn new(user_id: impl Into<String>, messages: Vec<ChatMessage>, context: FixContext) -> Self {
        Self {
            user_id: user_id.into(),
            messages,
            context,
            daily_cap: None,
        }
    }

    pub fn with_daily_cap(mut self, cap: u64) -> Self {
        self.daily_cap = Some(cap);
        self
    }
}

/// Result of a generation.
#[derive(Debug, Clone, Serialize)]
pub struct GenerationOutput {
    /// Final items, repaired where possible
    pub items: Vec<GeneratedItem>,

    pub rate_limit: RateLimitResult,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub quota: Option<DailyQuotaResult>,

    /// Quality reports for the generated (unrepaired) items
    pub reports: Vec<ItemReport>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub repair: Option<RepairOutcome>,

    /// 0-10 share of items without open issues; `None` if not checked
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quality_score: Option<f64>,

    pub usage: TokenUsage,
}

/// Builder for [`GenerationPipeline`].
pub struct GenerationPipelineBuilder {
    guardrails: Arc<Guardrails>,
    provider: Option<Arc<dyn LlmProvider>>,
    checker: Option<Arc<dyn QualityChecker>>,
}

impl GenerationPipelineBuilder {
    pub fn provider(mut self, provider: Arc<dyn LlmProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    /// Without a checker, items are returned unchecked.
    pub fn checker(mut self, checker: Arc<dyn QualityChecker>) -> Self {
        self.checker = Some(checker);
        self
    }

    pub fn build(self) -> Result<GenerationPipeline, PipelineError> {
        let provider = self
            .provider
            .ok_or_else(|| PipelineError::NotConfigured("no AI provider".to_string()))?;

        let config = self.guardrails.config();
        let guard = Arc::new(self.guardrails.guard(provider));
        let fixer = ItemFixer::from_config(Arc::clone(&guard), &config.completion, &config.repair);

        Ok(GenerationPipeline {
            guardrails: self.guardrails,
            guard,
            fixer,
            checker: self.checker,
        })
    }
}

/// Runs generations through the guardrails.
pub struct GenerationPipeline {
    guardrails: Arc<Guardrails>,
    guard: Arc<AiCallGuard>,
    fixer: ItemFixer,
    checker: Option<Arc<dyn QualityChecker>>,
}

impl GenerationPipeline {
    pub fn builder(guardrails: Arc<Guardrails>) -> GenerationPipelineBuilder {
        GenerationPipelineBuilder {
            guardrails,
            provider: None,
            checker: None,
        }
    }

    pub fn guardrails(&self) -> &Arc<Guardrails> {
        &self.guardrails
    }

    pub fn fixer(&self) -> &ItemFixer {
        &self.fixer
    }

    /// Generate, check and repair one worksheet.
    pub async fn generate(&self, request: GenerationRequest) -> Result<GenerationOutput, PipelineError> {
        let config = self.guardrails.config();
        let user = request.user_id.as_str();

        let rate_limit = self.guardrails.consume(&config.pipeline.limiter, user).await?;
        if !rate_limit.allowed {
            let retry_after = rate_limit.retry_after(self.guardrails.clock().now());
            tracing::info!(
                limiter = %config.pipeline.limiter,
                key = user,
                retry_after_secs = retry_after.as_secs(),
                "Generation throttled"
            );
            return Err(PipelineError::RateLimited {
                limiter: config.pipeline.limiter.clone(),
                retry_after,
                result: rate_limit,
            });
        }

        let quota = if config.pipeline.enforce_daily_quota {
            let cap = request.daily_cap.unwrap_or(config.daily_quota.daily_limit);
            let quota = self.guardrails.check_daily_quota(user, cap).await;
            if !quota.allowed {
                return Err(PipelineError::QuotaExceeded(quota));
            }
            Some(quota)
        } else {
            None
        };

        let health = self.guardrails.health();
        let response = match self.guard.call(request.messages, &config.completion).await {
            Ok(response) => response,
            Err(e) => {
                health.record_generation_outcome(false);
                return Err(e.into());
            }
        };

        let items = match parse_items(&response.content) {
            Ok(items) => items,
            Err(e) => {
                tracing::warn!(key = user, error = %e, "Generation reply has no usable items");
                health.record_generation_outcome(false);
                return Err(PipelineError::MalformedResponse(e));
            }
        };
        health.record_generation_outcome(true);

        let Some(checker) = &self.checker else {
            return Ok(GenerationOutput {
                items,
                rate_limit,
                quota,
                reports: Vec::new(),
                repair: None,
                quality_score: None,
                usage: response.usage,
            });
        };

        let ctx = &request.context;
        let reports = match checker.check(&items, ctx).await {
            Ok(reports) => reports,
            Err(e) => {
                tracing::warn!(checker = checker.name(), error = %e, "Quality check failed, returning items unchecked");
                return Ok(GenerationOutput {
                    items,
                    rate_limit,
                    quota,
                    reports: Vec::new(),
                    repair: None,
                    quality_score: None,
                    usage: response.usage,
                });
            }
        };

        let (final_items, repair, open_items) = if reports.iter().any(ItemReport::needs_fix_status) {
            let budget = RepairBudget::with_cap(config.repair.max_attempts);
            let outcome = self.fixer.repair_all(&items, &reports, ctx, &budget).await;
            let open: HashSet<usize> = outcome.unresolved.iter().map(|(index, _)| *index).collect();
            tracing::info!(
                fixed = outcome.fixed_count(),
                unresolved = outcome.unresolved.len(),
                budget_used = budget.used(),
                "Repair pass finished"
            );
            (outcome.items.clone(), Some(outcome), open.len())
        } else {
            (items, None, 0)
        };

        let score = residual_score(final_items.len(), open_items);
        health.check_low_quality_score(&QualityScoreEvent {
            score,
            topic: ctx.topic.clone().unwrap_or_default(),
            subject: ctx.subject.clone(),
            grade: ctx.grade,
        });

        Ok(GenerationOutput {
            items: final_items,
            rate_limit,
            quota,
            reports,
            repair,
            quality_score: Some(score),
            usage: response.usage,
        })
    }
}

impl std::fmt::Debug for GenerationPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenerationPipeline")
            .field("guard", &self.guard)
            .field("checker", &self.checker.as_ref().map(|c| c.name().to_string()))
            .finish()
    }
}

/// Items from a generation reply: a JSON array or `{"items": [...]}`.
///
/// A bare top-level array is taken as-is; anything else goes through
/// [`extract_json`].
fn parse_items(content: &str) -> Result<Vec<GeneratedItem>, String> {
    let value = match serde_json::from_str::<Value>(content.trim()) {
        Ok(value) => value,
        Err(_) => extract_json(content).map_err(|e| e.to_string())?,
    };
    let array = match value {
        Value::Array(items) => items,
        Value::Object(mut object) => match object.remove("items") {
            Some(Value::Array(items)) => items,
            _ => return Err("expected an \"items\" array".to_string()),
        },
        _ => return Err("expected a JSON array or object".to_string()),
    };

    if array.is_empty() {
        return Err("reply contains no items".to_string());
    }

    array
        .into_iter()
        .enumerate()
        .map(|(index, value)| {
            GeneratedItem::from_value(value).map_err(|e| format!("item {}: {}", index, e))
        })
        .collect()
}

/// Score on the 0-10 scale: the share of items without open issues.
fn residual_score(total: usize, open: usize) -> f64 {
    if total == 0 {
        return 10.0;
    }
    let clean = total.saturating_sub(open);
    ((clean as f64 / total as f64) * 100.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_items_shapes() {
        let array = parse_items(r#"[{"type": "open", "question": "?"}]"#).unwrap();
        assert_eq!(array.len(), 1);

        let wrapped = parse_items("```json\n{\"items\": [{\"type\": \"a\"}, {\"type\": \"b\"}]}\n```").unwrap();
        assert_eq!(wrapped[1].kind, "b");

        assert!(parse_items(r#"{"title": "no items"}"#).is_err());
        assert!(parse_items("[]").is_err());
        assert!(parse_items(r#"[{"question": "untyped"}]"#).unwrap_err().starts_with("item 0"));
    }

    #[test]
    fn test_residual_score() {
        assert_eq!(residual_score(10, 0), 10.0);
        assert_eq!(residual_score(10, 3), 7.0);
        assert_eq!(residual_score(3, 1), 6.7);
        assert_eq!(residual_score(0, 0), 10.0);
    }
}
