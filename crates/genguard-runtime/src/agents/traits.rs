//! Quality checker trait and common types.

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

use genguard_core::{FixContext, GeneratedItem, ItemReport};

/// Errors from quality-check agents.
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("LLM call failed: {0}")]
    LlmError(String),

    #[error("Timeout after {0:?}")]
    Timeout(Duration),

    #[error("Malformed quality report: {0}")]
    MalformedReport(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Reviews generated items and reports issues per item.
///
/// # Contract
/// - Returns at most one report per item, keyed by the item's index
/// - Items without a report are treated as OK
/// - Does not modify the items
#[async_trait]
pub trait QualityChecker: Send + Sync {
    /// Review `items` generated for `ctx`.
    async fn check(
        &self,
        items: &[GeneratedItem],
        ctx: &FixContext,
    ) -> Result<Vec<ItemReport>, AgentError>;

    /// Checker name for logs.
    fn name(&self) -> &str;
}
