//! The repair loop.
//!
//! [`ItemFixer::fix_item`] makes one AI-assisted repair attempt for one
//! issue. It never fails: every outcome is a [`FixResult`], and a failed
//! fix leaves the original item in place.

use futures::future::join_all;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use genguard_core::{
    extract_json, AgentIssue, FixContext, FixResult, GeneratedItem, ItemReport, RepairBudget,
    RepairStrategy,
};

use super::cache::{CachedFix, RepairCache, RepairKey};
use crate::config::RepairConfig;
use crate::prompts::repair_messages;
use crate::providers::CompletionConfig;
use crate::resilience::AiCallGuard;

/// Result of repairing a batch of items under one budget.
#[derive(Debug, Clone, Serialize)]
pub struct RepairOutcome {
    /// Items in their original order, fixed where a fix succeeded
    pub items: Vec<GeneratedItem>,

    /// Every attempt, including those refused by the budget
    pub results: Vec<FixResult>,

    /// Issues still open, by item index
    pub unresolved: Vec<(usize, AgentIssue)>,
}

impl RepairOutcome {
    pub fn fixed_count(&self) -> usize {
        self.results.iter().filter(|r| r.success).count()
    }

    pub fn is_clean(&self) -> bool {
        self.unresolved.is_empty()
    }
}

/// Repairs items through a guarded AI call.
pub struct ItemFixer {
    guard: Arc<AiCallGuard>,
    completion: CompletionConfig,
    cache: Arc<RepairCache>,
}

impl ItemFixer {
    pub fn new(guard: Arc<AiCallGuard>, completion: CompletionConfig) -> Self {
        Self {
            guard,
            completion,
            cache: Arc::new(RepairCache::default()),
        }
    }

    /// Fixer with the repair temperature and cache from `config`.
    pub fn from_config(guard: Arc<AiCallGuard>, completion: &CompletionConfig, config: &RepairConfig) -> Self {
        Self::new(guard, completion.clone().with_temperature(config.temperature))
            .with_cache(Arc::new(RepairCache::new(config.cache_capacity, config.cache_ttl)))
    }

    pub fn with_cache(mut self, cache: Arc<RepairCache>) -> Self {
        self.cache = cache;
        self
    }

    pub fn cache(&self) -> &Arc<RepairCache> {
        &self.cache
    }

    /// Attempt one repair of `item` for `issue`.
    ///
    /// Takes one unit of `budget` first; an exhausted budget refuses the
    /// attempt before any upstream call.
    pub async fn fix_item(
        &self,
        item: &GeneratedItem,
        issue: &AgentIssue,
        ctx: &FixContext,
        budget: &RepairBudget,
    ) -> FixResult {
        if !budget.try_consume() {
            tracing::info!(issue = %issue.code, cap = budget.cap(), "Repair budget exhausted, keeping item");
            return FixResult::budget_exhausted(issue.code, item.clone());
        }

        let strategy = RepairStrategy::for_issue(issue, ctx);
        let messages = repair_messages(strategy, item, issue, ctx);
        let key = RepairKey::new(issue.code, &messages);

        if let Some(cached) = self.cache.get(&key).await {
            tracing::debug!(issue = %issue.code, "Repair served from cache");
            return FixResult::fixed(issue.code, item.clone(), cached.item, cached.description);
        }

        let started = Instant::now();
        let result = match self.guard.call(messages, &self.completion).await {
            Ok(response) => match parse_reply(&response.content, item) {
                Ok((fixed, description)) => {
                    self.cache
                        .insert(
                            key,
                            CachedFix {
                                item: fixed.clone(),
                                description: description.clone(),
                            },
                        )
                        .await;
                    FixResult::fixed(issue.code, item.clone(), fixed, description)
                }
                Err(e) => FixResult::failed(issue.code, item.clone(), e),
            },
            Err(e) => FixResult::failed(issue.code, item.clone(), e.to_string()),
        };

        let elapsed_ms = started.elapsed().as_millis() as u64;
        if result.success {
            tracing::info!(issue = %issue.code, elapsed_ms, remaining = budget.remaining(), "Item repaired");
        } else {
            tracing::warn!(
                issue = %issue.code,
                elapsed_ms,
                error = result.error.as_deref().unwrap_or_default(),
                "Item repair failed, keeping original"
            );
        }

        result
    }

    /// Repair every flagged item under one shared `budget`.
    ///
    /// Items are repaired concurrently; the issues of one item (across all
    /// of its reports) are repaired one after another, each on top of the
    /// previous fix.
    pub async fn repair_all(
        &self,
        items: &[GeneratedItem],
        reports: &[ItemReport],
        ctx: &FixContext,
        budget: &RepairBudget,
    ) -> RepairOutcome {
        let mut fixed_items = items.to_vec();

        // Reports for the same index are merged so one item has one chain.
        let mut flagged: BTreeMap<usize, Vec<&AgentIssue>> = BTreeMap::new();
        for report in reports.iter().filter(|report| report.needs_fix_status()) {
            if report.index >= items.len() {
                tracing::warn!(index = report.index, items = items.len(), "Quality report for unknown item ignored");
                continue;
            }
            flagged.entry(report.index).or_default().extend(&report.issues);
        }

        let per_item = join_all(flagged.into_iter().map(|(index, issues)| async move {
            let mut current = items[index].clone();
            let mut results = Vec::with_capacity(issues.len());
            let mut unresolved = Vec::new();

            for issue in issues {
                let result = self.fix_item(&current, issue, ctx, budget).await;
                match &result.fixed_item {
                    Some(fixed) => current = fixed.clone(),
                    None => unresolved.push((index, issue.clone())),
                }
                results.push(result);
            }

            (index, current, results, unresolved)
        }))
        .await;

        let mut all_results = Vec::new();
        let mut all_unresolved = Vec::new();
        for (index, item, results, unresolved) in per_item {
            fixed_items[index] = item;
            all_results.extend(results);
            all_unresolved.extend(unresolved);
        }

        RepairOutcome {
            items: fixed_items,
            results: all_results,
            unresolved: all_unresolved,
        }
    }
}

impl std::fmt::Debug for ItemFixer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ItemFixer")
            .field("guard", &self.guard)
            .field("model", &self.completion.model)
            .finish()
    }
}

/// Parse a repair reply into the fixed item and its description.
///
/// Accepts `{"item": {...}, "description": "..."}` or a bare item. The type
/// tag always ends up equal to the original's.
fn parse_reply(
    content: &str,
    original: &GeneratedItem,
) -> Result<(GeneratedItem, Option<String>), String> {
    let value = extract_json(content).map_err(|e| e.to_string())?;
    let Value::Object(mut object) = value else {
        return Err("reply JSON is not an object".to_string());
    };

    let (mut map, description) = match object.remove("item") {
        Some(Value::Object(item)) => {
            let description = object
                .get("description")
                .and_then(Value::as_str)
                .map(str::to_string);
            (item, description)
        }
        Some(other) => {
            object.insert("item".to_string(), other);
            (object, None)
        }
        None => (object, None),
    };

    enforce_type(&mut map, original);

    GeneratedItem::from_value(Value::Object(map))
        .map(|item| (item, description))
        .map_err(|e| format!("repaired item is invalid: {}", e))
}

fn enforce_type(map: &mut Map<String, Value>, original: &GeneratedItem) {
    match map.get("type").and_then(Value::as_str) {
        Some(kind) if kind == original.kind => return,
        Some(kind) => {
            tracing::warn!(
                expected = %original.kind,
                returned = kind,
                "Model changed item type during repair, restoring"
            );
        }
        None => {}
    }
    map.insert("type".to_string(), Value::String(original.kind.clone()));
}
