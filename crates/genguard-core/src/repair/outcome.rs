//! Repair attempt results.

use serde::Serialize;

use super::issue::IssueCode;
use super::item::GeneratedItem;

/// Result of one repair attempt. Always a value, never an error.
///
/// On failure `fixed_item` is `None` and the caller keeps `original_item`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FixResult {
    pub success: bool,
    pub issue: IssueCode,
    pub original_item: GeneratedItem,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fixed_item: Option<GeneratedItem>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl FixResult {
    pub fn fixed(
        issue: IssueCode,
        original_item: GeneratedItem,
        fixed_item: GeneratedItem,
        description: Option<String>,
    ) -> Self {
        Self {
            success: true,
            issue,
            original_item,
            fixed_item: Some(fixed_item),
            description,
            error: None,
        }
    }

    pub fn failed(issue: IssueCode, original_item: GeneratedItem, error: impl Into<String>) -> Self {
        Self {
            success: false,
            issue,
            original_item,
            fixed_item: None,
            description: None,
            error: Some(error.into()),
        }
    }

    /// Refused before any upstream call because the run's budget is spent.
    pub fn budget_exhausted(issue: IssueCode, original_item: GeneratedItem) -> Self {
        Self::failed(issue, original_item, REPAIR_BUDGET_EXHAUSTED)
    }

    pub fn is_budget_exhausted(&self) -> bool {
        !self.success && self.error.as_deref() == Some(REPAIR_BUDGET_EXHAUSTED)
    }

    /// The item to keep: the fix if there is one, else the original.
    pub fn into_item(self) -> GeneratedItem {
        self.fixed_item.unwrap_or(self.original_item)
    }
}

const REPAIR_BUDGET_EXHAUSTED: &str = "repair budget exhausted";
