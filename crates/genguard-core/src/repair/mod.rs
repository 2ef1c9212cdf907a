//! Repair domain: issues, items, strategies, budget and reply parsing.

mod budget;
mod extract;
mod issue;
mod item;
mod outcome;

pub use budget::{RepairBudget, MAX_REPAIR_ATTEMPTS};
pub use extract::{extract_json, ExtractError};
pub use issue::{AgentIssue, IssueCode, ItemReport, ItemStatus};
pub use item::{Difficulty, FixContext, GeneratedItem, RepairStrategy};
pub use outcome::FixResult;
