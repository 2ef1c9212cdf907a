//! Bounded AI-assisted repair of flagged items.

mod cache;
mod fixer;

pub use cache::{CachedFix, RepairCache, RepairKey};
pub use fixer::{ItemFixer, RepairOutcome};
