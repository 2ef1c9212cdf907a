//! Quality-check agents.
//!
//! The checker that flags defective items is an external collaborator; the
//! pipeline only depends on the [`QualityChecker`] trait.

mod traits;

pub use traits::{AgentError, QualityChecker};
