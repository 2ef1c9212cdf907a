//! Generated items and repair strategies.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::issue::{AgentIssue, IssueCode};

/// Difficulty level of an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

impl Difficulty {
    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Hard => "hard",
        }
    }
}

impl std::fmt::Display for Difficulty {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A generated worksheet item.
///
/// Only the `type` tag is interpreted; every other field is carried as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratedItem {
    #[serde(rename = "type")]
    pub kind: String,

    #[serde(flatten)]
    pub body: Map<String, Value>,
}

impl GeneratedItem {
    pub fn new(kind: impl Into<String>, body: Map<String, Value>) -> Self {
        Self {
            kind: kind.into(),
            body,
        }
    }

    /// Parse from a JSON value; the value must be an object with a string `type`.
    pub fn from_value(value: Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value)
    }

    pub fn to_value(&self) -> Value {
        let mut map = self.body.clone();
        map.insert("type".to_string(), Value::String(self.kind.clone()));
        Value::Object(map)
    }

    /// Canonical JSON text; object keys are sorted.
    pub fn canonical_json(&self) -> String {
        self.to_value().to_string()
    }

    pub fn field(&self, name: &str) -> Option<&Value> {
        self.body.get(name)
    }
}

/// Context the item was generated for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixContext {
    pub subject: String,
    pub grade: u8,
    #[serde(default)]
    pub topic: Option<String>,
    pub required_difficulty: Difficulty,
}

impl FixContext {
    pub fn new(subject: impl Into<String>, grade: u8, required_difficulty: Difficulty) -> Self {
        Self {
            subject: subject.into(),
            grade,
            topic: None,
            required_difficulty,
        }
    }

    pub fn with_topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = Some(topic.into());
        self
    }
}

/// How an issue is repaired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum RepairStrategy {
    /// Regenerate the item wholesale at `target`, keeping only its type
    Regenerate { target: Difficulty },

    /// Fix the reported flaw, keeping type and structure
    CorrectInPlace,
}

impl RepairStrategy {
    pub fn for_issue(issue: &AgentIssue, ctx: &FixContext) -> Self {
        match issue.code {
            IssueCode::DifficultyMismatch => RepairStrategy::Regenerate {
                target: ctx.required_difficulty,
            },
            IssueCode::BadFormulation
            | IssueCode::NoCorrectAnswer
            | IssueCode::MultipleCorrectAnswers
            | IssueCode::FactualError
            | IssueCode::AgeInappropriate
            | IssueCode::Other => RepairStrategy::CorrectInPlace,
        }
    }

    pub fn target_difficulty(&self) -> Option<Difficulty> {
        match self {
            RepairStrategy::Regenerate { target } => Some(*target),
            RepairStrategy::CorrectInPlace => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_item_keeps_unknown_fields() {
        let value = json!({
            "type": "single_choice",
            "question": "2 + 2 = ?",
            "options": ["3", "4"],
            "answer": 1
        });
        let item = GeneratedItem::from_value(value.clone()).unwrap();

        assert_eq!(item.kind, "single_choice");
        assert_eq!(item.field("answer"), Some(&json!(1)));
        assert_eq!(item.to_value(), value);
    }

    #[test]
    fn test_item_requires_type() {
        assert!(GeneratedItem::from_value(json!({"question": "?"})).is_err());
    }

    #[test]
    fn test_strategy_selection() {
        let ctx = FixContext::new("math", 3, Difficulty::Hard);

        let mismatch = AgentIssue::new(IssueCode::DifficultyMismatch, "too easy");
        assert_eq!(
            RepairStrategy::for_issue(&mismatch, &ctx),
            RepairStrategy::Regenerate {
                target: Difficulty::Hard
            }
        );

        let wording = AgentIssue::new(IssueCode::BadFormulation, "unclear");
        assert_eq!(
            RepairStrategy::for_issue(&wording, &ctx),
            RepairStrategy::CorrectInPlace
        );
    }
}
