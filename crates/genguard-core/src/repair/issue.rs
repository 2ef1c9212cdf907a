//! Quality issues reported against generated items.

use serde::{Deserialize, Serialize};

/// Category of a quality issue.
///
/// Codes unknown to this build deserialize as [`IssueCode::Other`] and are
/// repaired in place.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IssueCode {
    /// Question wording is unclear or malformed
    BadFormulation,

    /// Item does not match the requested difficulty
    DifficultyMismatch,

    /// None of the options is correct
    NoCorrectAnswer,

    /// More than one option is correct
    MultipleCorrectAnswers,

    /// Content states something false
    FactualError,

    /// Content is not appropriate for the grade
    AgeInappropriate,

    #[serde(other)]
    Other,
}

impl IssueCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            IssueCode::BadFormulation => "BAD_FORMULATION",
            IssueCode::DifficultyMismatch => "DIFFICULTY_MISMATCH",
            IssueCode::NoCorrectAnswer => "NO_CORRECT_ANSWER",
            IssueCode::MultipleCorrectAnswers => "MULTIPLE_CORRECT_ANSWERS",
            IssueCode::FactualError => "FACTUAL_ERROR",
            IssueCode::AgeInappropriate => "AGE_INAPPROPRIATE",
            IssueCode::Other => "OTHER",
        }
    }
}

impl std::fmt::Display for IssueCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One issue found by a quality-check agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentIssue {
    pub code: IssueCode,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

impl AgentIssue {
    pub fn new(code: IssueCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            suggestion: None,
        }
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }
}

/// Verdict for one item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ItemStatus {
    Ok,
    NeedsFix,
}

/// Quality-check result for the item at `index`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemReport {
    pub index: usize,
    pub status: ItemStatus,
    #[serde(default)]
    pub issues: Vec<AgentIssue>,
}

impl ItemReport {
    pub fn ok(index: usize) -> Self {
        Self {
            index,
            status: ItemStatus::Ok,
            issues: Vec::new(),
        }
    }

    pub fn needs_fix(index: usize, issues: Vec<AgentIssue>) -> Self {
        Self {
            index,
            status: ItemStatus::NeedsFix,
            issues,
        }
    }

    pub fn needs_fix_status(&self) -> bool {
        self.status == ItemStatus::NeedsFix && !self.issues.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_issue_codes_parse_from_agent_json() {
        let raw = r#"{"index": 2, "status": "NEEDS_FIX", "issues": [
            {"code": "DIFFICULTY_MISMATCH", "message": "too easy"},
            {"code": "SOMETHING_NEW", "message": "?", "suggestion": "rewrite"}
        ]}"#;
        let report: ItemReport = serde_json::from_str(raw).unwrap();

        assert_eq!(report.index, 2);
        assert!(report.needs_fix_status());
        assert_eq!(report.issues[0].code, IssueCode::DifficultyMismatch);
        assert_eq!(report.issues[1].code, IssueCode::Other);
        assert_eq!(report.issues[1].suggestion.as_deref(), Some("rewrite"));
    }

    #[test]
    fn test_ok_report_needs_nothing() {
        assert!(!ItemReport::ok(0).needs_fix_status());
        assert!(!ItemReport::needs_fix(0, vec![]).needs_fix_status());
    }
}
