//! Prompts for repair calls.
//!
//! Two templates, one per [`RepairStrategy`]. Both ask for the same reply
//! shape so the fixer parses them the same way:
//!
//! ```json
//! {"item": {"type": "...", ...}, "description": "what was changed"}
//! ```

use genguard_core::{AgentIssue, FixContext, GeneratedItem, RepairStrategy};

use crate::providers::ChatMessage;

/// System prompt shared by every repair call.
pub const REPAIR_SYSTEM_PROMPT: &str = r#"
You are an editor of school worksheet items.

You receive one item as JSON and one problem found by a reviewer.
Return exactly one JSON object and nothing else:

{"item": { ...the repaired item... }, "description": "one sentence on what you changed"}

## Rules
1. Keep the "type" field exactly as given
2. Keep the language of the original item
3. Keep the content appropriate for the stated grade
4. Every choice item must have exactly one correct answer
"#;

/// Template for regenerating an item at a required difficulty.
pub const REGENERATE_TEMPLATE: &str = r#"
Subject: {subject}
Grade: {grade}
Topic: {topic}

The reviewer found that this item does not match the required difficulty.
Problem: {problem}

Write a NEW item of type "{type}" at difficulty "{difficulty}".
Only the type is kept; question, options and answer may all change.

Item:
{item}
"#;

/// Template for fixing a flaw in place.
pub const CORRECT_TEMPLATE: &str = r#"
Subject: {subject}
Grade: {grade}
Topic: {topic}

The reviewer found a problem ({code}) in this item.
Problem: {problem}
{suggestion}
Fix only this problem. Keep the type and the overall structure of the item.

Item:
{item}
"#;

/// Build the chat messages for repairing `item` with `strategy`.
pub fn repair_messages(
    strategy: RepairStrategy,
    item: &GeneratedItem,
    issue: &AgentIssue,
    ctx: &FixContext,
) -> Vec<ChatMessage> {
    let template = match strategy {
        RepairStrategy::Regenerate { .. } => REGENERATE_TEMPLATE,
        RepairStrategy::CorrectInPlace => CORRECT_TEMPLATE,
    };

    let item_json = serde_json::to_string_pretty(&item.to_value()).unwrap_or_else(|_| item.canonical_json());
    let suggestion = issue
        .suggestion
        .as_deref()
        .map(|s| format!("Reviewer suggestion: {}\n", s))
        .unwrap_or_default();
    let difficulty = strategy
        .target_difficulty()
        .unwrap_or(ctx.required_difficulty);

    let grade = ctx.grade.to_string();
    let user = fill(template, |name| match name {
        "subject" => Some(ctx.subject.as_str()),
        "grade" => Some(grade.as_str()),
        "topic" => Some(ctx.topic.as_deref().unwrap_or("-")),
        "code" => Some(issue.code.as_str()),
        "problem" => Some(issue.message.as_str()),
        "suggestion" => Some(suggestion.as_str()),
        "type" => Some(item.kind.as_str()),
        "difficulty" => Some(difficulty.as_str()),
        "item" => Some(item_json.as_str()),
        _ => None,
    });

    vec![
        ChatMessage::system(REPAIR_SYSTEM_PROMPT.trim()),
        ChatMessage::user(user.trim()),
    ]
}

/// Substitute `{name}` placeholders in one pass.
///
/// Substituted text is never scanned again; unknown placeholders are kept.
fn fill<'a>(template: &str, lookup: impl Fn(&str) -> Option<&'a str>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let name_len = after
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
            .unwrap_or(after.len());

        match (after[name_len..].starts_with('}'), lookup(&after[..name_len])) {
            (true, Some(value)) => {
                out.push_str(value);
                rest = &after[name_len + 1..];
            }
            _ => {
                out.push('{');
                rest = after;
            }
        }
    }

    out.push_str(rest);
    out
}
