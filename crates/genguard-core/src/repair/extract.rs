//! JSON extraction from free-text model replies.

use lazy_static::lazy_static;
use regex::Regex;
use serde_json::Value;
use thiserror::Error;

lazy_static! {
    /// Fenced code block, optionally tagged `json`
    static ref FENCED_BLOCK: Regex = Regex::new(r"(?s)```(?:json|JSON)?[ \t]*\r?\n?(.*?)```").unwrap();
}

/// Why no JSON could be extracted.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExtractError {
    #[error("reply contains no JSON object")]
    NoJson,

    #[error("reply JSON is malformed: {0}")]
    Malformed(String),
}

/// Pull the first JSON value out of a model reply.
///
/// Tries, in order: every fenced code block, the first brace-balanced
/// `{...}` object in the raw text that parses, then the span from the first
/// `{` to the last `}`.
pub fn extract_json(text: &str) -> Result<Value, ExtractError> {
    for captures in FENCED_BLOCK.captures_iter(text) {
        if let Some(block) = captures.get(1) {
            if let Ok(value) = serde_json::from_str::<Value>(block.as_str().trim()) {
                return Ok(value);
            }
        }
    }

    let start = text.find('{').ok_or(ExtractError::NoJson)?;

    let mut last_error = None;
    for (offset, _) in text[start..].match_indices('{') {
        let candidate = &text[start + offset..];
        if let Some(end) = balanced_object_end(candidate) {
            match serde_json::from_str::<Value>(&candidate[..end]) {
                Ok(value) => return Ok(value),
                Err(e) => last_error = Some(e.to_string()),
            }
        }
    }

    if let Some(last) = text.rfind('}').filter(|&last| last > start) {
        match serde_json::from_str::<Value>(&text[start..=last]) {
            Ok(value) => return Ok(value),
            Err(e) => last_error = Some(e.to_string()),
        }
    }

    Err(last_error.map_or(ExtractError::NoJson, ExtractError::Malformed))
}

/// Byte length of the brace-balanced object at the start of `text`.
///
/// Braces inside JSON strings are ignored.
fn balanced_object_end(text: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in text.char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(i + 1);
                }
            }
            _ => {}
        }
    }
    None
}
