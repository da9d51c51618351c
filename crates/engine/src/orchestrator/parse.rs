// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Action parsing from LLM completions.
//!
//! The model is asked for a JSON object but replies in free text; the parser
//! extracts the first balanced object (string-aware) and deserializes it.

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

/// Parse failures
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("no JSON object found in completion")]
    NoJsonObject,

    #[error("invalid action object: {0}")]
    Invalid(#[from] serde_json::Error),
}

/// A structured action from the model.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionDirective {
    #[serde(default)]
    pub thought: Option<String>,
    pub action: String,
    #[serde(default)]
    pub params: Value,
    #[serde(default)]
    pub expected_outcome: Option<String>,
    #[serde(default)]
    pub risk: Option<String>,
}

/// Extract the first balanced `{…}` object from free text.
///
/// Tracks string literals and escapes so braces inside strings don't count.
pub fn extract_first_json(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let bytes = text.as_bytes();
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, &byte) in bytes[start..].iter().enumerate() {
        if escaped {
            escaped = false;
            continue;
        }
        match byte {
            b'\\' if in_string => escaped = true,
            b'"' => in_string = !in_string,
            b'{' if !in_string => depth += 1,
            b'}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Parse the first JSON object in the completion into a directive.
pub fn parse_directive(text: &str) -> Result<ActionDirective, ParseError> {
    let json = extract_first_json(text).ok_or(ParseError::NoJsonObject)?;
    let directive: ActionDirective = serde_json::from_str(json)?;
    Ok(directive)
}

#[cfg(test)]
#[path = "parse_tests.rs"]
mod tests;
