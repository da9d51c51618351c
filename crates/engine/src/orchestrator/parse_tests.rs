// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use serde_json::json;

#[test]
fn extracts_first_balanced_object() {
    let text = r#"Sure, here's my plan: {"action":"PLAN","params":{"tasks":[]}} and more text {"x":1}"#;
    assert_eq!(
        extract_first_json(text).unwrap(),
        r#"{"action":"PLAN","params":{"tasks":[]}}"#
    );
}

#[test]
fn braces_inside_strings_do_not_count() {
    let text = r#"{"thought":"use {braces} and \"quotes\"","action":"COMPLETE"}"#;
    assert_eq!(extract_first_json(text).unwrap(), text);
}

#[test]
fn nested_objects_balance() {
    let text = r#"noise {"a":{"b":{"c":1}},"d":[{"e":2}]} tail"#;
    assert_eq!(
        extract_first_json(text).unwrap(),
        r#"{"a":{"b":{"c":1}},"d":[{"e":2}]}"#
    );
}

#[test]
fn no_object_is_none() {
    assert!(extract_first_json("just prose, no json").is_none());
    assert!(extract_first_json("unbalanced { \"a\": 1").is_none());
}

#[test]
fn parses_full_directive() {
    let text = r#"
I'll dispatch the first task.

{"thought":"t1 is ready","action":"DISPATCH","params":{"taskId":"t1"},"expectedOutcome":"hello written","risk":"low"}
"#;
    let directive = parse_directive(text).unwrap();
    assert_eq!(directive.action, "DISPATCH");
    assert_eq!(directive.thought.as_deref(), Some("t1 is ready"));
    assert_eq!(directive.params, json!({"taskId": "t1"}));
    assert_eq!(directive.expected_outcome.as_deref(), Some("hello written"));
    assert_eq!(directive.risk.as_deref(), Some("low"));
}

#[test]
fn params_default_to_null() {
    let directive = parse_directive(r#"{"action":"COMPLETE"}"#).unwrap();
    assert_eq!(directive.action, "COMPLETE");
    assert!(directive.params.is_null());
    assert!(directive.thought.is_none());
}

#[test]
fn missing_action_is_invalid() {
    let err = parse_directive(r#"{"thought":"hmm"}"#).unwrap_err();
    assert!(matches!(err, ParseError::Invalid(_)));

    let err = parse_directive("no json here").unwrap_err();
    assert!(matches!(err, ParseError::NoJsonObject));
}
