// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use serde_json::json;

#[test]
fn completions_resolve_once() {
    let mailbox = Mailbox::new();
    mailbox.open("cb-1");
    assert_eq!(mailbox.get("cb-1"), Some(Completion::Pending));

    mailbox.complete("cb-1", Some(json!({"ok": true})));
    let taken = mailbox.take_finished("cb-1").unwrap();
    assert!(matches!(taken, Completion::Completed { .. }));

    // Fetching again: the slot is gone.
    assert!(mailbox.take_finished("cb-1").is_none());
}

#[test]
fn pending_slots_survive_polling() {
    let mailbox = Mailbox::new();
    mailbox.open("cb-1");
    assert_eq!(mailbox.take_finished("cb-1"), Some(Completion::Pending));
    assert_eq!(mailbox.take_finished("cb-1"), Some(Completion::Pending));
}

#[test]
fn failures_carry_the_error() {
    let mailbox = Mailbox::new();
    mailbox.open("cb-1");
    mailbox.fail("cb-1", "module not registered: x");
    match mailbox.take_finished("cb-1").unwrap() {
        Completion::Failed { error } => assert!(error.contains("not registered")),
        other => panic!("unexpected completion: {other:?}"),
    }
}

#[test]
fn serializes_with_status_tag() {
    let completed = Completion::Completed {
        result: Some(json!(1)),
    };
    let value = serde_json::to_value(&completed).unwrap();
    assert_eq!(value["status"], "completed");
    assert_eq!(value["result"], 1);

    let pending = serde_json::to_value(Completion::Pending).unwrap();
    assert_eq!(pending["status"], "pending");
}
