// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use serde_json::json;
use yare::parameterized;

#[parameterized(
    pending_ready = { TaskStatus::Pending, TaskStatus::Ready, true },
    ready_in_progress = { TaskStatus::Ready, TaskStatus::InProgress, true },
    in_progress_completed = { TaskStatus::InProgress, TaskStatus::Completed, true },
    in_progress_failed = { TaskStatus::InProgress, TaskStatus::Failed, true },
    failed_retry = { TaskStatus::Failed, TaskStatus::Ready, true },
    pending_completed = { TaskStatus::Pending, TaskStatus::Completed, false },
    completed_anything = { TaskStatus::Completed, TaskStatus::Ready, false },
    ready_completed = { TaskStatus::Ready, TaskStatus::Completed, false },
)]
fn transition_table(from: TaskStatus, to: TaskStatus, legal: bool) {
    assert_eq!(from.can_transition(to), legal);
}

#[test]
fn happy_path_lifecycle() {
    let mut task = TaskNode::new(TaskId::new("t1"), "write hello");
    task.mark_ready().unwrap();
    task.start(ModuleId::new("executor-1"), 100).unwrap();
    assert_eq!(task.status, TaskStatus::InProgress);
    assert_eq!(task.started_at, Some(100));

    task.complete(json!({"output": "hello"})).unwrap();
    assert_eq!(task.status, TaskStatus::Completed);
    assert!(task.status.is_terminal());
}

#[test]
fn illegal_transition_reports_states() {
    let mut task = TaskNode::new(TaskId::new("t1"), "x");
    let err = task.complete(json!(null)).unwrap_err();
    assert_eq!(err.from, TaskStatus::Pending);
    assert_eq!(err.to, TaskStatus::Completed);
    // state unchanged on rejection
    assert_eq!(task.status, TaskStatus::Pending);
}

#[test]
fn reopen_clears_assignment() {
    let mut task = TaskNode::new(TaskId::new("t1"), "x");
    task.mark_ready().unwrap();
    task.start(ModuleId::new("e"), 1).unwrap();
    task.fail(json!({"error": "boom"})).unwrap();

    task.reopen().unwrap();
    assert_eq!(task.status, TaskStatus::Ready);
    assert!(task.assignee.is_none());
    assert!(task.result.is_none());
    assert!(task.started_at.is_none());
}

#[test]
fn serializes_snake_case_status() {
    let task = TaskNode::new(TaskId::new("t1"), "x");
    let value = serde_json::to_value(&task).unwrap();
    assert_eq!(value["status"], "pending");
    assert!(value.as_object().unwrap().get("startedAt").is_none());
}
