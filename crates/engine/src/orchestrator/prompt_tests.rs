// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use finger_core::{EpicId, LoopState, Phase, TaskId, TaskNode};

#[test]
fn empty_graph_suggests_planning() {
    let state = LoopState::new(EpicId::new("e"), "write hello world");
    let prompt = build_state_prompt(&state, &[]);
    assert!(prompt.contains("Epic: write hello world"));
    assert!(prompt.contains("Phase: planning | Round: 0"));
    assert!(prompt.contains("none yet"));
    assert!(prompt.contains(SCHEMA_HINT));
}

#[test]
fn tasks_render_with_statuses_and_progress() {
    let mut state = LoopState::new(EpicId::new("e"), "do things");
    state.phase = Phase::Execution;
    state.round = 4;
    let mut done = TaskNode::new(TaskId::new("t1"), "first");
    done.mark_ready().unwrap();
    done.start(finger_core::ModuleId::new("x"), 1).unwrap();
    done.complete(serde_json::json!({})).unwrap();
    state.task_graph.push(done);
    state.task_graph.push(TaskNode::new(TaskId::new("t2"), "second"));
    state.record_completed(TaskId::new("t1"));

    let prompt = build_state_prompt(&state, &[]);
    assert!(prompt.contains("[completed] t1 (first)"));
    assert!(prompt.contains("[pending] t2 (second)"));
    assert!(prompt.contains("Progress: 1/2 completed, 0 failed."));
}

#[test]
fn recent_errors_are_included_newest_first() {
    let state = LoopState::new(EpicId::new("e"), "t");
    let errors = vec!["older".to_string(), "newest".to_string()];
    let prompt = build_state_prompt(&state, &errors);
    let newest = prompt.find("newest").unwrap();
    let older = prompt.find("older").unwrap();
    assert!(newest < older);
}
