// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! State prompt construction for the ReAct loop.

use finger_core::LoopState;
use std::fmt::Write;

/// Appended to the prompt after a parse failure.
pub const SCHEMA_HINT: &str = r#"Respond with exactly one JSON object and no other text:
{"thought": "<your reasoning>", "action": "<PLAN|DISPATCH|COMPLETE|FAIL|CHECKPOINT>", "params": {...}, "expectedOutcome": "<optional>", "risk": "<optional>"}"#;

/// Render the loop state into the per-round prompt.
pub fn build_state_prompt(state: &LoopState, recent_errors: &[String]) -> String {
    let mut prompt = String::new();
    let _ = writeln!(prompt, "You are the orchestrator for an epic.");
    let _ = writeln!(prompt, "Epic: {}", state.user_task);
    let _ = writeln!(prompt, "Phase: {} | Round: {}", state.phase, state.round);

    if state.task_graph.is_empty() {
        let _ = writeln!(prompt, "Tasks: none yet. Use PLAN to decompose the epic.");
    } else {
        let _ = writeln!(prompt, "Tasks:");
        for task in &state.task_graph {
            let _ = writeln!(
                prompt,
                "  - [{}] {} ({})",
                task.status, task.id, task.description
            );
        }
        let (total, completed, failed) = state.counts();
        let _ = writeln!(
            prompt,
            "Progress: {completed}/{total} completed, {failed} failed."
        );
    }

    if !recent_errors.is_empty() {
        let _ = writeln!(prompt, "Recent errors:");
        for error in recent_errors.iter().rev().take(3) {
            let _ = writeln!(prompt, "  - {error}");
        }
    }

    let _ = writeln!(
        prompt,
        "Actions: PLAN (decompose into tasks), DISPATCH (run one ready task), \
         CHECKPOINT (record a health check), COMPLETE (finish when all tasks are settled), \
         FAIL (abandon the epic)."
    );
    let _ = write!(prompt, "{SCHEMA_HINT}");
    prompt
}

#[cfg(test)]
#[path = "prompt_tests.rs"]
mod tests;
