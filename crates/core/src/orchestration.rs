// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Orchestration loop state.
//!
//! [`LoopState`] is the complete, serializable state of one Epic run. It is
//! what checkpoints persist and what a resumed run starts from.

use crate::message::ModuleId;
use crate::task::{TaskId, TaskNode, TaskStatus};
use serde::{Deserialize, Serialize};

crate::define_id! {
    /// Identifier of a top-level user task (Epic).
    pub struct EpicId;
}

/// Orchestration phase.
///
/// `planning → high_design → detail_design → task_allocation → execution ⇄
/// review → completed|failed`. Review may re-enter `planning` after a major
/// change. Any phase may fail. Forward skips over unused design phases are
/// legal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Planning,
    HighDesign,
    DetailDesign,
    TaskAllocation,
    Execution,
    Review,
    Completed,
    Failed,
}

impl Phase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Phase::Completed | Phase::Failed)
    }

    /// Whether `self → next` is a legal phase transition.
    pub fn can_transition(&self, next: Phase) -> bool {
        use Phase::*;
        if next == Failed {
            return !self.is_terminal();
        }
        matches!(
            (self, next),
            (Planning, HighDesign)
                | (Planning, DetailDesign)
                | (Planning, TaskAllocation)
                | (Planning, Execution)
                | (HighDesign, DetailDesign)
                | (HighDesign, TaskAllocation)
                | (HighDesign, Execution)
                | (DetailDesign, TaskAllocation)
                | (DetailDesign, Execution)
                | (TaskAllocation, Execution)
                | (Execution, Review)
                | (Execution, Completed)
                | (Review, Execution)
                | (Review, Planning)
                | (Review, Completed)
        )
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Phase::Planning => "planning",
            Phase::HighDesign => "high_design",
            Phase::DetailDesign => "detail_design",
            Phase::TaskAllocation => "task_allocation",
            Phase::Execution => "execution",
            Phase::Review => "review",
            Phase::Completed => "completed",
            Phase::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Checkpoint bookkeeping inside a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckpointState {
    pub total_checks: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_trigger: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_check_at: Option<u64>,
    #[serde(default)]
    pub major_change: bool,
}

/// Complete state of one Epic run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoopState {
    pub epic_id: EpicId,
    pub user_task: String,
    #[serde(default)]
    pub task_graph: Vec<TaskNode>,
    #[serde(default)]
    pub completed_tasks: Vec<TaskId>,
    #[serde(default)]
    pub failed_tasks: Vec<TaskId>,
    pub phase: Phase,
    #[serde(default)]
    pub checkpoint: CheckpointState,
    pub round: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_executor_id: Option<ModuleId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl LoopState {
    pub fn new(epic_id: EpicId, user_task: impl Into<String>) -> Self {
        Self {
            epic_id,
            user_task: user_task.into(),
            task_graph: Vec::new(),
            completed_tasks: Vec::new(),
            failed_tasks: Vec::new(),
            phase: Phase::Planning,
            checkpoint: CheckpointState::default(),
            round: 0,
            target_executor_id: None,
            last_error: None,
        }
    }

    pub fn task(&self, id: &TaskId) -> Option<&TaskNode> {
        self.task_graph.iter().find(|t| &t.id == id)
    }

    pub fn task_mut(&mut self, id: &TaskId) -> Option<&mut TaskNode> {
        self.task_graph.iter_mut().find(|t| &t.id == id)
    }

    /// First task in `ready` status, by insertion order.
    pub fn first_ready(&self) -> Option<&TaskNode> {
        self.task_graph
            .iter()
            .find(|t| t.status == TaskStatus::Ready)
    }

    /// Record a completed task, upholding the completed-XOR-failed invariant:
    /// the id appears at most once in `completed_tasks` and is removed from
    /// `failed_tasks` if a retry succeeded.
    pub fn record_completed(&mut self, id: TaskId) {
        self.failed_tasks.retain(|t| t != &id);
        if !self.completed_tasks.contains(&id) {
            self.completed_tasks.push(id);
        }
    }

    /// Record a failed task; a task already completed is never marked failed.
    pub fn record_failed(&mut self, id: TaskId) {
        if self.completed_tasks.contains(&id) {
            return;
        }
        if !self.failed_tasks.contains(&id) {
            self.failed_tasks.push(id);
        }
    }

    /// True when every task in the graph is in a terminal status.
    pub fn all_tasks_settled(&self) -> bool {
        self.task_graph.iter().all(|t| t.status.is_terminal())
    }

    pub fn counts(&self) -> (usize, usize, usize) {
        let total = self.task_graph.len();
        (total, self.completed_tasks.len(), self.failed_tasks.len())
    }
}

#[cfg(test)]
#[path = "orchestration_tests.rs"]
mod tests;
