// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Task nodes inside an orchestration run.

use crate::message::ModuleId;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

crate::define_id! {
    /// Unique identifier for a sub-task within an Epic.
    pub struct TaskId;
}

/// Lifecycle of a task node.
///
/// `pending → ready → in_progress → completed|failed`; a failed task may be
/// moved back to `ready` when the orchestrator retries it after a checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Ready,
    InProgress,
    Completed,
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Completed | TaskStatus::Failed)
    }

    /// Whether `self → next` is a legal transition.
    pub fn can_transition(&self, next: TaskStatus) -> bool {
        use TaskStatus::*;
        matches!(
            (self, next),
            (Pending, Ready)
                | (Ready, InProgress)
                | (InProgress, Completed)
                | (InProgress, Failed)
                | (Failed, Ready)
        )
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Ready => "ready",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Rejected task state transition.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("task {task}: illegal transition {from} -> {to}")]
pub struct TaskTransitionError {
    pub task: TaskId,
    pub from: TaskStatus,
    pub to: TaskStatus,
}

/// A single sub-task of an Epic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskNode {
    pub id: TaskId,
    pub description: String,
    pub status: TaskStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignee: Option<ModuleId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Cross-reference into the external bug database, when one exists.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bd_task_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deadline: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<u64>,
}

impl TaskNode {
    pub fn new(id: TaskId, description: impl Into<String>) -> Self {
        Self {
            id,
            description: description.into(),
            status: TaskStatus::Pending,
            assignee: None,
            result: None,
            bd_task_id: None,
            deadline: None,
            started_at: None,
        }
    }

    fn transition(&mut self, next: TaskStatus) -> Result<(), TaskTransitionError> {
        if !self.status.can_transition(next) {
            return Err(TaskTransitionError {
                task: self.id.clone(),
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }

    pub fn mark_ready(&mut self) -> Result<(), TaskTransitionError> {
        self.transition(TaskStatus::Ready)
    }

    pub fn start(&mut self, assignee: ModuleId, now_ms: u64) -> Result<(), TaskTransitionError> {
        self.transition(TaskStatus::InProgress)?;
        self.assignee = Some(assignee);
        self.started_at = Some(now_ms);
        Ok(())
    }

    pub fn complete(&mut self, result: Value) -> Result<(), TaskTransitionError> {
        self.transition(TaskStatus::Completed)?;
        self.result = Some(result);
        Ok(())
    }

    pub fn fail(&mut self, error: Value) -> Result<(), TaskTransitionError> {
        self.transition(TaskStatus::Failed)?;
        self.result = Some(error);
        Ok(())
    }

    /// Reopen a failed task for retry after a checkpoint decision.
    pub fn reopen(&mut self) -> Result<(), TaskTransitionError> {
        self.transition(TaskStatus::Ready)?;
        self.assignee = None;
        self.result = None;
        self.started_at = None;
        Ok(())
    }
}

#[cfg(test)]
#[path = "task_tests.rs"]
mod tests;
