// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Event types for the Finger daemon.
//!
//! Events are the daemon's observable output: every state change of note is
//! emitted on the event bus, fanned out to WebSocket subscribers, and
//! optionally persisted as JSONL. The type vocabulary is closed; each type
//! belongs to exactly one [`EventGroup`].

use crate::message::ModuleId;
use crate::session::SessionId;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Fixed grouping of event types, used by subscription filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EventGroup {
    Task,
    Agent,
    Tool,
    Session,
    Workflow,
    System,
}

/// Closed vocabulary of event types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    // -- task --
    PlanUpdated,
    TaskStarted,
    TaskCompleted,
    TaskFailed,

    // -- agent --
    AgentRegistered,
    AgentUnregistered,
    AgentHeartbeat,
    AgentStateChanged,

    // -- tool --
    ToolCall,
    ToolResult,
    ToolError,
    ToolAuthorizationIssued,
    ToolAuthorizationRevoked,

    // -- session --
    SessionCreated,
    SessionUpdated,
    SessionPaused,
    SessionResumed,
    MessageAdded,

    // -- workflow --
    WorkflowStarted,
    WorkflowProgress,
    WorkflowCompleted,
    WorkflowFailed,
    CheckpointSaved,

    // -- system --
    SystemStarted,
    SystemStopping,
    ModuleStateChanged,
    SnapshotSaved,
}

impl EventType {
    /// Static mapping from event type to group.
    pub fn group(&self) -> EventGroup {
        use EventType::*;
        match self {
            PlanUpdated | TaskStarted | TaskCompleted | TaskFailed => EventGroup::Task,
            AgentRegistered | AgentUnregistered | AgentHeartbeat | AgentStateChanged => {
                EventGroup::Agent
            }
            ToolCall | ToolResult | ToolError | ToolAuthorizationIssued
            | ToolAuthorizationRevoked => EventGroup::Tool,
            SessionCreated | SessionUpdated | SessionPaused | SessionResumed | MessageAdded => {
                EventGroup::Session
            }
            WorkflowStarted | WorkflowProgress | WorkflowCompleted | WorkflowFailed
            | CheckpointSaved => EventGroup::Workflow,
            SystemStarted | SystemStopping | ModuleStateChanged | SnapshotSaved => {
                EventGroup::System
            }
        }
    }

    pub fn name(&self) -> &'static str {
        use EventType::*;
        match self {
            PlanUpdated => "plan_updated",
            TaskStarted => "task_started",
            TaskCompleted => "task_completed",
            TaskFailed => "task_failed",
            AgentRegistered => "agent_registered",
            AgentUnregistered => "agent_unregistered",
            AgentHeartbeat => "agent_heartbeat",
            AgentStateChanged => "agent_state_changed",
            ToolCall => "tool_call",
            ToolResult => "tool_result",
            ToolError => "tool_error",
            ToolAuthorizationIssued => "tool_authorization_issued",
            ToolAuthorizationRevoked => "tool_authorization_revoked",
            SessionCreated => "session_created",
            SessionUpdated => "session_updated",
            SessionPaused => "session_paused",
            SessionResumed => "session_resumed",
            MessageAdded => "message_added",
            WorkflowStarted => "workflow_started",
            WorkflowProgress => "workflow_progress",
            WorkflowCompleted => "workflow_completed",
            WorkflowFailed => "workflow_failed",
            CheckpointSaved => "checkpoint_saved",
            SystemStarted => "system_started",
            SystemStopping => "system_stopping",
            ModuleStateChanged => "module_state_changed",
            SnapshotSaved => "snapshot_saved",
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A single emitted event.
///
/// Timestamps on one emitter are nondecreasing; no global order is promised
/// across emitters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: EventType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<SessionId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<ModuleId>,
    pub timestamp: u64,
    #[serde(default)]
    pub payload: Value,
}

impl Event {
    pub fn new(id: impl Into<String>, event_type: EventType, timestamp: u64, payload: Value) -> Self {
        Self {
            id: id.into(),
            event_type,
            session_id: None,
            agent_id: None,
            timestamp,
            payload,
        }
    }

    pub fn with_session(mut self, session_id: SessionId) -> Self {
        self.session_id = Some(session_id);
        self
    }

    pub fn with_agent(mut self, agent_id: ModuleId) -> Self {
        self.agent_id = Some(agent_id);
        self
    }

    pub fn group(&self) -> EventGroup {
        self.event_type.group()
    }

    pub fn log_summary(&self) -> String {
        let t = self.event_type.name();
        match (&self.session_id, &self.agent_id) {
            (Some(s), Some(a)) => format!("{t} session={s} agent={a}"),
            (Some(s), None) => format!("{t} session={s}"),
            (None, Some(a)) => format!("{t} agent={a}"),
            (None, None) => t.to_string(),
        }
    }
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;
