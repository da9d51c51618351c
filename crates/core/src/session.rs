// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session records.
//!
//! A session is the append-only conversation log for one project, plus the
//! workflow references and context the orchestrator hangs off it. Runtime
//! sub-sessions (one per agent turn) are distinguished from root sessions by
//! their context.

use crate::message::ModuleId;
use serde::{Deserialize, Serialize};
use serde_json::Value;

crate::define_id! {
    /// Unique identifier for a session.
    pub struct SessionId;
}

crate::define_id! {
    /// Unique identifier for a workflow (one Epic run).
    pub struct WorkflowId;
}

/// Author of a session message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
    System,
    Orchestrator,
}

/// One entry in a session's message log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionMessage {
    pub id: String,
    pub role: Role,
    pub content: String,
    pub timestamp: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workflow_id: Option<WorkflowId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachments: Option<Vec<Value>>,
    /// Display kind ("text", "tool_use", ...). Absent means plain text.
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_input: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_output: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

impl SessionMessage {
    pub fn new(id: impl Into<String>, role: Role, content: impl Into<String>, timestamp: u64) -> Self {
        Self {
            id: id.into(),
            role,
            content: content.into(),
            timestamp,
            workflow_id: None,
            task_id: None,
            attachments: None,
            kind: None,
            tool_name: None,
            tool_status: None,
            tool_input: None,
            tool_output: None,
            metadata: None,
        }
    }
}

/// Summary left behind when old messages are compressed out of a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompressedHistory {
    pub summary: String,
    /// How many messages the summary replaced (cumulative).
    pub message_count: usize,
    pub compressed_at: u64,
}

/// Free-form per-session context.
///
/// Known keys are typed; everything else round-trips through `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionContext {
    /// "root" or "runtime"; runtime sessions may instead carry parent ids.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_tier: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_session_id: Option<SessionId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root_session_id: Option<SessionId>,
    /// Owning agent for runtime sub-sessions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_agent_id: Option<ModuleId>,
    #[serde(default)]
    pub paused: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compressed_history: Option<CompressedHistory>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

/// A persisted session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: SessionId,
    pub name: String,
    pub project_path: String,
    pub created_at: u64,
    pub updated_at: u64,
    pub last_accessed_at: u64,
    #[serde(default)]
    pub messages: Vec<SessionMessage>,
    #[serde(default)]
    pub active_workflows: Vec<WorkflowId>,
    #[serde(default)]
    pub context: SessionContext,
}

impl Session {
    pub fn new(
        id: SessionId,
        name: impl Into<String>,
        project_path: impl Into<String>,
        now_ms: u64,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            project_path: project_path.into(),
            created_at: now_ms,
            updated_at: now_ms,
            last_accessed_at: now_ms,
            messages: Vec::new(),
            active_workflows: Vec::new(),
            context: SessionContext::default(),
        }
    }

    /// A runtime sub-session is owned by one agent for the lifetime of a turn.
    pub fn is_runtime(&self) -> bool {
        self.context.session_tier.as_deref() == Some("runtime")
            || self.context.parent_session_id.is_some()
            || self.context.root_session_id.is_some()
    }

    /// Append a message, clamping its timestamp so the per-session sequence
    /// stays nondecreasing.
    pub fn push_message(&mut self, mut message: SessionMessage) {
        if let Some(last) = self.messages.last() {
            if message.timestamp < last.timestamp {
                message.timestamp = last.timestamp;
            }
        }
        self.updated_at = self.updated_at.max(message.timestamp);
        self.messages.push(message);
    }

    /// Track a workflow id; `active_workflows` behaves as a set.
    pub fn add_workflow(&mut self, id: WorkflowId) {
        if !self.active_workflows.contains(&id) {
            self.active_workflows.push(id);
        }
    }

    pub fn remove_workflow(&mut self, id: &WorkflowId) {
        self.active_workflows.retain(|w| w != id);
    }
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;
