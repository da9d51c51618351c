// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Tool execution through the daemon.
//!
//! Path: validate the tool exists → policy check → authorization token when
//! required → invoke the handler → emit `tool_call` and
//! `tool_result`/`tool_error` → return a structured result.

use crate::event_bus::EventBus;
use finger_core::{EventType, ModuleId};
use finger_engine::{PolicyError, ToolPolicyStore, ToolSpec};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;

type ToolHandler = Arc<dyn Fn(&Value) -> Result<Value, String> + Send + Sync>;

/// Registry of tool handlers plus the policy gate in front of them.
pub struct ToolRunner {
    policy: Arc<ToolPolicyStore>,
    events: Arc<EventBus>,
    handlers: Mutex<HashMap<String, ToolHandler>>,
}

impl ToolRunner {
    pub fn new(policy: Arc<ToolPolicyStore>, events: Arc<EventBus>) -> Self {
        Self {
            policy,
            events,
            handlers: Mutex::new(HashMap::new()),
        }
    }

    /// Register a tool spec together with its handler.
    pub fn register(
        &self,
        spec: ToolSpec,
        handler: impl Fn(&Value) -> Result<Value, String> + Send + Sync + 'static,
    ) {
        self.handlers
            .lock()
            .insert(spec.name.clone(), Arc::new(handler));
        self.policy.register_tool(spec);
    }

    /// Execute a tool call on behalf of an agent.
    pub fn call(
        &self,
        agent: &ModuleId,
        tool: &str,
        params: &Value,
        token: Option<&str>,
    ) -> Result<Value, PolicyError> {
        self.policy.authorize(agent, tool, token)?;

        let handler = self
            .handlers
            .lock()
            .get(tool)
            .cloned()
            .ok_or_else(|| PolicyError::ToolNotFound(tool.to_string()))?;

        self.events.emit_for_agent(
            EventType::ToolCall,
            agent.clone(),
            json!({"tool": tool, "params": params}),
        );

        match handler(params) {
            Ok(output) => {
                self.events.emit_for_agent(
                    EventType::ToolResult,
                    agent.clone(),
                    json!({"tool": tool, "output": output}),
                );
                Ok(json!({"ok": true, "output": output}))
            }
            Err(error) => {
                self.events.emit_for_agent(
                    EventType::ToolError,
                    agent.clone(),
                    json!({"tool": tool, "error": error}),
                );
                Ok(json!({"ok": false, "error": error}))
            }
        }
    }
}

#[cfg(test)]
#[path = "tools_tests.rs"]
mod tests;
