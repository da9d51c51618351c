// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Action registry.
//!
//! Actions are the vocabulary the LLM drives the orchestrator with. Each
//! role gets its own registry; execution validates parameters against the
//! declared specs and always returns a structured outcome, never an error.

use async_trait::async_trait;
use finger_core::LoopState;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Role an action registry is scoped to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Orchestrator,
    Executor,
    Reviewer,
    Searcher,
}

/// Declared kind of an action parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParamKind {
    String,
    Number,
    Boolean,
    Object,
    Array,
}

impl ParamKind {
    fn matches(&self, value: &Value) -> bool {
        match self {
            ParamKind::String => value.is_string(),
            ParamKind::Number => value.is_number(),
            ParamKind::Boolean => value.is_boolean(),
            ParamKind::Object => value.is_object(),
            ParamKind::Array => value.is_array(),
        }
    }

    fn name(&self) -> &'static str {
        match self {
            ParamKind::String => "string",
            ParamKind::Number => "number",
            ParamKind::Boolean => "boolean",
            ParamKind::Object => "object",
            ParamKind::Array => "array",
        }
    }
}

/// One declared parameter of an action.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParamSpec {
    pub name: String,
    pub kind: ParamKind,
    #[serde(default)]
    pub required: bool,
}

impl ParamSpec {
    pub fn required(name: impl Into<String>, kind: ParamKind) -> Self {
        Self {
            name: name.into(),
            kind,
            required: true,
        }
    }

    pub fn optional(name: impl Into<String>, kind: ParamKind) -> Self {
        Self {
            name: name.into(),
            kind,
            required: false,
        }
    }
}

/// Advisory risk classification of an action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

/// Control-flow signal an action can attach to its outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StopReason {
    Complete,
    Fail,
    Escalate,
}

/// Structured result of executing an action.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionOutcome {
    pub success: bool,
    pub observation: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub should_stop: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_reason: Option<StopReason>,
}

impl ActionOutcome {
    pub fn ok(observation: impl Into<String>) -> Self {
        Self {
            success: true,
            observation: observation.into(),
            data: None,
            error: None,
            should_stop: false,
            stop_reason: None,
        }
    }

    pub fn ok_with_data(observation: impl Into<String>, data: Value) -> Self {
        Self {
            data: Some(data),
            ..Self::ok(observation)
        }
    }

    pub fn error(error: impl Into<String>) -> Self {
        let error = error.into();
        Self {
            success: false,
            observation: error.clone(),
            data: None,
            error: Some(error),
            should_stop: false,
            stop_reason: None,
        }
    }

    pub fn stop(reason: StopReason, observation: impl Into<String>) -> Self {
        Self {
            should_stop: true,
            stop_reason: Some(reason),
            ..Self::ok(observation)
        }
    }
}

/// Mutable context handed to action handlers.
pub struct ActionContext<'a> {
    pub state: &'a mut LoopState,
    pub now_ms: u64,
}

/// An executable action.
#[async_trait]
pub trait ActionHandler: Send + Sync {
    async fn run(&self, params: &Value, ctx: &mut ActionContext<'_>) -> ActionOutcome;
}

/// Registered action: metadata plus handler.
#[derive(Clone)]
pub struct ActionDef {
    pub name: String,
    pub description: String,
    pub params: Vec<ParamSpec>,
    pub risk_level: Option<RiskLevel>,
    handler: Arc<dyn ActionHandler>,
}

impl ActionDef {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        params: Vec<ParamSpec>,
        handler: Arc<dyn ActionHandler>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            params,
            risk_level: None,
            handler,
        }
    }

    pub fn with_risk(mut self, risk: RiskLevel) -> Self {
        self.risk_level = Some(risk);
        self
    }
}

/// A role-scoped set of actions.
#[derive(Default, Clone)]
pub struct ActionRegistry {
    actions: HashMap<String, ActionDef>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, def: ActionDef) {
        self.actions.insert(def.name.clone(), def);
    }

    pub fn get(&self, name: &str) -> Option<&ActionDef> {
        self.actions.get(name)
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.actions.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Execute an action by name. Unknown actions and invalid parameters
    /// yield structured failures, not errors.
    pub async fn execute(
        &self,
        name: &str,
        params: &Value,
        ctx: &mut ActionContext<'_>,
    ) -> ActionOutcome {
        let Some(def) = self.actions.get(name) else {
            return ActionOutcome::error(format!("unknown action: {name}"));
        };

        if let Err(problem) = validate_params(&def.params, params) {
            return ActionOutcome::error(format!("invalid params for {name}: {problem}"));
        }

        def.handler.run(params, ctx).await
    }
}

fn validate_params(specs: &[ParamSpec], params: &Value) -> Result<(), String> {
    let object = match params {
        Value::Object(map) => Some(map),
        Value::Null => None,
        other => {
            return Err(format!(
                "params must be an object, got {}",
                kind_of(other)
            ))
        }
    };

    for spec in specs {
        let value = object.and_then(|map| map.get(&spec.name));
        match value {
            None | Some(Value::Null) => {
                if spec.required {
                    return Err(format!("missing required param: {}", spec.name));
                }
            }
            Some(value) => {
                if !spec.kind.matches(value) {
                    return Err(format!(
                        "param {} must be {}, got {}",
                        spec.name,
                        spec.kind.name(),
                        kind_of(value)
                    ));
                }
            }
        }
    }
    Ok(())
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
#[path = "actions_tests.rs"]
mod tests;
