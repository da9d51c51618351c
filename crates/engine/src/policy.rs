// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Tool policy and authorization.
//!
//! Each agent carries an allow/deny policy; tools may additionally require a
//! minted authorization token with a TTL and a redemption budget. Role
//! presets replace an agent's policy wholesale.

use finger_core::{Minter, ModuleId};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Policy check failures
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PolicyError {
    #[error("tool not found: {0}")]
    ToolNotFound(String),

    #[error("tool {tool} denied for agent {agent}")]
    Denied { agent: ModuleId, tool: String },

    #[error("tool {0} requires authorization")]
    AuthorizationRequired(String),

    #[error("authorization token expired")]
    AuthorizationExpired,

    #[error("authorization token used up")]
    AuthorizationUsedUp,

    #[error("authorization token not valid for this agent/tool")]
    AuthorizationInvalid,
}

/// Per-agent tool policy. `denied` always wins; `allowed` supports the `*`
/// wildcard.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolPolicy {
    #[serde(default)]
    pub allowed: Vec<String>,
    #[serde(default)]
    pub denied: Vec<String>,
}

impl ToolPolicy {
    pub fn allow_all() -> Self {
        Self {
            allowed: vec!["*".to_string()],
            denied: Vec::new(),
        }
    }

    pub fn allows(&self, tool: &str) -> bool {
        if self.denied.iter().any(|d| d == tool || d == "*") {
            return false;
        }
        self.allowed.iter().any(|a| a == tool || a == "*")
    }
}

/// Named role presets applied by replacing the agent's policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PolicyRole {
    Orchestrator,
    Executor,
    Reviewer,
    Searcher,
}

impl PolicyRole {
    pub fn template(&self) -> ToolPolicy {
        match self {
            PolicyRole::Orchestrator => ToolPolicy::allow_all(),
            PolicyRole::Executor => ToolPolicy {
                allowed: vec!["*".to_string()],
                denied: vec!["policy.write".to_string()],
            },
            // Reviewers get read-only access.
            PolicyRole::Reviewer => ToolPolicy {
                allowed: vec![
                    "fs.read".to_string(),
                    "search".to_string(),
                    "bd.query".to_string(),
                ],
                denied: vec!["fs.write".to_string(), "shell.exec".to_string()],
            },
            PolicyRole::Searcher => ToolPolicy {
                allowed: vec!["search".to_string(), "fetch".to_string()],
                denied: Vec::new(),
            },
        }
    }
}

/// A registered tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolSpec {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub requires_authorization: bool,
}

/// An issued authorization token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthGrant {
    pub token: String,
    pub agent_id: ModuleId,
    pub tool_name: String,
    pub issued_by: String,
    pub issued_at: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_uses: Option<u32>,
    #[serde(default)]
    pub uses: u32,
}

impl AuthGrant {
    fn expired(&self, now_ms: u64) -> bool {
        match self.ttl_ms {
            Some(ttl) => now_ms.saturating_sub(self.issued_at) > ttl,
            None => false,
        }
    }

    fn used_up(&self) -> bool {
        match self.max_uses {
            Some(max) => self.uses >= max,
            None => false,
        }
    }
}

/// In-memory policy, tool, and token store.
pub struct ToolPolicyStore {
    minter: Minter,
    policies: Mutex<HashMap<ModuleId, ToolPolicy>>,
    tools: Mutex<HashMap<String, ToolSpec>>,
    grants: Mutex<HashMap<String, AuthGrant>>,
}

impl ToolPolicyStore {
    pub fn new(minter: Minter) -> Self {
        Self {
            minter,
            policies: Mutex::new(HashMap::new()),
            tools: Mutex::new(HashMap::new()),
            grants: Mutex::new(HashMap::new()),
        }
    }

    // -- tools --

    pub fn register_tool(&self, spec: ToolSpec) {
        self.tools.lock().insert(spec.name.clone(), spec);
    }

    pub fn tool(&self, name: &str) -> Option<ToolSpec> {
        self.tools.lock().get(name).cloned()
    }

    pub fn tools(&self) -> Vec<ToolSpec> {
        let mut tools: Vec<ToolSpec> = self.tools.lock().values().cloned().collect();
        tools.sort_by(|a, b| a.name.cmp(&b.name));
        tools
    }

    // -- policies --

    pub fn set_policy(&self, agent: ModuleId, policy: ToolPolicy) {
        self.policies.lock().insert(agent, policy);
    }

    /// Replace the agent's policy with a role template.
    pub fn apply_preset(&self, agent: ModuleId, role: PolicyRole) {
        self.set_policy(agent, role.template());
    }

    pub fn policy_for(&self, agent: &ModuleId) -> ToolPolicy {
        self.policies.lock().get(agent).cloned().unwrap_or_default()
    }

    // -- authorization tokens --

    pub fn issue_token(
        &self,
        agent_id: ModuleId,
        tool_name: impl Into<String>,
        issued_by: impl Into<String>,
        ttl_ms: Option<u64>,
        max_uses: Option<u32>,
    ) -> AuthGrant {
        let grant = AuthGrant {
            token: self.minter.mint_random("auth"),
            agent_id,
            tool_name: tool_name.into(),
            issued_by: issued_by.into(),
            issued_at: self.minter.now_ms(),
            ttl_ms,
            max_uses,
            uses: 0,
        };
        self.grants
            .lock()
            .insert(grant.token.clone(), grant.clone());
        grant
    }

    pub fn revoke_token(&self, token: &str) -> bool {
        self.grants.lock().remove(token).is_some()
    }

    pub fn grants(&self) -> Vec<AuthGrant> {
        self.grants.lock().values().cloned().collect()
    }

    /// Full pre-invocation check: tool exists, policy allows, and a valid
    /// token is redeemed when the tool requires authorization.
    pub fn authorize(
        &self,
        agent: &ModuleId,
        tool: &str,
        token: Option<&str>,
    ) -> Result<(), PolicyError> {
        let spec = self
            .tool(tool)
            .ok_or_else(|| PolicyError::ToolNotFound(tool.to_string()))?;

        if !self.policy_for(agent).allows(tool) {
            return Err(PolicyError::Denied {
                agent: agent.clone(),
                tool: tool.to_string(),
            });
        }

        if !spec.requires_authorization {
            return Ok(());
        }

        let token = token.ok_or_else(|| PolicyError::AuthorizationRequired(tool.to_string()))?;
        self.redeem(agent, tool, token)
    }

    /// Redeem one use of a token, checking expiry and the use budget.
    fn redeem(&self, agent: &ModuleId, tool: &str, token: &str) -> Result<(), PolicyError> {
        let now = self.minter.now_ms();
        let mut grants = self.grants.lock();
        let grant = grants
            .get_mut(token)
            .ok_or(PolicyError::AuthorizationInvalid)?;

        if &grant.agent_id != agent || grant.tool_name != tool {
            return Err(PolicyError::AuthorizationInvalid);
        }
        if grant.expired(now) {
            return Err(PolicyError::AuthorizationExpired);
        }
        if grant.used_up() {
            return Err(PolicyError::AuthorizationUsedUp);
        }
        grant.uses += 1;
        Ok(())
    }
}

#[cfg(test)]
#[path = "policy_tests.rs"]
mod tests;
