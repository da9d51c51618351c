// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Module registry and route table.
//!
//! Entries describe registered modules; route rules map message patterns to
//! destination modules. The route list is kept sorted by priority descending,
//! stable by insertion order for ties, so matching is a linear scan.

use finger_core::{Message, ModuleId};
use indexmap::IndexMap;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

finger_core::define_id! {
    /// Unique identifier for a route rule.
    pub struct RouteId;
}

/// Direction of a registered module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModuleType {
    Input,
    Output,
}

/// Routing status of a registered module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryStatus {
    Active,
    Paused,
    Error,
}

/// Descriptor of a registered module.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryEntry {
    pub id: ModuleId,
    #[serde(rename = "type")]
    pub module_type: ModuleType,
    /// Implementation tag ("gateway", "orchestrator", "echo", ...).
    pub kind: String,
    #[serde(default)]
    pub config: Value,
    pub status: EntryStatus,
    /// Epoch milliseconds of the last heartbeat report.
    pub last_heartbeat: u64,
}

impl RegistryEntry {
    pub fn new(id: ModuleId, module_type: ModuleType, kind: impl Into<String>, now_ms: u64) -> Self {
        Self {
            id,
            module_type,
            kind: kind.into(),
            config: Value::Null,
            status: EntryStatus::Active,
            last_heartbeat: now_ms,
        }
    }

    pub fn with_config(mut self, config: Value) -> Self {
        self.config = config;
        self
    }
}

type PredicateFn = dyn Fn(&Message) -> bool + Send + Sync;

/// A route pattern.
///
/// `Kind` compares against the message type (or explicit route name) by
/// string equality; `Regex` tests against the JSON serialization of the whole
/// message; `Predicate` calls an arbitrary function. Predicates are
/// process-local and are dropped from snapshots.
#[derive(Clone)]
pub enum Pattern {
    Kind(String),
    Regex(Regex),
    Predicate(Arc<PredicateFn>),
}

impl Pattern {
    pub fn kind(s: impl Into<String>) -> Self {
        Pattern::Kind(s.into())
    }

    pub fn regex(source: &str) -> Result<Self, regex::Error> {
        Ok(Pattern::Regex(Regex::new(source)?))
    }

    pub fn predicate(f: impl Fn(&Message) -> bool + Send + Sync + 'static) -> Self {
        Pattern::Predicate(Arc::new(f))
    }

    pub fn matches(&self, message: &Message) -> bool {
        match self {
            // A message without a type never matches a string pattern.
            Pattern::Kind(p) => {
                !message.kind.is_empty()
                    && (message.kind == *p || message.route.as_deref() == Some(p.as_str()))
            }
            Pattern::Regex(re) => serde_json::to_string(message)
                .map(|json| re.is_match(&json))
                .unwrap_or(false),
            Pattern::Predicate(f) => f(message),
        }
    }

    /// Serializable form, `None` for predicates.
    pub fn spec(&self) -> Option<PatternSpec> {
        match self {
            Pattern::Kind(s) => Some(PatternSpec::Kind(s.clone())),
            Pattern::Regex(re) => Some(PatternSpec::Regex(re.as_str().to_string())),
            Pattern::Predicate(_) => None,
        }
    }
}

impl std::fmt::Debug for Pattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Pattern::Kind(s) => write!(f, "Kind({s:?})"),
            Pattern::Regex(re) => write!(f, "Regex({:?})", re.as_str()),
            Pattern::Predicate(_) => write!(f, "Predicate(..)"),
        }
    }
}

/// Serializable pattern, as stored in snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", content = "value", rename_all = "lowercase")]
pub enum PatternSpec {
    Kind(String),
    Regex(String),
}

impl TryFrom<PatternSpec> for Pattern {
    type Error = regex::Error;

    fn try_from(spec: PatternSpec) -> Result<Self, Self::Error> {
        match spec {
            PatternSpec::Kind(s) => Ok(Pattern::Kind(s)),
            PatternSpec::Regex(source) => Pattern::regex(&source),
        }
    }
}

/// Match criteria of a route rule. Set fields are conjunctive; a rule with no
/// criteria matches nothing.
#[derive(Debug, Clone, Default)]
pub struct RouteMatch {
    /// Equality match on the message type / route name.
    pub kind: Option<String>,
    /// Equality match on the message source.
    pub source: Option<ModuleId>,
    pub pattern: Option<Pattern>,
}

impl RouteMatch {
    pub fn for_kind(kind: impl Into<String>) -> Self {
        Self {
            kind: Some(kind.into()),
            ..Self::default()
        }
    }

    pub fn for_source(source: ModuleId) -> Self {
        Self {
            source: Some(source),
            ..Self::default()
        }
    }

    pub fn for_pattern(pattern: Pattern) -> Self {
        Self {
            pattern: Some(pattern),
            ..Self::default()
        }
    }

    pub fn matches(&self, message: &Message) -> bool {
        if self.kind.is_none() && self.source.is_none() && self.pattern.is_none() {
            return false;
        }
        if let Some(kind) = &self.kind {
            if message.kind.is_empty()
                || (message.kind != *kind && message.route.as_deref() != Some(kind.as_str()))
            {
                return false;
            }
        }
        if let Some(source) = &self.source {
            if &message.source != source {
                return false;
            }
        }
        if let Some(pattern) = &self.pattern {
            if !pattern.matches(message) {
                return false;
            }
        }
        true
    }
}

/// A pattern → destinations rule with priority.
#[derive(Debug, Clone)]
pub struct RouteRule {
    pub id: RouteId,
    pub matcher: RouteMatch,
    pub dest: Vec<ModuleId>,
    pub priority: i32,
    /// Insertion sequence, for stable ordering among equal priorities.
    pub(crate) seq: u64,
}

/// Serializable route rule, as stored in snapshots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteSpec {
    pub id: RouteId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<ModuleId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<PatternSpec>,
    pub dest: Vec<ModuleId>,
    pub priority: i32,
}

/// Serialized registry + routes, the unit of crash-recovery persistence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrySnapshot {
    pub entries: Vec<RegistryEntry>,
    pub routes: Vec<RouteSpec>,
    pub saved_at: u64,
}

/// The registry: module entries plus the priority-sorted route table.
#[derive(Debug, Default)]
pub struct Registry {
    entries: IndexMap<ModuleId, RegistryEntry>,
    routes: Vec<RouteRule>,
    next_seq: u64,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    // -- entries --

    /// Insert or replace an entry. Returns the previous entry if any.
    pub fn upsert_entry(&mut self, entry: RegistryEntry) -> Option<RegistryEntry> {
        self.entries.insert(entry.id.clone(), entry)
    }

    pub fn remove_entry(&mut self, id: &ModuleId) -> Option<RegistryEntry> {
        self.entries.shift_remove(id)
    }

    pub fn entry(&self, id: &ModuleId) -> Option<&RegistryEntry> {
        self.entries.get(id)
    }

    pub fn entries(&self) -> impl Iterator<Item = &RegistryEntry> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn set_status(&mut self, id: &ModuleId, status: EntryStatus) -> bool {
        match self.entries.get_mut(id) {
            Some(entry) => {
                entry.status = status;
                true
            }
            None => false,
        }
    }

    pub fn touch_heartbeat(&mut self, id: &ModuleId, now_ms: u64) -> bool {
        match self.entries.get_mut(id) {
            Some(entry) => {
                entry.last_heartbeat = now_ms;
                true
            }
            None => false,
        }
    }

    // -- routes --

    /// Insert a rule, keeping the table sorted by priority descending and
    /// stable by insertion for ties.
    pub fn add_route(&mut self, id: RouteId, matcher: RouteMatch, dest: Vec<ModuleId>, priority: i32) {
        let seq = self.next_seq;
        self.next_seq += 1;
        let rule = RouteRule {
            id,
            matcher,
            dest,
            priority,
            seq,
        };
        let pos = self
            .routes
            .iter()
            .position(|r| r.priority < rule.priority)
            .unwrap_or(self.routes.len());
        self.routes.insert(pos, rule);
    }

    pub fn remove_route(&mut self, id: &RouteId) -> Option<RouteRule> {
        let pos = self.routes.iter().position(|r| &r.id == id)?;
        Some(self.routes.remove(pos))
    }

    pub fn routes(&self) -> &[RouteRule] {
        &self.routes
    }

    /// Rules matching the message, in priority order.
    pub fn matching_routes(&self, message: &Message) -> Vec<RouteRule> {
        self.routes
            .iter()
            .filter(|r| r.matcher.matches(message))
            .cloned()
            .collect()
    }

    // -- persistence --

    pub fn snapshot(&self, saved_at: u64) -> RegistrySnapshot {
        let routes = self
            .routes
            .iter()
            .filter_map(|r| {
                // Predicate patterns cannot be serialized; such rules are
                // re-registered by their owning module on startup.
                let pattern = match &r.matcher.pattern {
                    Some(p) => match p.spec() {
                        Some(spec) => Some(spec),
                        None => return None,
                    },
                    None => None,
                };
                Some(RouteSpec {
                    id: r.id.clone(),
                    kind: r.matcher.kind.clone(),
                    source: r.matcher.source.clone(),
                    pattern,
                    dest: r.dest.clone(),
                    priority: r.priority,
                })
            })
            .collect();
        RegistrySnapshot {
            entries: self.entries.values().cloned().collect(),
            routes,
            saved_at,
        }
    }

    /// Rebuild a registry from a snapshot. Regex patterns that no longer
    /// compile drop their rule with a warning rather than failing recovery.
    pub fn restore(snapshot: RegistrySnapshot) -> Self {
        let mut registry = Self::new();
        for entry in snapshot.entries {
            registry.upsert_entry(entry);
        }
        for spec in snapshot.routes {
            let pattern = match spec.pattern {
                Some(p) => match Pattern::try_from(p) {
                    Ok(pattern) => Some(pattern),
                    Err(e) => {
                        tracing::warn!(route = %spec.id, error = %e, "dropping route with invalid pattern");
                        continue;
                    }
                },
                None => None,
            };
            registry.add_route(
                spec.id,
                RouteMatch {
                    kind: spec.kind,
                    source: spec.source,
                    pattern,
                },
                spec.dest,
                spec.priority,
            );
        }
        registry
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
