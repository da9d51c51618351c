// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The routed message type.
//!
//! A [`Message`] is the unit the hub routes between modules. Its payload is
//! opaque to the router; only the envelope fields participate in matching.

use serde::{Deserialize, Serialize};
use serde_json::Value;

crate::define_id! {
    /// Unique identifier for a routed message (process-unique).
    pub struct MessageId;
}

crate::define_id! {
    /// Identifier of a registered input or output module.
    pub struct ModuleId;
}

crate::define_id! {
    /// Opaque handle for a pending completion callback.
    pub struct CallbackId;
}

/// Current message envelope version.
pub const MESSAGE_VERSION: &str = "1.0";

fn default_version() -> String {
    MESSAGE_VERSION.to_string()
}

/// A routed message.
///
/// Envelope fields are immutable after creation; the router never inspects
/// `payload`. `timestamp` is assigned monotonically at creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: MessageId,
    #[serde(default = "default_version")]
    pub version: String,
    /// Message type, matched by string route rules.
    #[serde(rename = "type")]
    pub kind: String,
    pub timestamp: u64,
    pub source: ModuleId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dest: Option<ModuleId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,
    /// Explicit route name, matched by string route rules when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub route: Option<String>,
    /// Attached by `routeToOutput` when the caller supplied a callback.
    #[serde(
        rename = "_callbackId",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub callback_id: Option<CallbackId>,
    #[serde(default)]
    pub payload: Value,
}

impl Message {
    /// Create a message with explicit id and timestamp.
    ///
    /// Callers normally go through [`crate::Minter`]-backed helpers so ids and
    /// timestamps satisfy the uniqueness/monotonicity invariants.
    pub fn new(
        id: MessageId,
        kind: impl Into<String>,
        timestamp: u64,
        source: ModuleId,
        payload: Value,
    ) -> Self {
        Self {
            id,
            version: default_version(),
            kind: kind.into(),
            timestamp,
            source,
            dest: None,
            trace_id: None,
            route: None,
            callback_id: None,
            payload,
        }
    }

    pub fn with_dest(mut self, dest: ModuleId) -> Self {
        self.dest = Some(dest);
        self
    }

    pub fn with_trace_id(mut self, trace_id: impl Into<String>) -> Self {
        self.trace_id = Some(trace_id.into());
        self
    }

    pub fn with_route(mut self, route: impl Into<String>) -> Self {
        self.route = Some(route.into());
        self
    }

    pub fn with_callback_id(mut self, id: CallbackId) -> Self {
        self.callback_id = Some(id);
        self
    }

    /// The string a plain route pattern compares against: the explicit route
    /// name when present, otherwise the message type.
    pub fn route_key(&self) -> &str {
        self.route.as_deref().unwrap_or(&self.kind)
    }
}

#[cfg(test)]
#[path = "message_tests.rs"]
mod tests;
