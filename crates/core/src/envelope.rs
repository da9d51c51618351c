// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Gateway wire protocol.
//!
//! A gateway subprocess speaks newline-delimited JSON on stdin/stdout, one
//! envelope per line, tagged by `"type"`. Outbound requests are correlated to
//! `ack`/`result` replies by `requestId`; `input` and `event` envelopes may
//! arrive unsolicited at any time.

use crate::message::ModuleId;
use serde::{Deserialize, Serialize};
use serde_json::Value;

crate::define_id! {
    /// Correlates a gateway request with its ack/result envelopes.
    pub struct RequestId;
}

/// How a gateway request completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryMode {
    /// Wait for the `result` envelope.
    Sync,
    /// Wait only for the `ack` envelope; the result arrives later as input.
    Async,
}

/// One line of the gateway stdio protocol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum GatewayEnvelope {
    /// Daemon → gateway: deliver a message.
    #[serde(rename_all = "camelCase")]
    Request {
        request_id: RequestId,
        delivery_mode: DeliveryMode,
        message: Value,
    },

    /// Gateway → daemon: receipt acknowledgement (async mode writes this
    /// before the result).
    #[serde(rename_all = "camelCase")]
    Ack {
        request_id: RequestId,
        accepted: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },

    /// Gateway → daemon: request completion.
    #[serde(rename_all = "camelCase")]
    Result {
        request_id: RequestId,
        success: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        output: Option<Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },

    /// Gateway → daemon: unsolicited inbound message for the hub.
    #[serde(rename_all = "camelCase")]
    Input {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        target: Option<ModuleId>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        sender: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        blocking: Option<bool>,
        message: Value,
    },

    /// Gateway → daemon: unsolicited named event.
    #[serde(rename_all = "camelCase")]
    Event {
        name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        payload: Option<Value>,
    },
}

impl GatewayEnvelope {
    /// Parse one line of the protocol.
    pub fn parse_line(line: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(line.trim())
    }

    /// Serialize to a single line (no trailing newline).
    pub fn to_line(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// The correlation id, for request/ack/result envelopes.
    pub fn request_id(&self) -> Option<&RequestId> {
        match self {
            GatewayEnvelope::Request { request_id, .. }
            | GatewayEnvelope::Ack { request_id, .. }
            | GatewayEnvelope::Result { request_id, .. } => Some(request_id),
            _ => None,
        }
    }
}

#[cfg(test)]
#[path = "envelope_tests.rs"]
mod tests;
