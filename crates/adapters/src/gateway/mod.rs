// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Gateway session management.
//!
//! A gateway wraps an external LLM CLI as a child process. The daemon writes
//! `request` envelopes to its stdin and correlates `ack`/`result` envelopes
//! from its stdout by request id; `input` and `event` envelopes may arrive
//! unsolicited at any time and are forwarded to an injected channel.

mod process;

pub use process::{GatewayConfig, ProcessGateway};

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
pub mod fake;

use async_trait::async_trait;
use finger_core::{DeliveryMode, ModuleId, RequestId};
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

/// Default wait for the `ack` envelope (async delivery).
pub const ACK_TIMEOUT: Duration = Duration::from_millis(3_000);

/// Default wait for the `result` envelope (sync delivery).
pub const RESULT_TIMEOUT: Duration = Duration::from_millis(60_000);

/// Errors from gateway operations
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("spawn failed: {0}")]
    SpawnFailed(String),

    #[error("ack timeout for {request_id} after {after_ms}ms")]
    AckTimeout { request_id: RequestId, after_ms: u64 },

    #[error("result timeout for {request_id} after {after_ms}ms")]
    ResultTimeout { request_id: RequestId, after_ms: u64 },

    #[error("gateway request {request_id} failed: {error}")]
    RequestFailed { request_id: RequestId, error: String },

    #[error("gateway process exited: {reason}")]
    ProcessExited { reason: String },

    #[error("gateway stdin closed")]
    WritableClosed,

    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Successful completion of a gateway request.
#[derive(Debug, Clone, PartialEq)]
pub enum GatewayReply {
    /// Async delivery: the gateway acknowledged receipt.
    Accepted {
        request_id: RequestId,
        accepted: bool,
        gateway_id: ModuleId,
        message: Option<String>,
    },
    /// Sync delivery: the gateway finished the request.
    Completed {
        request_id: RequestId,
        output: Option<Value>,
    },
}

impl GatewayReply {
    pub fn output(&self) -> Option<&Value> {
        match self {
            GatewayReply::Completed { output, .. } => output.as_ref(),
            GatewayReply::Accepted { .. } => None,
        }
    }
}

/// A gateway the daemon can send requests to.
#[async_trait]
pub trait GatewayAdapter: Clone + Send + Sync + 'static {
    /// Deliver one message. Sync mode resolves with the result envelope;
    /// async mode resolves with the ack envelope.
    async fn request(
        &self,
        message: Value,
        mode: DeliveryMode,
    ) -> Result<GatewayReply, GatewayError>;

    /// Stop the child process, rejecting all pending requests.
    async fn stop(&self);

    /// Whether a child process is currently alive.
    fn is_running(&self) -> bool;
}
