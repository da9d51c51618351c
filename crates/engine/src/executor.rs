// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Executor module: a hub output that runs dispatched tasks through an LLM
//! gateway and reports a structured result.

use async_trait::async_trait;
use finger_adapters::{GatewayAdapter, GatewayError};
use finger_core::{DeliveryMode, Message, ModuleId};
use finger_hub::{HandlerError, MessageHandler};
use serde_json::{json, Value};

/// Wraps a gateway as a blocking hub module. Executor failures come back as
/// `{success:false, error}` values so the orchestrator observes them instead
/// of a transport error.
pub struct ExecutorModule<G> {
    id: ModuleId,
    gateway: G,
}

impl<G> ExecutorModule<G> {
    pub fn new(id: ModuleId, gateway: G) -> Self {
        Self { id, gateway }
    }

    pub fn id(&self) -> &ModuleId {
        &self.id
    }
}

#[async_trait]
impl<G: GatewayAdapter> MessageHandler for ExecutorModule<G> {
    async fn handle(&self, message: Message) -> Result<Value, HandlerError> {
        match self
            .gateway
            .request(message.payload.clone(), DeliveryMode::Sync)
            .await
        {
            Ok(reply) => Ok(json!({
                "success": true,
                "output": reply.output().cloned().unwrap_or(Value::Null),
            })),
            Err(e @ GatewayError::SpawnFailed(_)) => {
                // The gateway cannot come up at all; surface as a handler
                // failure so the supervisor notices.
                Err(HandlerError(e.to_string()))
            }
            Err(e) => Ok(json!({
                "success": false,
                "error": e.to_string(),
            })),
        }
    }

    fn blocking(&self) -> bool {
        true
    }

    fn is_healthy(&self) -> bool {
        true
    }
}

#[cfg(test)]
#[path = "executor_tests.rs"]
mod tests;
