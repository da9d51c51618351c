// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scripted gateway for tests.

use super::{GatewayAdapter, GatewayError, GatewayReply};
use async_trait::async_trait;
use finger_core::{DeliveryMode, ModuleId, RequestId};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// One recorded call to the fake gateway.
#[derive(Debug, Clone, PartialEq)]
pub struct GatewayCall {
    pub message: Value,
    pub mode: DeliveryMode,
}

enum Scripted {
    Ack { accepted: bool, message: Option<String> },
    Output(Value),
    Failure(String),
    Exited(String),
}

/// Gateway that replays a scripted sequence of replies and records calls.
#[derive(Clone, Default)]
pub struct FakeGateway {
    calls: Arc<Mutex<Vec<GatewayCall>>>,
    script: Arc<Mutex<VecDeque<Scripted>>>,
    counter: Arc<AtomicU64>,
    running: Arc<AtomicBool>,
}

impl FakeGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script an async-mode acknowledgement.
    pub fn push_ack(&self, accepted: bool) {
        self.script.lock().push_back(Scripted::Ack {
            accepted,
            message: None,
        });
    }

    /// Script a successful sync-mode result.
    pub fn push_output(&self, output: Value) {
        self.script.lock().push_back(Scripted::Output(output));
    }

    /// Script a failed sync-mode result.
    pub fn push_failure(&self, error: impl Into<String>) {
        self.script.lock().push_back(Scripted::Failure(error.into()));
    }

    /// Script a process-exit rejection.
    pub fn push_exited(&self, reason: impl Into<String>) {
        self.script.lock().push_back(Scripted::Exited(reason.into()));
    }

    pub fn calls(&self) -> Vec<GatewayCall> {
        self.calls.lock().clone()
    }

    fn next_request_id(&self) -> RequestId {
        let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        RequestId::new(format!("fake-{n}"))
    }
}

#[async_trait]
impl GatewayAdapter for FakeGateway {
    async fn request(
        &self,
        message: Value,
        mode: DeliveryMode,
    ) -> Result<GatewayReply, GatewayError> {
        self.running.store(true, Ordering::SeqCst);
        self.calls.lock().push(GatewayCall {
            message,
            mode,
        });
        let request_id = self.next_request_id();
        let scripted = self.script.lock().pop_front();
        match scripted {
            Some(Scripted::Ack { accepted, message }) => Ok(GatewayReply::Accepted {
                request_id,
                accepted,
                gateway_id: ModuleId::new("fake-gateway"),
                message,
            }),
            Some(Scripted::Output(output)) => Ok(GatewayReply::Completed {
                request_id,
                output: Some(output),
            }),
            Some(Scripted::Failure(error)) => {
                Err(GatewayError::RequestFailed { request_id, error })
            }
            Some(Scripted::Exited(reason)) => {
                self.running.store(false, Ordering::SeqCst);
                Err(GatewayError::ProcessExited { reason })
            }
            None => Err(GatewayError::ResultTimeout {
                request_id,
                after_ms: 0,
            }),
        }
    }

    async fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
#[path = "fake_tests.rs"]
mod tests;
