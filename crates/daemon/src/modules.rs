// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Module wiring: the orchestrator input module and the executor outputs the
//! daemon hosts by default.

use crate::env;
use crate::event_bus::EventBus;
use async_trait::async_trait;
use finger_adapters::{GatewayConfig, ProcessGateway};
use finger_core::{
    EpicId, EventType, LoopState, Message, Minter, ModuleId, SessionId, WorkflowId,
};
use finger_engine::{
    EpicOutcome, ExecutorModule, GatewayLlm, HubDispatcher, LlmTurn, LoopConfig, Orchestrator,
    RunStatus,
};
use finger_hub::{HandlerError, MessageHandler, MessageHub, RegisterOptions};
use finger_storage::{CheckpointStore, WorkflowRecord, WorkflowStatus, WorkflowStore};
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::Arc;

/// Default executor module id.
pub const DEFAULT_EXECUTOR: &str = "executor-1";

/// LLM that replays a fixed plan/dispatch/complete (or fail) sequence.
/// Activated by `FINGER_MOCK_PLAN_OUTCOME` for smoke testing without a real
/// gateway binary.
pub struct MockPlanLlm {
    succeed: bool,
    round: parking_lot::Mutex<u32>,
}

impl MockPlanLlm {
    pub fn new(outcome: &str) -> Self {
        Self {
            succeed: outcome != "failure",
            round: parking_lot::Mutex::new(0),
        }
    }
}

#[async_trait]
impl LlmTurn for MockPlanLlm {
    async fn complete(&self, _prompt: &str) -> Result<String, String> {
        let mut round = self.round.lock();
        *round += 1;
        Ok(match (*round, self.succeed) {
            (1, _) => r#"{"thought":"decompose","action":"PLAN","params":{"tasks":[{"id":"t1","description":"write hello"}]}}"#.to_string(),
            (2, _) => r#"{"thought":"run","action":"DISPATCH","params":{"taskId":"t1"}}"#.to_string(),
            (_, true) => r#"{"thought":"done","action":"COMPLETE","params":{"summary":"done"}}"#.to_string(),
            (_, false) => r#"{"thought":"hopeless","action":"FAIL","params":{"reason":"mock failure"}}"#.to_string(),
        })
    }
}

/// Executor handler with a scripted outcome
/// (`FINGER_MOCK_EXEC_OUTCOME=success|failure`).
pub struct MockExecutor {
    succeed: bool,
}

impl MockExecutor {
    pub fn new(outcome: &str) -> Self {
        Self {
            succeed: outcome != "failure",
        }
    }
}

#[async_trait]
impl MessageHandler for MockExecutor {
    async fn handle(&self, message: Message) -> Result<Value, HandlerError> {
        if self.succeed {
            Ok(json!({"success": true, "output": "hello"}))
        } else {
            Ok(json!({
                "success": false,
                "error": format!("mock executor failure for {}", message.payload["taskId"]),
            }))
        }
    }

    fn blocking(&self) -> bool {
        true
    }
}

/// The primary orchestrator input module.
///
/// A delivered message is one Epic: the handler runs the full ReAct loop and
/// returns its outcome, so it registers as a blocking, single-writer module.
pub struct OrchestratorModule {
    id: ModuleId,
    minter: Minter,
    llm: Arc<dyn LlmTurn>,
    hub: Arc<MessageHub>,
    events: Arc<EventBus>,
    workflows: Arc<WorkflowStore>,
    checkpoints: Arc<CheckpointStore>,
    config: LoopConfig,
}

impl OrchestratorModule {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: ModuleId,
        minter: Minter,
        llm: Arc<dyn LlmTurn>,
        hub: Arc<MessageHub>,
        events: Arc<EventBus>,
        workflows: Arc<WorkflowStore>,
        checkpoints: Arc<CheckpointStore>,
    ) -> Self {
        Self {
            id,
            minter,
            llm,
            hub,
            events,
            workflows,
            checkpoints,
            config: LoopConfig::default(),
        }
    }

    pub fn with_config(mut self, config: LoopConfig) -> Self {
        self.config = config;
        self
    }

    fn save_workflow(
        &self,
        workflow_id: &WorkflowId,
        epic_id: &EpicId,
        session_id: Option<&SessionId>,
        outcome: &EpicOutcome,
    ) {
        let status = match outcome.status {
            RunStatus::Completed => WorkflowStatus::Completed,
            RunStatus::Failed => WorkflowStatus::Failed,
            RunStatus::Escalated => WorkflowStatus::Running,
        };
        let record = WorkflowRecord {
            id: workflow_id.clone(),
            epic_id: epic_id.clone(),
            session_id: session_id.cloned(),
            status,
            round: outcome.rounds,
            completed: outcome.completed,
            failed: outcome.failed,
            reason: outcome.reason.clone(),
            updated_at: self.minter.now_ms(),
        };
        if let Err(e) = self.workflows.save(&record) {
            tracing::warn!(error = %e, "failed to save workflow record");
        }
    }
}

#[async_trait]
impl MessageHandler for OrchestratorModule {
    async fn handle(&self, message: Message) -> Result<Value, HandlerError> {
        let user_task = message
            .payload
            .get("text")
            .or_else(|| message.payload.get("task"))
            .or_else(|| message.payload.get("content"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| message.payload.to_string());

        let session_id = message
            .payload
            .get("sessionId")
            .and_then(Value::as_str)
            .map(SessionId::new);

        let epic_id = EpicId::new(self.minter.mint("epic"));
        let workflow_id = WorkflowId::new(self.minter.mint("wf"));

        self.events.emit(
            EventType::WorkflowStarted,
            json!({"workflowId": workflow_id, "epicId": epic_id, "task": user_task}),
        );

        let dispatcher = Arc::new(HubDispatcher::new(
            Arc::clone(&self.hub),
            self.id.clone(),
            ModuleId::new(DEFAULT_EXECUTOR),
        ));
        let sink_events = Arc::clone(&self.events);
        let mut orchestrator = Orchestrator::new(
            Arc::clone(&self.llm),
            dispatcher,
            self.minter.clone(),
        )
        .with_config(self.config.clone())
        .with_events(Arc::new(move |event_type, payload| {
            sink_events.emit(event_type, payload);
        }));
        if let Some(session) = &session_id {
            orchestrator =
                orchestrator.with_checkpoints(Arc::clone(&self.checkpoints), session.clone());
        }

        let mut state = LoopState::new(epic_id.clone(), user_task);
        let outcome = orchestrator.run_epic(&mut state).await;

        self.save_workflow(&workflow_id, &epic_id, session_id.as_ref(), &outcome);
        let (event_type, status) = match outcome.status {
            RunStatus::Completed => (EventType::WorkflowCompleted, "completed"),
            RunStatus::Failed => (EventType::WorkflowFailed, "failed"),
            RunStatus::Escalated => (EventType::WorkflowProgress, "escalated"),
        };
        self.events.emit(
            event_type,
            json!({"workflowId": workflow_id, "status": status, "rounds": outcome.rounds}),
        );

        Ok(json!({
            "workflowId": workflow_id,
            "epicId": epic_id,
            "status": status,
            "rounds": outcome.rounds,
            "completed": outcome.completed,
            "failed": outcome.failed,
            "reason": outcome.reason,
        }))
    }

    fn blocking(&self) -> bool {
        true
    }
}

/// Build the LLM for the orchestrator: a mock when scripted by env, else a
/// gateway subprocess from the gateway directory.
pub fn orchestrator_llm(minter: &Minter, gateway_dir: Option<&PathBuf>) -> Arc<dyn LlmTurn> {
    if let Some(outcome) = env::mock_plan_outcome() {
        return Arc::new(MockPlanLlm::new(&outcome));
    }
    let program = gateway_program(gateway_dir, "orchestrator-gateway");
    let config = GatewayConfig::new(ModuleId::new("orchestrator-gateway"), program);
    let (gateway, _inbound) = ProcessGateway::new(config, minter.clone());
    Arc::new(GatewayLlm::new(gateway))
}

/// Register the default executor output: mock when scripted by env, else a
/// gateway-backed executor.
pub fn install_executor(hub: &Arc<MessageHub>, minter: &Minter, gateway_dir: Option<&PathBuf>) {
    let id = ModuleId::new(DEFAULT_EXECUTOR);
    let opts = RegisterOptions::kind("executor").single_writer();
    match env::mock_exec_outcome() {
        Some(outcome) => {
            hub.register_output(id, Arc::new(MockExecutor::new(&outcome)), opts);
        }
        None => {
            let program = gateway_program(gateway_dir, "executor-gateway");
            let config = GatewayConfig::new(id.clone(), program);
            let (gateway, _inbound) = ProcessGateway::new(config, minter.clone());
            hub.register_output(id.clone(), Arc::new(ExecutorModule::new(id, gateway)), opts);
        }
    }
}

fn gateway_program(gateway_dir: Option<&PathBuf>, name: &str) -> String {
    match gateway_dir {
        Some(dir) => dir.join(name).to_string_lossy().to_string(),
        None => name.to_string(),
    }
}

#[cfg(test)]
#[path = "modules_tests.rs"]
mod tests;
