// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::event_bus::EventBus;
use finger_core::{EventType, FakeClock, MessageId, MonotonicStamper};
use finger_hub::MessageHub;
use tempfile::tempdir;

struct Harness {
    hub: Arc<MessageHub>,
    events: Arc<EventBus>,
    workflows: Arc<WorkflowStore>,
    checkpoints: Arc<CheckpointStore>,
    minter: Minter,
    _dir: tempfile::TempDir,
}

fn harness() -> Harness {
    let dir = tempdir().unwrap();
    let minter = Minter::new(MonotonicStamper::new(FakeClock::at(1_000)));
    Harness {
        hub: Arc::new(MessageHub::new(minter.clone())),
        events: Arc::new(EventBus::new(minter.clone())),
        workflows: Arc::new(WorkflowStore::new(dir.path().join("workflows"))),
        checkpoints: Arc::new(CheckpointStore::new(dir.path().join("session-states"))),
        minter,
        _dir: dir,
    }
}

fn orchestrator_module(harness: &Harness, llm: Arc<dyn LlmTurn>) -> OrchestratorModule {
    OrchestratorModule::new(
        ModuleId::new("chat-codex-gateway"),
        harness.minter.clone(),
        llm,
        Arc::clone(&harness.hub),
        Arc::clone(&harness.events),
        Arc::clone(&harness.workflows),
        Arc::clone(&harness.checkpoints),
    )
}

fn chat_message(harness: &Harness, payload: Value) -> Message {
    Message::new(
        MessageId::new(harness.minter.mint("msg")),
        "chat",
        harness.minter.now_ms(),
        ModuleId::new("http"),
        payload,
    )
}

#[tokio::test]
async fn mock_plan_llm_completes_an_epic_through_the_hub() {
    let harness = harness();
    harness.hub.register_output(
        ModuleId::new(DEFAULT_EXECUTOR),
        Arc::new(MockExecutor::new("success")),
        finger_hub::RegisterOptions::kind("executor").single_writer(),
    );
    let module = orchestrator_module(&harness, Arc::new(MockPlanLlm::new("success")));

    let result = module
        .handle(chat_message(&harness, json!({"text": "write hello"})))
        .await
        .unwrap();

    assert_eq!(result["status"], "completed");
    assert_eq!(result["rounds"], 3);
    assert_eq!(result["completed"], 1);
    assert_eq!(result["failed"], 0);

    // The workflow record was persisted with the same outcome.
    let workflow_id = finger_core::WorkflowId::new(result["workflowId"].as_str().unwrap());
    let record = harness.workflows.load(&workflow_id).unwrap().unwrap();
    assert_eq!(record.status, WorkflowStatus::Completed);
    assert_eq!(record.round, 3);

    // Lifecycle events were emitted.
    let types: Vec<EventType> = harness
        .events
        .recent(100)
        .iter()
        .map(|e| e.event_type)
        .collect();
    assert!(types.contains(&EventType::WorkflowStarted));
    assert!(types.contains(&EventType::PlanUpdated));
    assert!(types.contains(&EventType::TaskCompleted));
    assert!(types.contains(&EventType::WorkflowCompleted));
}

#[tokio::test]
async fn failing_mock_plan_marks_the_workflow_failed() {
    let harness = harness();
    harness.hub.register_output(
        ModuleId::new(DEFAULT_EXECUTOR),
        Arc::new(MockExecutor::new("failure")),
        finger_hub::RegisterOptions::kind("executor").single_writer(),
    );
    let module = orchestrator_module(&harness, Arc::new(MockPlanLlm::new("failure")));

    let result = module
        .handle(chat_message(&harness, json!({"text": "write hello"})))
        .await
        .unwrap();

    assert_eq!(result["status"], "failed");
    assert_eq!(result["failed"], 1);
    assert_eq!(result["reason"], "mock failure");
}

#[tokio::test]
async fn session_id_in_payload_enables_checkpoints() {
    let harness = harness();
    harness.hub.register_output(
        ModuleId::new(DEFAULT_EXECUTOR),
        Arc::new(MockExecutor::new("success")),
        finger_hub::RegisterOptions::kind("executor").single_writer(),
    );
    let module = orchestrator_module(&harness, Arc::new(MockPlanLlm::new("success")));

    module
        .handle(chat_message(
            &harness,
            json!({"text": "write hello", "sessionId": "session-77"}),
        ))
        .await
        .unwrap();

    let latest = harness
        .checkpoints
        .latest_for_session(&finger_core::SessionId::new("session-77"))
        .unwrap();
    assert!(latest.is_some());
}

#[tokio::test]
async fn mock_executor_failure_shape() {
    let executor = MockExecutor::new("failure");
    let harness = harness();
    let result = executor
        .handle(chat_message(&harness, json!({"taskId": "t9"})))
        .await
        .unwrap();
    assert_eq!(result["success"], false);
    assert!(result["error"].as_str().unwrap().contains("t9"));
}

#[tokio::test]
async fn mock_plan_llm_replays_fixed_sequence() {
    let llm = MockPlanLlm::new("success");
    let first = llm.complete("p").await.unwrap();
    assert!(first.contains("PLAN"));
    let second = llm.complete("p").await.unwrap();
    assert!(second.contains("DISPATCH"));
    let third = llm.complete("p").await.unwrap();
    assert!(third.contains("COMPLETE"));
    // Stays on COMPLETE for any further round.
    assert!(llm.complete("p").await.unwrap().contains("COMPLETE"));
}
