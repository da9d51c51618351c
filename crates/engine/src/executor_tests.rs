// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use finger_adapters::FakeGateway;
use finger_core::MessageId;

fn task_message(payload: Value) -> Message {
    Message::new(
        MessageId::new("msg-1"),
        "task.execute",
        1,
        ModuleId::new("orchestrator"),
        payload,
    )
}

#[tokio::test]
async fn forwards_task_and_wraps_output() {
    let gateway = FakeGateway::new();
    gateway.push_output(json!({"text": "hello"}));
    let executor = ExecutorModule::new(ModuleId::new("executor-1"), gateway.clone());

    let result = executor
        .handle(task_message(json!({"taskId": "t1", "description": "write hello"})))
        .await
        .unwrap();

    assert_eq!(result["success"], true);
    assert_eq!(result["output"], json!({"text": "hello"}));

    let calls = gateway.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].message["taskId"], "t1");
    assert_eq!(calls[0].mode, DeliveryMode::Sync);
}

#[tokio::test]
async fn gateway_failure_becomes_structured_result() {
    let gateway = FakeGateway::new();
    gateway.push_failure("model refused");
    let executor = ExecutorModule::new(ModuleId::new("executor-1"), gateway);

    let result = executor.handle(task_message(json!({}))).await.unwrap();
    assert_eq!(result["success"], false);
    assert!(result["error"].as_str().unwrap().contains("model refused"));
}

#[tokio::test]
async fn process_exit_becomes_structured_result() {
    let gateway = FakeGateway::new();
    gateway.push_exited("exit code 9");
    let executor = ExecutorModule::new(ModuleId::new("executor-1"), gateway);

    let result = executor.handle(task_message(json!({}))).await.unwrap();
    assert_eq!(result["success"], false);
    assert!(result["error"].as_str().unwrap().contains("exit code 9"));
}

#[tokio::test]
async fn executor_is_a_blocking_handler() {
    let executor = ExecutorModule::new(ModuleId::new("executor-1"), FakeGateway::new());
    assert!(executor.blocking());
    assert!(executor.is_healthy());
    assert_eq!(executor.id(), &ModuleId::new("executor-1"));
}
