// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Built-in orchestrator actions: PLAN, DISPATCH, COMPLETE, FAIL, CHECKPOINT.

use super::{Dispatcher, EventSink};
use crate::actions::{
    ActionContext, ActionDef, ActionHandler, ActionOutcome, ActionRegistry, ParamKind, ParamSpec,
    RiskLevel, StopReason,
};
use async_trait::async_trait;
use finger_core::{EventType, ModuleId, Phase, TaskId, TaskNode, TaskStatus};
use serde_json::{json, Value};
use std::sync::Arc;

/// Build the orchestrator-role registry.
pub(crate) fn build_registry(dispatcher: Arc<dyn Dispatcher>, events: EventSink) -> ActionRegistry {
    let mut registry = ActionRegistry::new();

    registry.register(ActionDef::new(
        "PLAN",
        "Replace or extend the task graph with new sub-tasks",
        vec![ParamSpec::optional("tasks", ParamKind::Array)],
        Arc::new(PlanAction {
            events: events.clone(),
        }),
    ));

    registry.register(
        ActionDef::new(
            "DISPATCH",
            "Send one ready task to an executor and observe its result",
            vec![
                ParamSpec::optional("taskId", ParamKind::String),
                ParamSpec::optional("executorId", ParamKind::String),
            ],
            Arc::new(DispatchAction {
                dispatcher,
                events: events.clone(),
            }),
        )
        .with_risk(RiskLevel::Medium),
    );

    registry.register(ActionDef::new(
        "COMPLETE",
        "Finish the epic once every task is settled",
        vec![ParamSpec::optional("summary", ParamKind::String)],
        Arc::new(CompleteAction),
    ));

    registry.register(ActionDef::new(
        "FAIL",
        "Abandon the epic",
        vec![ParamSpec::optional("reason", ParamKind::String)],
        Arc::new(FailAction),
    ));

    registry.register(ActionDef::new(
        "CHECKPOINT",
        "Record a health check; may escalate to replanning",
        vec![ParamSpec::optional("trigger", ParamKind::String)],
        Arc::new(CheckpointAction { events }),
    ));

    registry
}

struct PlanAction {
    events: EventSink,
}

#[async_trait]
impl ActionHandler for PlanAction {
    async fn run(&self, params: &Value, ctx: &mut ActionContext<'_>) -> ActionOutcome {
        let tasks = params
            .get("tasks")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        if tasks.is_empty() {
            // No-op plan: does not advance progress.
            return ActionOutcome::ok("plan unchanged (no tasks provided)");
        }

        let mut added = 0usize;
        for entry in &tasks {
            let description = entry
                .get("description")
                .and_then(Value::as_str)
                .unwrap_or("")
                .trim()
                .to_string();
            if description.is_empty() {
                continue;
            }
            let id = entry
                .get("id")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| format!("task-{}", ctx.state.task_graph.len() + added + 1));
            let task_id = TaskId::new(id);
            if ctx.state.task(&task_id).is_some() {
                continue;
            }
            let mut node = TaskNode::new(task_id, description);
            let _ = node.mark_ready();
            ctx.state.task_graph.push(node);
            added += 1;
        }

        if added > 0 && ctx.state.phase == Phase::Planning {
            ctx.state.phase = Phase::Execution;
        }

        let (total, _, _) = ctx.state.counts();
        (self.events)(
            EventType::PlanUpdated,
            json!({"added": added, "total": total}),
        );
        ActionOutcome::ok_with_data(
            format!("planned {added} task(s), {total} total"),
            json!({"added": added, "total": total}),
        )
    }
}

struct DispatchAction {
    dispatcher: Arc<dyn Dispatcher>,
    events: EventSink,
}

#[async_trait]
impl ActionHandler for DispatchAction {
    async fn run(&self, params: &Value, ctx: &mut ActionContext<'_>) -> ActionOutcome {
        let requested = params.get("taskId").and_then(Value::as_str);
        let task = match requested {
            Some(id) => {
                let task_id = TaskId::new(id);
                match ctx.state.task(&task_id) {
                    Some(task) if task.status == TaskStatus::Ready => Some(task.clone()),
                    Some(task) => {
                        return ActionOutcome::error(format!(
                            "task {} is {}, not ready",
                            task.id, task.status
                        ))
                    }
                    None => return ActionOutcome::error(format!("unknown task: {id}")),
                }
            }
            // No taskId: first ready task by insertion order.
            None => ctx.state.first_ready().cloned(),
        };
        let Some(task) = task else {
            return ActionOutcome::error("no ready task to dispatch");
        };

        let assignee = params
            .get("executorId")
            .and_then(Value::as_str)
            .map(ModuleId::new)
            .or_else(|| ctx.state.target_executor_id.clone())
            .unwrap_or_else(|| self.dispatcher.default_executor());

        if let Some(node) = ctx.state.task_mut(&task.id) {
            if node.start(assignee.clone(), ctx.now_ms).is_err() {
                return ActionOutcome::error(format!("task {} cannot start", task.id));
            }
        }
        if ctx.state.phase == Phase::Planning {
            ctx.state.phase = Phase::Execution;
        }
        (self.events)(
            EventType::TaskStarted,
            json!({"taskId": task.id, "assignee": assignee}),
        );

        match self.dispatcher.dispatch(Some(&assignee), &task).await {
            Ok(result) => {
                let success = result
                    .get("success")
                    .and_then(Value::as_bool)
                    .unwrap_or(true);
                if success {
                    if let Some(node) = ctx.state.task_mut(&task.id) {
                        let _ = node.complete(result.clone());
                    }
                    ctx.state.record_completed(task.id.clone());
                    (self.events)(
                        EventType::TaskCompleted,
                        json!({"taskId": task.id, "result": result}),
                    );
                    ActionOutcome::ok_with_data(
                        format!("task {} completed", task.id),
                        result,
                    )
                } else {
                    let error = result
                        .get("error")
                        .and_then(Value::as_str)
                        .unwrap_or("executor reported failure")
                        .to_string();
                    if let Some(node) = ctx.state.task_mut(&task.id) {
                        let _ = node.fail(result.clone());
                    }
                    ctx.state.record_failed(task.id.clone());
                    (self.events)(
                        EventType::TaskFailed,
                        json!({"taskId": task.id, "error": error}),
                    );
                    ActionOutcome::error(format!("task {} failed: {error}", task.id))
                }
            }
            Err(error) => {
                if let Some(node) = ctx.state.task_mut(&task.id) {
                    let _ = node.fail(json!({"error": error}));
                }
                ctx.state.record_failed(task.id.clone());
                (self.events)(
                    EventType::TaskFailed,
                    json!({"taskId": task.id, "error": error}),
                );
                ActionOutcome::error(format!("task {} failed: {error}", task.id))
            }
        }
    }
}

struct CompleteAction;

#[async_trait]
impl ActionHandler for CompleteAction {
    async fn run(&self, params: &Value, ctx: &mut ActionContext<'_>) -> ActionOutcome {
        if !ctx.state.all_tasks_settled() {
            let unfinished = ctx
                .state
                .task_graph
                .iter()
                .filter(|t| !t.status.is_terminal())
                .count();
            // Advisory rejection: the loop continues.
            return ActionOutcome::error(format!(
                "cannot complete: {unfinished} task(s) still unfinished"
            ));
        }
        let summary = params
            .get("summary")
            .and_then(Value::as_str)
            .unwrap_or("epic complete");
        ActionOutcome::stop(StopReason::Complete, summary)
    }
}

struct FailAction;

#[async_trait]
impl ActionHandler for FailAction {
    async fn run(&self, params: &Value, _ctx: &mut ActionContext<'_>) -> ActionOutcome {
        let reason = params
            .get("reason")
            .and_then(Value::as_str)
            .unwrap_or("epic abandoned by orchestrator");
        ActionOutcome::stop(StopReason::Fail, reason)
    }
}

struct CheckpointAction {
    events: EventSink,
}

#[async_trait]
impl ActionHandler for CheckpointAction {
    async fn run(&self, params: &Value, ctx: &mut ActionContext<'_>) -> ActionOutcome {
        let trigger = params
            .get("trigger")
            .and_then(Value::as_str)
            .unwrap_or("manual")
            .to_string();

        ctx.state.checkpoint.total_checks += 1;
        ctx.state.checkpoint.last_trigger = Some(trigger.clone());
        ctx.state.checkpoint.last_check_at = Some(ctx.now_ms);

        let escalate = ctx.state.last_error.is_some()
            && !ctx.state.failed_tasks.is_empty()
            && ctx.state.checkpoint.total_checks > 1;

        if escalate {
            ctx.state.phase = Phase::Planning;
            ctx.state.checkpoint.major_change = true;
            (self.events)(
                EventType::WorkflowProgress,
                json!({"checkpoint": trigger, "escalated": true}),
            );
            return ActionOutcome::stop(
                StopReason::Escalate,
                "checkpoint escalation: replanning required",
            );
        }

        (self.events)(
            EventType::WorkflowProgress,
            json!({"checkpoint": trigger, "escalated": false}),
        );
        ActionOutcome::ok_with_data(
            format!("checkpoint recorded (trigger: {trigger})"),
            json!({"totalChecks": ctx.state.checkpoint.total_checks}),
        )
    }
}

#[cfg(test)]
#[path = "builtin_tests.rs"]
mod tests;
