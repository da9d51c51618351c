// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Orchestrator ReAct loop.
//!
//! Each round builds a state prompt, asks the LLM for one structured action,
//! executes it against the action registry, and checks the termination
//! conditions. Parse failures are retried with a schema hint; repeated
//! failures count as rejections. Checkpoints of the loop state are written
//! every round so an interrupted Epic can resume.

mod builtin;
pub mod parse;
pub mod prompt;

// Test support - only compiled for tests or when explicitly requested
#[cfg(any(test, feature = "test-support"))]
pub mod scripted;

pub use parse::{parse_directive, ActionDirective, ParseError};

use crate::actions::{ActionContext, StopReason};
use async_trait::async_trait;
use finger_adapters::GatewayAdapter;
use finger_core::{
    DeliveryMode, EventType, LoopState, Message, MessageId, Minter, ModuleId, Phase, SessionId,
    TaskNode, TaskStatus,
};
use finger_hub::MessageHub;
use finger_storage::{CheckpointStore, OrchestrationCheckpoint, PhaseRecord};
use serde_json::{json, Value};
use std::sync::Arc;

/// One LLM turn: prompt in, completion text out.
#[async_trait]
pub trait LlmTurn: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String, String>;
}

#[async_trait]
impl LlmTurn for Arc<dyn LlmTurn> {
    async fn complete(&self, prompt: &str) -> Result<String, String> {
        self.as_ref().complete(prompt).await
    }
}

/// LLM turns served by a gateway subprocess.
pub struct GatewayLlm<G> {
    gateway: G,
}

impl<G> GatewayLlm<G> {
    pub fn new(gateway: G) -> Self {
        Self { gateway }
    }
}

#[async_trait]
impl<G: GatewayAdapter> LlmTurn for GatewayLlm<G> {
    async fn complete(&self, prompt: &str) -> Result<String, String> {
        let reply = self
            .gateway
            .request(json!({"type": "prompt", "prompt": prompt}), DeliveryMode::Sync)
            .await
            .map_err(|e| e.to_string())?;
        Ok(match reply.output() {
            Some(Value::String(text)) => text.clone(),
            Some(value) => value
                .get("text")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| value.to_string()),
            None => String::new(),
        })
    }
}

/// Sends a task to an executor and returns its structured result.
#[async_trait]
pub trait Dispatcher: Send + Sync {
    async fn dispatch(&self, executor: Option<&ModuleId>, task: &TaskNode)
        -> Result<Value, String>;

    fn default_executor(&self) -> ModuleId;
}

/// Dispatcher over the message hub: one direct, serialized delivery per
/// executor module.
pub struct HubDispatcher {
    hub: Arc<MessageHub>,
    source: ModuleId,
    default_executor: ModuleId,
}

impl HubDispatcher {
    pub fn new(hub: Arc<MessageHub>, source: ModuleId, default_executor: ModuleId) -> Self {
        Self {
            hub,
            source,
            default_executor,
        }
    }
}

#[async_trait]
impl Dispatcher for HubDispatcher {
    async fn dispatch(
        &self,
        executor: Option<&ModuleId>,
        task: &TaskNode,
    ) -> Result<Value, String> {
        let target = executor.unwrap_or(&self.default_executor);
        let minter = self.hub.minter();
        let message = Message::new(
            MessageId::new(minter.mint("msg")),
            "task.execute",
            minter.now_ms(),
            self.source.clone(),
            json!({"taskId": task.id, "description": task.description}),
        )
        .with_dest(target.clone());

        self.hub
            .send_to_module(target, message)
            .await
            .map_err(|e| e.to_string())
    }

    fn default_executor(&self) -> ModuleId {
        self.default_executor.clone()
    }
}

/// Receives orchestration events (fanned out to the daemon event bus).
pub type EventSink = Arc<dyn Fn(EventType, Value) + Send + Sync>;

fn null_sink() -> EventSink {
    Arc::new(|_, _| {})
}

/// Loop tuning.
#[derive(Debug, Clone)]
pub struct LoopConfig {
    pub max_rounds: u32,
    /// Consecutive no-progress rounds tolerated.
    pub on_stuck: u32,
    /// Consecutive rejected (unparseable) turns tolerated.
    pub max_rejections: u32,
    /// Re-asks with a schema hint after a parse failure.
    pub format_fix_max_retries: u32,
    pub complete_actions: Vec<String>,
    pub fail_actions: Vec<String>,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            max_rounds: 20,
            on_stuck: 3,
            max_rejections: 4,
            format_fix_max_retries: 3,
            complete_actions: vec!["COMPLETE".to_string()],
            fail_actions: vec!["FAIL".to_string()],
        }
    }
}

/// Terminal status of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Completed,
    Failed,
    /// A checkpoint demanded replanning; the loop stopped with the state in
    /// `planning` so the outer driver can reschedule.
    Escalated,
}

/// Result of driving an Epic.
#[derive(Debug, Clone, PartialEq)]
pub struct EpicOutcome {
    pub status: RunStatus,
    pub rounds: u32,
    pub completed: usize,
    pub failed: usize,
    pub reason: Option<String>,
}

/// Drives one Epic to completion.
pub struct Orchestrator<L> {
    llm: L,
    dispatcher: Arc<dyn Dispatcher>,
    minter: Minter,
    config: LoopConfig,
    events: EventSink,
    checkpoints: Option<(Arc<CheckpointStore>, SessionId)>,
}

impl<L: LlmTurn> Orchestrator<L> {
    pub fn new(llm: L, dispatcher: Arc<dyn Dispatcher>, minter: Minter) -> Self {
        Self {
            llm,
            dispatcher,
            minter,
            config: LoopConfig::default(),
            events: null_sink(),
            checkpoints: None,
        }
    }

    pub fn with_config(mut self, config: LoopConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_events(mut self, events: EventSink) -> Self {
        self.events = events;
        self
    }

    pub fn with_checkpoints(mut self, store: Arc<CheckpointStore>, session: SessionId) -> Self {
        self.checkpoints = Some((store, session));
        self
    }

    /// Resume an Epic from a persisted checkpoint.
    pub async fn resume(&self, checkpoint: OrchestrationCheckpoint) -> (LoopState, EpicOutcome) {
        let mut state = checkpoint.state;
        let outcome = self.run_epic(&mut state).await;
        (state, outcome)
    }

    /// Run the loop until a termination condition fires.
    pub async fn run_epic(&self, state: &mut LoopState) -> EpicOutcome {
        let registry = builtin::build_registry(Arc::clone(&self.dispatcher), self.events.clone());
        let mut stuck = 0u32;
        let mut rejections = 0u32;
        let mut recent_errors: Vec<String> = Vec::new();
        let mut phase_history = vec![PhaseRecord {
            phase: state.phase,
            entered_at: self.minter.now_ms(),
        }];

        loop {
            if state.round >= self.config.max_rounds {
                state.phase = Phase::Failed;
                self.save_checkpoint(state, &phase_history);
                return self.outcome(
                    state,
                    RunStatus::Failed,
                    Some("Exceeded max rounds".to_string()),
                );
            }
            state.round += 1;

            let base_prompt = prompt::build_state_prompt(state, &recent_errors);
            let directive = match self.next_directive(&base_prompt).await {
                Ok(directive) => directive,
                Err(detail) => {
                    rejections += 1;
                    push_error(&mut recent_errors, detail);
                    if rejections >= self.config.max_rejections {
                        state.phase = Phase::Failed;
                        self.save_checkpoint(state, &phase_history);
                        return self.outcome(
                            state,
                            RunStatus::Failed,
                            Some("Rejected: repeated unparseable turns".to_string()),
                        );
                    }
                    continue;
                }
            };
            rejections = 0;

            let action = directive.action.trim().to_uppercase();
            let phase_before = state.phase;
            let progress_before = progress_signature(state);

            let outcome = {
                let mut ctx = ActionContext {
                    state: &mut *state,
                    now_ms: self.minter.now_ms(),
                };
                registry.execute(&action, &directive.params, &mut ctx).await
            };

            if let Some(error) = &outcome.error {
                state.last_error = Some(error.clone());
                push_error(&mut recent_errors, error.clone());
            }
            if state.phase != phase_before {
                phase_history.push(PhaseRecord {
                    phase: state.phase,
                    entered_at: self.minter.now_ms(),
                });
            }
            (self.events)(
                EventType::WorkflowProgress,
                json!({
                    "round": state.round,
                    "phase": state.phase,
                    "action": action,
                    "success": outcome.success,
                    "observation": outcome.observation,
                }),
            );
            self.save_checkpoint(state, &phase_history);

            // Termination conditions, in order.
            if outcome.should_stop && outcome.stop_reason == Some(StopReason::Escalate) {
                return self.outcome(state, RunStatus::Escalated, Some(outcome.observation));
            }
            if self.config.complete_actions.contains(&action)
                && outcome.success
                && state.all_tasks_settled()
            {
                state.phase = Phase::Completed;
                self.save_checkpoint(state, &phase_history);
                return self.outcome(state, RunStatus::Completed, Some(outcome.observation));
            }
            if self.config.fail_actions.contains(&action) {
                state.phase = Phase::Failed;
                self.save_checkpoint(state, &phase_history);
                return self.outcome(state, RunStatus::Failed, Some(outcome.observation));
            }

            if progress_signature(state) == progress_before {
                stuck += 1;
            } else {
                stuck = 0;
            }
            if stuck >= self.config.on_stuck {
                state.phase = Phase::Failed;
                self.save_checkpoint(state, &phase_history);
                return self.outcome(
                    state,
                    RunStatus::Failed,
                    Some(format!("Stuck: no progress for {stuck} rounds")),
                );
            }
        }
    }

    /// Ask for one directive, re-prompting with the schema hint on parse
    /// failures. Exhausting the retries is one rejection.
    async fn next_directive(&self, base_prompt: &str) -> Result<ActionDirective, String> {
        let mut prompt = base_prompt.to_string();
        let mut last_error = String::new();
        for attempt in 0..=self.config.format_fix_max_retries {
            let completion = self
                .llm
                .complete(&prompt)
                .await
                .map_err(|e| format!("llm turn failed: {e}"))?;
            match parse::parse_directive(&completion) {
                Ok(directive) => return Ok(directive),
                Err(e) => {
                    tracing::debug!(attempt, error = %e, "unparseable action, re-asking");
                    last_error = e.to_string();
                    prompt = format!("{base_prompt}\n\nYour last reply could not be parsed ({last_error}).\n{}", prompt::SCHEMA_HINT);
                }
            }
        }
        Err(format!("unparseable after retries: {last_error}"))
    }

    fn outcome(&self, state: &LoopState, status: RunStatus, reason: Option<String>) -> EpicOutcome {
        let (_, completed, failed) = state.counts();
        EpicOutcome {
            status,
            rounds: state.round,
            completed,
            failed,
            reason,
        }
    }

    fn save_checkpoint(&self, state: &LoopState, phase_history: &[PhaseRecord]) {
        let Some((store, session_id)) = &self.checkpoints else {
            return;
        };
        let checkpoint = OrchestrationCheckpoint {
            session_id: session_id.clone(),
            checkpoint_id: format!("round-{}", state.round),
            state: state.clone(),
            phase_history: phase_history.to_vec(),
            saved_at: self.minter.now_ms(),
        };
        if let Err(e) = store.save(&checkpoint) {
            tracing::warn!(error = %e, "failed to save orchestration checkpoint");
        } else {
            (self.events)(
                EventType::CheckpointSaved,
                json!({"checkpointId": checkpoint.checkpoint_id, "round": state.round}),
            );
        }
    }
}

/// Progress signature: anything that should reset the stuck counter.
fn progress_signature(state: &LoopState) -> (Vec<TaskStatus>, usize, usize, Phase) {
    (
        state.task_graph.iter().map(|t| t.status).collect(),
        state.completed_tasks.len(),
        state.failed_tasks.len(),
        state.phase,
    )
}

fn push_error(errors: &mut Vec<String>, error: String) {
    errors.push(error);
    if errors.len() > 8 {
        let excess = errors.len() - 8;
        errors.drain(..excess);
    }
}

#[cfg(test)]
#[path = "orchestrator_tests.rs"]
mod tests;
