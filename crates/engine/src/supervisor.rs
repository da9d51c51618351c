// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Module lifecycle supervision.
//!
//! Lifecycle: `REGISTERED → STARTING → RUNNING → STOPPING → STOPPED`, with
//! `FAILED` reachable from any state. Failed modules restart with exponential
//! backoff while the restart budget lasts; a module that holds RUNNING for
//! five seconds earns its restart counter back.

use async_trait::async_trait;
use finger_core::{Minter, ModuleId};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Interval at which agent modules report heartbeats.
pub const HEARTBEAT_INTERVAL_MS: u64 = 30_000;

/// Heartbeat misses tolerated before an agent module is torn down.
pub const MAX_MISSED_HEARTBEATS: u64 = 3;

/// Minimum heartbeat timeout for agent-like modules.
const MIN_AGENT_HEARTBEAT_TIMEOUT_MS: u64 = 30_000;

/// Restart delay ceiling.
const MAX_RESTART_DELAY_MS: u64 = 60_000;

/// RUNNING time after which the restart counter resets.
const STABLE_RUNNING_MS: u64 = 5_000;

/// Module lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModuleLifecycle {
    Registered,
    Starting,
    Running,
    Stopping,
    Stopped,
    Failed,
}

impl ModuleLifecycle {
    /// Whether `self → next` is a legal transition.
    pub fn can_transition(&self, next: ModuleLifecycle) -> bool {
        use ModuleLifecycle::*;
        if next == Failed {
            return *self != Failed;
        }
        matches!(
            (self, next),
            (Registered, Starting)
                | (Starting, Running)
                | (Running, Stopping)
                | (Stopping, Stopped)
                | (Stopped, Starting)
                | (Failed, Starting)
        )
    }
}

/// Supervision parameters for one module.
#[derive(Debug, Clone)]
pub struct ModuleSpec {
    pub auto_restart: bool,
    pub max_restarts: u32,
    pub restart_backoff_ms: u64,
    pub heartbeat_timeout_ms: u64,
    /// Agent-like modules get the heartbeat-timeout floor and the
    /// missed-heartbeat teardown rule.
    pub agent_like: bool,
}

impl Default for ModuleSpec {
    fn default() -> Self {
        Self {
            auto_restart: true,
            max_restarts: 5,
            restart_backoff_ms: 1_000,
            heartbeat_timeout_ms: 60_000,
            agent_like: false,
        }
    }
}

impl ModuleSpec {
    pub fn agent() -> Self {
        Self {
            agent_like: true,
            ..Self::default()
        }
    }

    fn effective_heartbeat_timeout(&self) -> u64 {
        if self.agent_like {
            self.heartbeat_timeout_ms.max(MIN_AGENT_HEARTBEAT_TIMEOUT_MS)
        } else {
            self.heartbeat_timeout_ms
        }
    }
}

/// Observable state of a supervised module.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleState {
    pub state: ModuleLifecycle,
    pub restart_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_started_at: Option<u64>,
    pub last_heartbeat: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
}

/// A module the supervisor can start and stop.
#[async_trait]
pub trait SupervisedModule: Send + Sync {
    fn id(&self) -> ModuleId;
    async fn start(&self) -> Result<(), String>;
    async fn stop(&self) -> Result<(), String>;
    fn is_healthy(&self) -> bool {
        true
    }
}

/// Supervisor errors
#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error("module not supervised: {0}")]
    UnknownModule(ModuleId),

    #[error("illegal transition for {module}: {from:?} -> {to:?}")]
    IllegalTransition {
        module: ModuleId,
        from: ModuleLifecycle,
        to: ModuleLifecycle,
    },

    #[error("start failed for {module}: {reason}")]
    StartFailed { module: ModuleId, reason: String },

    #[error("max restarts exceeded for {0}")]
    MaxRestartsExceeded(ModuleId),
}

struct Managed {
    module: Arc<dyn SupervisedModule>,
    spec: ModuleSpec,
    state: ModuleState,
}

/// Restart delay: `min(60s, backoff · 2^restart_count)`.
pub fn restart_delay(backoff_ms: u64, restart_count: u32) -> Duration {
    let factor = 1u64.checked_shl(restart_count).unwrap_or(u64::MAX);
    Duration::from_millis(backoff_ms.saturating_mul(factor).min(MAX_RESTART_DELAY_MS))
}

/// Keeps registered modules alive.
pub struct Supervisor {
    minter: Minter,
    check_interval: Duration,
    modules: Mutex<HashMap<ModuleId, Managed>>,
}

impl Supervisor {
    pub fn new(minter: Minter) -> Self {
        Self {
            minter,
            check_interval: Duration::from_secs(10),
            modules: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_check_interval(mut self, interval: Duration) -> Self {
        self.check_interval = interval;
        self
    }

    pub fn register(&self, module: Arc<dyn SupervisedModule>, spec: ModuleSpec) {
        let id = module.id();
        let now = self.minter.now_ms();
        self.modules.lock().insert(
            id,
            Managed {
                module,
                spec,
                state: ModuleState {
                    state: ModuleLifecycle::Registered,
                    restart_count: 0,
                    last_started_at: None,
                    last_heartbeat: now,
                    pid: None,
                },
            },
        );
    }

    pub fn module_state(&self, id: &ModuleId) -> Option<ModuleState> {
        self.modules.lock().get(id).map(|m| m.state.clone())
    }

    pub fn record_heartbeat(&self, id: &ModuleId) -> bool {
        let now = self.minter.now_ms();
        match self.modules.lock().get_mut(id) {
            Some(managed) => {
                managed.state.last_heartbeat = now;
                true
            }
            None => false,
        }
    }

    fn transition(&self, id: &ModuleId, to: ModuleLifecycle) -> Result<(), SupervisorError> {
        let mut modules = self.modules.lock();
        let managed = modules
            .get_mut(id)
            .ok_or_else(|| SupervisorError::UnknownModule(id.clone()))?;
        let from = managed.state.state;
        if !from.can_transition(to) {
            return Err(SupervisorError::IllegalTransition {
                module: id.clone(),
                from,
                to,
            });
        }
        managed.state.state = to;
        Ok(())
    }

    /// Start a module: `STARTING`, then `RUNNING` on success. A start
    /// failure marks it `FAILED` and schedules a restart per its spec.
    pub async fn start_module(self: &Arc<Self>, id: &ModuleId) -> Result<(), SupervisorError> {
        let module = {
            let modules = self.modules.lock();
            let managed = modules
                .get(id)
                .ok_or_else(|| SupervisorError::UnknownModule(id.clone()))?;
            Arc::clone(&managed.module)
        };

        self.transition(id, ModuleLifecycle::Starting)?;

        match module.start().await {
            Ok(()) => {
                let now = self.minter.now_ms();
                let mut modules = self.modules.lock();
                if let Some(managed) = modules.get_mut(id) {
                    managed.state.state = ModuleLifecycle::Running;
                    managed.state.last_started_at = Some(now);
                    managed.state.last_heartbeat = now;
                }
                tracing::info!(module = %id, "module running");
                Ok(())
            }
            Err(reason) => {
                tracing::warn!(module = %id, reason = %reason, "module start failed");
                self.fail_and_maybe_restart(id);
                Err(SupervisorError::StartFailed {
                    module: id.clone(),
                    reason,
                })
            }
        }
    }

    /// Stop a module: `STOPPING` then `STOPPED`. Stop errors still land in
    /// `STOPPED`; the module is no longer auto-restarted until started again.
    pub async fn stop_module(self: &Arc<Self>, id: &ModuleId) -> Result<(), SupervisorError> {
        let module = {
            let modules = self.modules.lock();
            let managed = modules
                .get(id)
                .ok_or_else(|| SupervisorError::UnknownModule(id.clone()))?;
            Arc::clone(&managed.module)
        };

        self.transition(id, ModuleLifecycle::Stopping)?;
        if let Err(reason) = module.stop().await {
            tracing::warn!(module = %id, reason = %reason, "module stop reported an error");
        }
        self.transition(id, ModuleLifecycle::Stopped)
    }

    /// Mark a module failed and schedule its restart when the spec allows.
    fn fail_and_maybe_restart(self: &Arc<Self>, id: &ModuleId) {
        let delay = {
            let mut modules = self.modules.lock();
            let Some(managed) = modules.get_mut(id) else {
                return;
            };
            if managed.state.state != ModuleLifecycle::Failed {
                managed.state.state = ModuleLifecycle::Failed;
            }
            if !managed.spec.auto_restart {
                return;
            }
            if managed.state.restart_count >= managed.spec.max_restarts {
                tracing::error!(module = %id, "max restarts exceeded; giving up");
                return;
            }
            let delay = restart_delay(
                managed.spec.restart_backoff_ms,
                managed.state.restart_count,
            );
            managed.state.restart_count += 1;
            delay
        };

        let supervisor = Arc::clone(self);
        let id = id.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            tracing::info!(module = %id, "restarting module");
            if let Err(e) = supervisor.start_module(&id).await {
                tracing::warn!(module = %id, error = %e, "restart attempt failed");
            }
        });
    }

    /// One health-check pass over all RUNNING modules. Returns the ids that
    /// were torn down for restart.
    pub async fn check_once(self: &Arc<Self>) -> Vec<ModuleId> {
        let now = self.minter.now_ms();
        let mut to_restart: Vec<(ModuleId, Arc<dyn SupervisedModule>, bool)> = Vec::new();

        {
            let mut modules = self.modules.lock();
            for (id, managed) in modules.iter_mut() {
                if managed.state.state != ModuleLifecycle::Running {
                    continue;
                }

                // A stable run earns the restart budget back.
                if managed.state.restart_count > 0 {
                    if let Some(started) = managed.state.last_started_at {
                        if now.saturating_sub(started) >= STABLE_RUNNING_MS {
                            managed.state.restart_count = 0;
                        }
                    }
                }

                let heartbeat_age = now.saturating_sub(managed.state.last_heartbeat);
                let timeout = managed.spec.effective_heartbeat_timeout();
                let missed = heartbeat_age / HEARTBEAT_INTERVAL_MS;

                let unhealthy = !managed.module.is_healthy();
                let heartbeat_lost = heartbeat_age > timeout
                    || (managed.spec.agent_like && missed >= MAX_MISSED_HEARTBEATS);

                if unhealthy || heartbeat_lost {
                    tracing::warn!(
                        module = %id,
                        unhealthy,
                        heartbeat_age,
                        "module needs restart"
                    );
                    to_restart.push((
                        id.clone(),
                        Arc::clone(&managed.module),
                        managed.spec.agent_like && missed >= MAX_MISSED_HEARTBEATS,
                    ));
                }
            }
        }

        let mut restarted = Vec::new();
        for (id, module, terminate) in to_restart {
            // Agents that missed three heartbeats are torn down before the
            // restart is scheduled.
            if terminate {
                if let Err(reason) = module.stop().await {
                    tracing::debug!(module = %id, reason = %reason, "teardown stop failed");
                }
            }
            self.fail_and_maybe_restart(&id);
            restarted.push(id);
        }
        restarted
    }

    /// Run the periodic health check until the task is aborted.
    pub fn spawn(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.check_interval);
            loop {
                ticker.tick().await;
                self.check_once().await;
            }
        })
    }
}

#[cfg(test)]
#[path = "supervisor_tests.rs"]
mod tests;
