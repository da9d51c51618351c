// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon lifecycle management: configuration, startup, shutdown.

use crate::env;
use crate::event_bus::EventBus;
use crate::mailbox::Mailbox;
use crate::modules;
use crate::tools::ToolRunner;
use finger_core::{EventType, Minter, ModuleId, MonotonicStamper, SystemClock};
use finger_engine::{LoopConfig, Supervisor, ToolPolicyStore};
use finger_hub::{MessageHub, RegisterOptions, Registry, RegistrySnapshot, RouteMatch};
use finger_storage::{
    load_json, CheckpointStore, EventLog, SessionStore, SnapshotWriter, WorkflowStore,
};
use fs2::FileExt;
use serde_json::json;
use std::fs::File;
use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

/// Snapshot ticker period.
const SNAPSHOT_INTERVAL: Duration = Duration::from_secs(30);

/// Queued-message re-dispatch period.
const QUEUE_PUMP_INTERVAL: Duration = Duration::from_secs(1);

/// Primary orchestrator module id; the only direct-route target when the
/// guard is active.
pub const PRIMARY_TARGET: &str = "chat-codex-gateway";

/// Daemon configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Daemon home (e.g. ~/.finger)
    pub home: PathBuf,
    pub http_port: u16,
    pub ws_port: u16,
    /// Path to PID file
    pub pid_path: PathBuf,
    /// Path to human-readable log
    pub log_path: PathBuf,
    /// Directory for JSONL event logs
    pub logs_dir: PathBuf,
    /// Path to registry snapshot
    pub snapshot_path: PathBuf,
    /// Root of the per-project session tree
    pub session_dir: PathBuf,
    /// Per-workflow state files
    pub workflows_dir: PathBuf,
    /// Orchestration checkpoint files
    pub checkpoints_dir: PathBuf,
    pub primary_target: ModuleId,
    pub allow_direct_route: bool,
    pub gateway_dir: Option<PathBuf>,
    pub clock_offset_ms: i64,
    pub blocking_timeout: Duration,
    pub blocking_max_retries: u32,
    pub blocking_retry_base: Duration,
}

impl Config {
    /// Load configuration from the environment.
    pub fn load() -> Result<Self, LifecycleError> {
        let home = env::home_dir().ok_or(LifecycleError::NoHomeDir)?;
        Ok(Self::at_home(home))
    }

    /// Configuration rooted at an explicit home directory.
    pub fn at_home(home: PathBuf) -> Self {
        Self {
            pid_path: home.join("daemon.pid"),
            log_path: home.join("daemon.log"),
            logs_dir: home.join("logs"),
            snapshot_path: home.join("snapshot.json"),
            session_dir: home.join("session"),
            workflows_dir: home.join("workflows"),
            checkpoints_dir: home.join("session-states"),
            http_port: env::http_port(),
            ws_port: env::ws_port(),
            primary_target: ModuleId::new(PRIMARY_TARGET),
            allow_direct_route: env::allow_direct_agent_route(),
            gateway_dir: env::gateway_dir(),
            clock_offset_ms: env::clock_offset_ms(),
            blocking_timeout: Duration::from_secs(60),
            blocking_max_retries: 2,
            blocking_retry_base: Duration::from_millis(500),
            home,
        }
    }
}

/// Lifecycle errors
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("could not determine the daemon home directory")]
    NoHomeDir,

    #[error("failed to acquire lock: daemon already running?")]
    LockFailed(#[source] std::io::Error),

    #[error("storage error: {0}")]
    Storage(#[from] finger_storage::SnapshotError),

    #[error("session store error: {0}")]
    Sessions(#[from] finger_storage::SessionStoreError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// The assembled daemon: every shared component plus its background tasks.
pub struct Daemon {
    pub config: Config,
    pub minter: Minter,
    pub hub: Arc<MessageHub>,
    pub events: Arc<EventBus>,
    pub sessions: Arc<SessionStore>,
    pub policy: Arc<ToolPolicyStore>,
    pub tools: Arc<ToolRunner>,
    pub supervisor: Arc<Supervisor>,
    pub mailbox: Arc<Mailbox>,
    pub workflows: Arc<WorkflowStore>,
    pub checkpoints: Arc<CheckpointStore>,
    // NOTE(lifetime): held to maintain the exclusive pid-file lock
    #[allow(dead_code)]
    lock_file: File,
    tasks: Vec<tokio::task::JoinHandle<()>>,
}

impl std::fmt::Debug for Daemon {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Daemon").finish_non_exhaustive()
    }
}

/// Start the daemon: acquire the pid lock, recover the registry snapshot,
/// assemble the components, and spawn the background tasks.
pub async fn startup(config: Config) -> Result<Daemon, LifecycleError> {
    std::fs::create_dir_all(&config.home)?;

    // Acquire the pid lock first; a second daemon must fail fast without
    // touching the running daemon's state.
    let lock_file = std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(false)
        .open(&config.pid_path)?;
    lock_file
        .try_lock_exclusive()
        .map_err(LifecycleError::LockFailed)?;
    let mut lock_file = lock_file;
    lock_file.set_len(0)?;
    writeln!(lock_file, "{}", std::process::id())?;
    let lock_file = lock_file;

    let clock = SystemClock::with_offset(config.clock_offset_ms);
    let minter = Minter::new(MonotonicStamper::new(clock));

    // Recover the registry from the snapshot, if one exists and parses.
    let registry = match load_json::<RegistrySnapshot>(&config.snapshot_path)? {
        Some(snapshot) => {
            info!(
                entries = snapshot.entries.len(),
                routes = snapshot.routes.len(),
                "loaded registry snapshot"
            );
            Registry::restore(snapshot)
        }
        None => {
            info!("no snapshot found, starting with an empty registry");
            Registry::new()
        }
    };
    let hub = Arc::new(MessageHub::with_registry(minter.clone(), registry));

    let events = Arc::new(
        EventBus::new(minter.clone()).with_persistence(EventLog::new(&config.logs_dir)),
    );
    let sessions = Arc::new(SessionStore::open(&config.session_dir, minter.clone())?);
    let policy = Arc::new(ToolPolicyStore::new(minter.clone()));
    let tools = Arc::new(ToolRunner::new(Arc::clone(&policy), Arc::clone(&events)));
    let supervisor = Arc::new(Supervisor::new(minter.clone()));
    let workflows = Arc::new(WorkflowStore::new(&config.workflows_dir));
    let checkpoints = Arc::new(CheckpointStore::new(&config.checkpoints_dir));

    let mut tasks = Vec::new();
    tasks.push(spawn_snapshot_task(
        Arc::clone(&hub),
        Arc::clone(&events),
        config.snapshot_path.clone(),
    ));
    tasks.push(spawn_queue_pump(Arc::clone(&hub)));
    tasks.push(Arc::clone(&supervisor).spawn());

    let daemon = Daemon {
        minter,
        hub,
        events,
        sessions,
        policy,
        tools,
        supervisor,
        mailbox: Arc::new(Mailbox::new()),
        workflows,
        checkpoints,
        lock_file,
        tasks,
        config,
    };

    install_modules(&daemon);
    daemon
        .events
        .emit(EventType::SystemStarted, json!({"pid": std::process::id()}));
    info!("daemon started");
    Ok(daemon)
}

/// Register the modules the daemon hosts by default: the primary
/// orchestrator input with its routes, and the default executor output.
fn install_modules(daemon: &Daemon) {
    modules::install_executor(
        &daemon.hub,
        &daemon.minter,
        daemon.config.gateway_dir.as_ref(),
    );

    let llm = modules::orchestrator_llm(&daemon.minter, daemon.config.gateway_dir.as_ref());
    let orchestrator = modules::OrchestratorModule::new(
        daemon.config.primary_target.clone(),
        daemon.minter.clone(),
        llm,
        Arc::clone(&daemon.hub),
        Arc::clone(&daemon.events),
        Arc::clone(&daemon.workflows),
        Arc::clone(&daemon.checkpoints),
    )
    .with_config(LoopConfig::default());

    daemon.hub.register_input(
        daemon.config.primary_target.clone(),
        Arc::new(orchestrator),
        vec![
            (RouteMatch::for_kind("chat"), 10),
            (RouteMatch::for_kind("task"), 10),
        ],
        RegisterOptions::kind("orchestrator").single_writer(),
    );
}

impl Daemon {
    /// Graceful shutdown: final snapshot flush, pid cleanup, task teardown.
    pub fn shutdown(&self) {
        self.events
            .emit(EventType::SystemStopping, json!({"pid": std::process::id()}));

        let mut writer = SnapshotWriter::new(&self.config.snapshot_path);
        match writer.write_if_changed(&self.hub.export_snapshot()) {
            Ok(_) => info!("final snapshot flushed"),
            Err(e) => warn!(error = %e, "failed to flush final snapshot"),
        }

        for task in &self.tasks {
            task.abort();
        }

        if self.config.pid_path.exists() {
            if let Err(e) = std::fs::remove_file(&self.config.pid_path) {
                warn!(error = %e, "failed to remove pid file");
            }
        }
        info!("daemon stopped");
    }
}

/// Spawn the snapshot manager: a 30-second ticker that serializes the
/// registry when the dirty flag is set, hashing the content and writing only
/// when it changed.
fn spawn_snapshot_task(
    hub: Arc<MessageHub>,
    events: Arc<EventBus>,
    path: PathBuf,
) -> tokio::task::JoinHandle<()> {
    let dirty = hub.dirty_flag();
    tokio::spawn(async move {
        let mut writer = SnapshotWriter::new(path);
        let mut ticker = tokio::time::interval(SNAPSHOT_INTERVAL);
        loop {
            ticker.tick().await;
            if !dirty.swap(false, Ordering::SeqCst) {
                continue;
            }
            let snapshot = hub.export_snapshot();
            match writer.write_if_changed(&snapshot) {
                Ok(true) => {
                    events.emit(
                        EventType::SnapshotSaved,
                        json!({"entries": snapshot.entries.len(), "routes": snapshot.routes.len()}),
                    );
                }
                Ok(false) => {}
                Err(e) => {
                    // Keep the flag set so the next tick retries.
                    dirty.store(true, Ordering::SeqCst);
                    warn!(error = %e, "snapshot write failed");
                }
            }
        }
    })
}

/// Spawn the queue pump: queued (unroutable) messages are re-dispatched once
/// a second.
fn spawn_queue_pump(hub: Arc<MessageHub>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(QUEUE_PUMP_INTERVAL);
        loop {
            ticker.tick().await;
            if hub.queued() > 0 {
                let processed = hub.process_queue().await;
                if processed > 0 {
                    tracing::debug!(processed, "re-dispatched queued messages");
                }
            }
        }
    })
}

#[cfg(test)]
#[path = "lifecycle_tests.rs"]
mod tests;
