// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Subprocess gateway implementation.
//!
//! The child is started on first request and kept alive for subsequent ones.
//! Stdin has exactly one writer (a dedicated task fed by a channel); stdout
//! is drained by a single line-reader task that resolves pending requests.
//! When the child exits, every pending request is rejected with the exit
//! reason and the next request restarts the process.

use super::{GatewayAdapter, GatewayError, GatewayReply, ACK_TIMEOUT, RESULT_TIMEOUT};
use async_trait::async_trait;
use finger_core::{DeliveryMode, GatewayEnvelope, Minter, ModuleId, RequestId};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tokio::sync::{mpsc, oneshot};

/// Configuration for one gateway session.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Module id of this gateway; also the request-id prefix.
    pub module_id: ModuleId,
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
    pub env: Vec<(String, String)>,
    pub ack_timeout: Duration,
    pub result_timeout: Duration,
}

impl GatewayConfig {
    pub fn new(module_id: ModuleId, program: impl Into<String>) -> Self {
        Self {
            module_id,
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            env: Vec::new(),
            ack_timeout: ACK_TIMEOUT,
            result_timeout: RESULT_TIMEOUT,
        }
    }

    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    pub fn with_cwd(mut self, cwd: PathBuf) -> Self {
        self.cwd = Some(cwd);
        self
    }

    pub fn with_env(mut self, env: Vec<(String, String)>) -> Self {
        self.env = env;
        self
    }

    pub fn with_timeouts(mut self, ack: Duration, result: Duration) -> Self {
        self.ack_timeout = ack;
        self.result_timeout = result;
        self
    }
}

type AckReply = Result<(bool, Option<String>), GatewayError>;
type ResultReply = Result<(bool, Option<Value>, Option<String>), GatewayError>;

struct ChildHandle {
    stdin_tx: mpsc::UnboundedSender<String>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    alive: Arc<AtomicBool>,
}

struct Shared {
    config: GatewayConfig,
    minter: Minter,
    inbound_tx: mpsc::Sender<GatewayEnvelope>,
    pending_acks: Mutex<HashMap<RequestId, oneshot::Sender<AckReply>>>,
    pending_results: Mutex<HashMap<RequestId, oneshot::Sender<ResultReply>>>,
    child: tokio::sync::Mutex<Option<ChildHandle>>,
}

impl Shared {
    /// Reject every pending request with the child's exit reason.
    fn fail_all_pending(&self, reason: &str) {
        let acks: Vec<_> = self.pending_acks.lock().drain().collect();
        for (_, tx) in acks {
            let _ = tx.send(Err(GatewayError::ProcessExited {
                reason: reason.to_string(),
            }));
        }
        let results: Vec<_> = self.pending_results.lock().drain().collect();
        for (_, tx) in results {
            let _ = tx.send(Err(GatewayError::ProcessExited {
                reason: reason.to_string(),
            }));
        }
    }
}

/// A gateway backed by a child process speaking stdio JSONL.
#[derive(Clone)]
pub struct ProcessGateway {
    shared: Arc<Shared>,
}

impl ProcessGateway {
    /// Create a gateway session. Returns the session and the receiver for
    /// unsolicited `input`/`event` envelopes.
    pub fn new(config: GatewayConfig, minter: Minter) -> (Self, mpsc::Receiver<GatewayEnvelope>) {
        let (inbound_tx, inbound_rx) = mpsc::channel(64);
        let gateway = Self {
            shared: Arc::new(Shared {
                config,
                minter,
                inbound_tx,
                pending_acks: Mutex::new(HashMap::new()),
                pending_results: Mutex::new(HashMap::new()),
                child: tokio::sync::Mutex::new(None),
            }),
        };
        (gateway, inbound_rx)
    }

    fn mint_request_id(&self) -> RequestId {
        RequestId::new(
            self.shared
                .minter
                .mint(self.shared.config.module_id.as_str()),
        )
    }

    /// Start the child if none is running; return its stdin sender.
    async fn ensure_started(&self) -> Result<mpsc::UnboundedSender<String>, GatewayError> {
        let mut guard = self.shared.child.lock().await;
        if let Some(handle) = guard.as_ref() {
            if handle.alive.load(Ordering::SeqCst) {
                return Ok(handle.stdin_tx.clone());
            }
        }

        let config = &self.shared.config;
        let mut command = Command::new(&config.program);
        command
            .args(&config.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(cwd) = &config.cwd {
            command.current_dir(cwd);
        }
        for (key, value) in &config.env {
            command.env(key, value);
        }

        let mut child = command
            .spawn()
            .map_err(|e| GatewayError::SpawnFailed(e.to_string()))?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| GatewayError::SpawnFailed("no stdin pipe".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| GatewayError::SpawnFailed("no stdout pipe".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| GatewayError::SpawnFailed("no stderr pipe".to_string()))?;

        tracing::info!(
            module = %config.module_id,
            program = %config.program,
            "gateway process started"
        );

        let alive = Arc::new(AtomicBool::new(true));
        let (stdin_tx, stdin_rx) = mpsc::unbounded_channel::<String>();
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        tokio::spawn(write_stdin(stdin, stdin_rx));
        tokio::spawn(read_stdout(stdout, Arc::clone(&self.shared)));
        tokio::spawn(log_stderr(stderr, self.shared.config.module_id.clone()));
        tokio::spawn(reap(
            child,
            shutdown_rx,
            Arc::clone(&alive),
            Arc::clone(&self.shared),
        ));

        *guard = Some(ChildHandle {
            stdin_tx: stdin_tx.clone(),
            shutdown_tx: Some(shutdown_tx),
            alive,
        });
        Ok(stdin_tx)
    }
}

#[async_trait]
impl GatewayAdapter for ProcessGateway {
    async fn request(
        &self,
        message: Value,
        mode: DeliveryMode,
    ) -> Result<GatewayReply, GatewayError> {
        let stdin_tx = self.ensure_started().await?;
        let request_id = self.mint_request_id();
        let line = GatewayEnvelope::Request {
            request_id: request_id.clone(),
            delivery_mode: mode,
            message,
        }
        .to_line()?;

        match mode {
            DeliveryMode::Async => {
                let (tx, rx) = oneshot::channel();
                self.shared
                    .pending_acks
                    .lock()
                    .insert(request_id.clone(), tx);

                if stdin_tx.send(line).is_err() {
                    self.shared.pending_acks.lock().remove(&request_id);
                    return Err(GatewayError::WritableClosed);
                }

                let timeout = self.shared.config.ack_timeout;
                match tokio::time::timeout(timeout, rx).await {
                    Err(_) => {
                        self.shared.pending_acks.lock().remove(&request_id);
                        Err(GatewayError::AckTimeout {
                            request_id,
                            after_ms: timeout.as_millis() as u64,
                        })
                    }
                    Ok(Err(_closed)) => Err(GatewayError::ProcessExited {
                        reason: "gateway session dropped".to_string(),
                    }),
                    Ok(Ok(Err(e))) => Err(e),
                    Ok(Ok(Ok((accepted, message)))) => Ok(GatewayReply::Accepted {
                        request_id,
                        accepted,
                        gateway_id: self.shared.config.module_id.clone(),
                        message,
                    }),
                }
            }
            DeliveryMode::Sync => {
                let (tx, rx) = oneshot::channel();
                self.shared
                    .pending_results
                    .lock()
                    .insert(request_id.clone(), tx);

                if stdin_tx.send(line).is_err() {
                    self.shared.pending_results.lock().remove(&request_id);
                    return Err(GatewayError::WritableClosed);
                }

                let timeout = self.shared.config.result_timeout;
                match tokio::time::timeout(timeout, rx).await {
                    Err(_) => {
                        self.shared.pending_results.lock().remove(&request_id);
                        Err(GatewayError::ResultTimeout {
                            request_id,
                            after_ms: timeout.as_millis() as u64,
                        })
                    }
                    Ok(Err(_closed)) => Err(GatewayError::ProcessExited {
                        reason: "gateway session dropped".to_string(),
                    }),
                    Ok(Ok(Err(e))) => Err(e),
                    Ok(Ok(Ok((success, output, error)))) => {
                        if success {
                            Ok(GatewayReply::Completed { request_id, output })
                        } else {
                            Err(GatewayError::RequestFailed {
                                request_id,
                                error: error
                                    .unwrap_or_else(|| "unspecified gateway error".to_string()),
                            })
                        }
                    }
                }
            }
        }
    }

    async fn stop(&self) {
        let handle = {
            let mut guard = self.shared.child.lock().await;
            guard.take()
        };
        if let Some(mut handle) = handle {
            if let Some(shutdown) = handle.shutdown_tx.take() {
                let _ = shutdown.send(());
            }
        }
    }

    fn is_running(&self) -> bool {
        match self.shared.child.try_lock() {
            Ok(guard) => guard
                .as_ref()
                .is_some_and(|h| h.alive.load(Ordering::SeqCst)),
            // Lock held: a start or stop is in flight; report running.
            Err(_) => true,
        }
    }
}

/// Single writer for the child's stdin.
async fn write_stdin(mut stdin: ChildStdin, mut rx: mpsc::UnboundedReceiver<String>) {
    while let Some(mut line) = rx.recv().await {
        line.push('\n');
        if stdin.write_all(line.as_bytes()).await.is_err() {
            break;
        }
        if stdin.flush().await.is_err() {
            break;
        }
    }
}

/// Single reader for the child's stdout: resolves pending requests and
/// forwards unsolicited envelopes.
async fn read_stdout(stdout: ChildStdout, shared: Arc<Shared>) {
    let mut lines = BufReader::new(stdout).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) | Err(_) => break,
        };
        if line.trim().is_empty() {
            continue;
        }

        let envelope = match GatewayEnvelope::parse_line(&line) {
            Ok(envelope) => envelope,
            Err(e) => {
                // Malformed envelopes are discarded; the pending request
                // keeps waiting for its timeout.
                tracing::debug!(error = %e, "discarding malformed gateway line");
                continue;
            }
        };

        match envelope {
            GatewayEnvelope::Ack {
                request_id,
                accepted,
                message,
            } => match shared.pending_acks.lock().remove(&request_id) {
                Some(tx) => {
                    let _ = tx.send(Ok((accepted, message)));
                }
                None => {
                    tracing::debug!(request_id = %request_id, "unmatched ack envelope");
                }
            },
            GatewayEnvelope::Result {
                request_id,
                success,
                output,
                error,
            } => match shared.pending_results.lock().remove(&request_id) {
                Some(tx) => {
                    let _ = tx.send(Ok((success, output, error)));
                }
                None => {
                    tracing::debug!(request_id = %request_id, "unmatched result envelope");
                }
            },
            inbound @ (GatewayEnvelope::Input { .. } | GatewayEnvelope::Event { .. }) => {
                if shared.inbound_tx.send(inbound).await.is_err() {
                    tracing::debug!("inbound receiver dropped; discarding envelope");
                }
            }
            GatewayEnvelope::Request { request_id, .. } => {
                tracing::debug!(request_id = %request_id, "unexpected request envelope from gateway");
            }
        }
    }
}

/// stderr lines are logged but never fatal.
async fn log_stderr(stderr: ChildStderr, module_id: ModuleId) {
    let mut lines = BufReader::new(stderr).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        tracing::warn!(module = %module_id, "gateway stderr: {line}");
    }
}

/// Wait for child exit (or a stop request), then reject pending requests.
async fn reap(
    mut child: Child,
    shutdown_rx: oneshot::Receiver<()>,
    alive: Arc<AtomicBool>,
    shared: Arc<Shared>,
) {
    let reason = tokio::select! {
        status = child.wait() => match status {
            Ok(status) => describe_exit(status),
            Err(e) => format!("wait failed: {e}"),
        },
        _ = shutdown_rx => {
            let _ = child.start_kill();
            match child.wait().await {
                Ok(status) => format!("stopped ({})", describe_exit(status)),
                Err(e) => format!("stopped (wait failed: {e})"),
            }
        }
    };

    alive.store(false, Ordering::SeqCst);
    shared.fail_all_pending(&reason);
    tracing::info!(
        module = %shared.config.module_id,
        reason = %reason,
        "gateway process exited"
    );
}

fn describe_exit(status: std::process::ExitStatus) -> String {
    match status.code() {
        Some(code) => format!("exit code {code}"),
        None => "terminated by signal".to_string(),
    }
}

#[cfg(test)]
#[path = "process_tests.rs"]
mod tests;
