// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The message hub: route-and-dispatch over the registry.
//!
//! Reentrant: registry mutations are atomic with respect to concurrent
//! `send` calls — a send observes either the pre- or post-mutation route
//! table, never a torn view, because the matching route set is cloned under
//! the read lock before any handler runs.

use crate::error_handler::{ErrorHandler, ErrorHandlerConfig};
use crate::registry::{
    EntryStatus, ModuleType, Registry, RegistryEntry, RegistrySnapshot, RouteId, RouteMatch,
    RouteRule,
};
use async_trait::async_trait;
use finger_core::{CallbackId, Message, Minter, ModuleId};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;

/// Error returned by a message handler.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct HandlerError(pub String);

impl From<String> for HandlerError {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for HandlerError {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Hub-level errors.
#[derive(Debug, Error)]
pub enum HubError {
    #[error("module not registered: {0}")]
    NotRegistered(ModuleId),

    #[error("bad message: {0}")]
    BadMessage(String),

    #[error("callback not found: {0}")]
    CallbackNotFound(CallbackId),

    #[error("handler failed in {module}: {detail}")]
    HandlerFailed { module: ModuleId, detail: String },
}

/// A registered message handler.
///
/// `blocking` handlers return their value through `send`; non-blocking
/// handlers run for their side effects and their errors are reported to the
/// error handler rather than propagated.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, message: Message) -> Result<Value, HandlerError>;

    fn blocking(&self) -> bool {
        false
    }

    fn is_healthy(&self) -> bool {
        true
    }
}

/// Registration options for a module.
#[derive(Debug, Clone)]
pub struct RegisterOptions {
    /// Implementation tag stored in the registry entry.
    pub kind: String,
    pub config: Value,
    /// Serialize deliveries: at most one in-flight `send_to_module` at a time.
    pub single_writer: bool,
}

impl Default for RegisterOptions {
    fn default() -> Self {
        Self {
            kind: "module".to_string(),
            config: Value::Null,
            single_writer: false,
        }
    }
}

impl RegisterOptions {
    pub fn kind(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            ..Self::default()
        }
    }

    pub fn single_writer(mut self) -> Self {
        self.single_writer = true;
        self
    }
}

/// Structured result of a failed blocking handler.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockingFailure {
    pub error: bool,
    pub paused: bool,
    pub retry_scheduled: bool,
    pub route_id: RouteId,
    pub detail: String,
}

/// What `send` did with a message.
#[derive(Debug)]
pub enum SendOutcome {
    /// A blocking handler ran; this is its return value.
    Blocking(Value),
    /// A blocking handler ran and failed.
    BlockingFailed(BlockingFailure),
    /// Non-blocking handlers were invoked.
    Dispatched { handlers: usize },
    /// No route matched (or no destination was deliverable); queued.
    Queued,
}

/// Completion callback resolved exactly once via `execute_callback`.
pub type PendingCallback = Box<dyn FnOnce(Value) + Send>;

#[derive(Clone)]
struct RegisteredModule {
    handler: Arc<dyn MessageHandler>,
    /// Present for single-writer modules; held across the handler await.
    gate: Option<Arc<tokio::sync::Mutex<()>>>,
}

enum Dispatch {
    Outcome(SendOutcome),
    NoMatch,
}

/// The in-process content-based router.
pub struct MessageHub {
    registry: Arc<RwLock<Registry>>,
    modules: RwLock<HashMap<ModuleId, RegisteredModule>>,
    /// Routes added on behalf of each input registration, replaced with it.
    module_routes: Mutex<HashMap<ModuleId, Vec<RouteId>>>,
    queue: Mutex<VecDeque<Message>>,
    callbacks: Mutex<HashMap<CallbackId, PendingCallback>>,
    errors: ErrorHandler,
    minter: Minter,
    dirty: Arc<AtomicBool>,
}

impl MessageHub {
    pub fn new(minter: Minter) -> Self {
        Self::with_registry(minter, Registry::new())
    }

    /// Build a hub over a recovered registry (snapshot load).
    pub fn with_registry(minter: Minter, registry: Registry) -> Self {
        Self {
            registry: Arc::new(RwLock::new(registry)),
            modules: RwLock::new(HashMap::new()),
            module_routes: Mutex::new(HashMap::new()),
            queue: Mutex::new(VecDeque::new()),
            callbacks: Mutex::new(HashMap::new()),
            errors: ErrorHandler::default(),
            minter,
            dirty: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_error_config(mut self, config: ErrorHandlerConfig) -> Self {
        self.errors = ErrorHandler::new(config);
        self
    }

    fn mark_dirty(&self) {
        self.dirty.store(true, Ordering::SeqCst);
    }

    /// Shared dirty flag consumed by the snapshot manager.
    pub fn dirty_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.dirty)
    }

    pub fn minter(&self) -> &Minter {
        &self.minter
    }

    // -- registration --

    /// Register an input module with its route rules. Idempotent on `id`:
    /// a second registration replaces the handler and its routes.
    pub fn register_input(
        &self,
        id: ModuleId,
        handler: Arc<dyn MessageHandler>,
        routes: Vec<(RouteMatch, i32)>,
        opts: RegisterOptions,
    ) -> Vec<RouteId> {
        self.remove_module_routes(&id);
        let now = self.minter.now_ms();
        let mut route_ids = Vec::with_capacity(routes.len());
        {
            let mut registry = self.registry.write();
            registry.upsert_entry(
                RegistryEntry::new(id.clone(), ModuleType::Input, opts.kind.clone(), now)
                    .with_config(opts.config.clone()),
            );
            for (matcher, priority) in routes {
                let route_id = RouteId::new(self.minter.mint("route"));
                registry.add_route(route_id.clone(), matcher, vec![id.clone()], priority);
                route_ids.push(route_id);
            }
        }
        self.module_routes.lock().insert(id.clone(), route_ids.clone());
        self.install(id, handler, opts.single_writer);
        self.mark_dirty();
        route_ids
    }

    /// Register an output module. Idempotent on `id`.
    pub fn register_output(
        &self,
        id: ModuleId,
        handler: Arc<dyn MessageHandler>,
        opts: RegisterOptions,
    ) {
        let now = self.minter.now_ms();
        {
            let mut registry = self.registry.write();
            registry.upsert_entry(
                RegistryEntry::new(id.clone(), ModuleType::Output, opts.kind.clone(), now)
                    .with_config(opts.config.clone()),
            );
        }
        self.install(id, handler, opts.single_writer);
        self.mark_dirty();
    }

    fn install(&self, id: ModuleId, handler: Arc<dyn MessageHandler>, single_writer: bool) {
        let gate = single_writer.then(|| Arc::new(tokio::sync::Mutex::new(())));
        self.modules
            .write()
            .insert(id, RegisteredModule { handler, gate });
    }

    /// Record an externally-hosted module (an agent process that registered
    /// over the API). It has a registry entry but no in-process handler, so
    /// direct sends to it fail with `NotRegistered` until one is installed.
    pub fn register_external(&self, entry: RegistryEntry) {
        self.registry.write().upsert_entry(entry);
        self.mark_dirty();
    }

    /// Remove a module, its registry entry, and its routes.
    pub fn unregister(&self, id: &ModuleId) -> bool {
        self.remove_module_routes(id);
        let removed = self.registry.write().remove_entry(id).is_some();
        self.modules.write().remove(id);
        if removed {
            self.mark_dirty();
        }
        removed
    }

    fn remove_module_routes(&self, id: &ModuleId) {
        let route_ids = self.module_routes.lock().remove(id).unwrap_or_default();
        if route_ids.is_empty() {
            return;
        }
        let mut registry = self.registry.write();
        for route_id in route_ids {
            registry.remove_route(&route_id);
        }
    }

    // -- routes --

    pub fn add_route(&self, matcher: RouteMatch, dest: Vec<ModuleId>, priority: i32) -> RouteId {
        let id = RouteId::new(self.minter.mint("route"));
        self.registry
            .write()
            .add_route(id.clone(), matcher, dest, priority);
        self.mark_dirty();
        id
    }

    pub fn remove_route(&self, id: &RouteId) -> bool {
        let removed = self.registry.write().remove_route(id).is_some();
        if removed {
            self.mark_dirty();
        }
        removed
    }

    // -- dispatch --

    fn validate(&self, message: &Message) -> Result<(), HubError> {
        if message.id.as_str().is_empty() {
            return Err(HubError::BadMessage("empty message id".to_string()));
        }
        Ok(())
    }

    /// Route a message by pattern. Matching rules are considered in priority
    /// order; at most one blocking handler runs and its value is returned;
    /// unroutable messages are queued.
    pub async fn send(&self, message: Message) -> Result<SendOutcome, HubError> {
        self.validate(&message)?;
        match self.dispatch(&message).await {
            Dispatch::Outcome(outcome) => Ok(outcome),
            Dispatch::NoMatch => {
                self.queue.lock().push_back(message);
                Ok(SendOutcome::Queued)
            }
        }
    }

    /// `send` with a completion callback: mints a callback id, attaches it to
    /// the message, and keeps the callback pending until `execute_callback`.
    pub async fn send_with_callback(
        &self,
        mut message: Message,
        callback: PendingCallback,
    ) -> Result<(CallbackId, SendOutcome), HubError> {
        let id = CallbackId::new(self.minter.mint("cb"));
        self.callbacks.lock().insert(id.clone(), callback);
        message.callback_id = Some(id.clone());
        let outcome = self.send(message).await?;
        Ok((id, outcome))
    }

    async fn dispatch(&self, message: &Message) -> Dispatch {
        let matched: Vec<RouteRule> = self.registry.read().matching_routes(message);
        if matched.is_empty() {
            return Dispatch::NoMatch;
        }

        let mut invoked = 0usize;
        for rule in &matched {
            for dest in &rule.dest {
                let Some(module) = self.deliverable(dest) else {
                    continue;
                };

                if module.handler.blocking() {
                    // At most one blocking handler per send; its result is
                    // the result of the send and later rules are skipped.
                    return Dispatch::Outcome(match self.invoke(dest, &module, message.clone()).await
                    {
                        Ok(value) => {
                            self.errors.reset(dest);
                            SendOutcome::Blocking(value)
                        }
                        Err(e) => {
                            let report = self.errors.report(&self.registry, dest, &e.to_string());
                            self.mark_dirty();
                            SendOutcome::BlockingFailed(BlockingFailure {
                                error: true,
                                paused: report.paused,
                                retry_scheduled: report.retry_scheduled,
                                route_id: rule.id.clone(),
                                detail: e.to_string(),
                            })
                        }
                    });
                }

                invoked += 1;
                match self.invoke(dest, &module, message.clone()).await {
                    Ok(_) => self.errors.reset(dest),
                    Err(e) => {
                        self.errors.report(&self.registry, dest, &e.to_string());
                        self.mark_dirty();
                    }
                }
            }
        }

        if invoked == 0 {
            Dispatch::NoMatch
        } else {
            Dispatch::Outcome(SendOutcome::Dispatched { handlers: invoked })
        }
    }

    /// Module lookup honoring the registry status: paused and errored
    /// modules receive nothing.
    fn deliverable(&self, id: &ModuleId) -> Option<RegisteredModule> {
        let status = self.registry.read().entry(id).map(|e| e.status);
        match status {
            Some(EntryStatus::Active) | None => {}
            Some(EntryStatus::Paused) | Some(EntryStatus::Error) => return None,
        }
        self.modules.read().get(id).cloned()
    }

    async fn invoke(
        &self,
        id: &ModuleId,
        module: &RegisteredModule,
        message: Message,
    ) -> Result<Value, HandlerError> {
        tracing::debug!(module = %id, kind = %message.kind, id = %message.id, "dispatching");
        match &module.gate {
            Some(gate) => {
                let _held = gate.lock().await;
                module.handler.handle(message).await
            }
            None => module.handler.handle(message).await,
        }
    }

    /// Direct delivery, bypassing pattern routes. Fails fast with
    /// `NotRegistered` for unknown targets.
    pub async fn send_to_module(
        &self,
        target: &ModuleId,
        message: Message,
    ) -> Result<Value, HubError> {
        self.validate(&message)?;
        let module = self
            .modules
            .read()
            .get(target)
            .cloned()
            .ok_or_else(|| HubError::NotRegistered(target.clone()))?;

        match self.invoke(target, &module, message).await {
            Ok(value) => {
                self.errors.reset(target);
                Ok(value)
            }
            Err(e) => {
                self.errors.report(&self.registry, target, &e.0);
                self.mark_dirty();
                Err(HubError::HandlerFailed {
                    module: target.clone(),
                    detail: e.0,
                })
            }
        }
    }

    /// Hand a message to an output module, minting a callback id when the
    /// caller supplied a completion callback. The callback stays pending
    /// until `execute_callback` resolves it.
    pub async fn route_to_output(
        &self,
        output: &ModuleId,
        mut message: Message,
        callback: Option<PendingCallback>,
    ) -> Result<Option<CallbackId>, HubError> {
        let callback_id = callback.map(|cb| {
            let id = CallbackId::new(self.minter.mint("cb"));
            self.callbacks.lock().insert(id.clone(), cb);
            id
        });
        if let Some(id) = &callback_id {
            message.callback_id = Some(id.clone());
        }

        match self.send_to_module(output, message).await {
            Ok(_) => Ok(callback_id),
            Err(e) => {
                // Delivery never happened; the callback can never resolve.
                if let Some(id) = &callback_id {
                    self.callbacks.lock().remove(id);
                }
                Err(e)
            }
        }
    }

    /// Resolve a pending callback exactly once.
    pub fn execute_callback(&self, id: &CallbackId, result: Value) -> Result<(), HubError> {
        let callback = self
            .callbacks
            .lock()
            .remove(id)
            .ok_or_else(|| HubError::CallbackNotFound(id.clone()))?;
        callback(result);
        Ok(())
    }

    pub fn pending_callbacks(&self) -> usize {
        self.callbacks.lock().len()
    }

    // -- queue --

    pub fn queued(&self) -> usize {
        self.queue.lock().len()
    }

    /// Re-dispatch queued messages in FIFO order. Messages that still cannot
    /// be delivered return to the tail. Returns the number delivered.
    pub async fn process_queue(&self) -> usize {
        let batch = self.queue.lock().len();
        let mut processed = 0usize;
        for _ in 0..batch {
            let Some(message) = self.queue.lock().pop_front() else {
                break;
            };
            match self.dispatch(&message).await {
                Dispatch::Outcome(_) => processed += 1,
                Dispatch::NoMatch => self.queue.lock().push_back(message),
            }
        }
        processed
    }

    // -- registry access --

    pub fn is_registered(&self, id: &ModuleId) -> bool {
        self.modules.read().contains_key(id)
    }

    pub fn entries(&self) -> Vec<RegistryEntry> {
        self.registry.read().entries().cloned().collect()
    }

    pub fn entry(&self, id: &ModuleId) -> Option<RegistryEntry> {
        self.registry.read().entry(id).cloned()
    }

    pub fn set_status(&self, id: &ModuleId, status: EntryStatus) -> bool {
        let changed = self.registry.write().set_status(id, status);
        if changed {
            self.mark_dirty();
        }
        changed
    }

    pub fn touch_heartbeat(&self, id: &ModuleId) -> bool {
        let now = self.minter.now_ms();
        let changed = self.registry.write().touch_heartbeat(id, now);
        if changed {
            self.mark_dirty();
        }
        changed
    }

    pub fn export_snapshot(&self) -> RegistrySnapshot {
        self.registry.read().snapshot(self.minter.now_ms())
    }

    /// Replace the registry from a snapshot. Handlers are unaffected;
    /// modules re-attach by registering under their snapshot ids.
    pub fn import_snapshot(&self, snapshot: RegistrySnapshot) {
        *self.registry.write() = Registry::restore(snapshot);
        self.mark_dirty();
    }
}

#[cfg(test)]
#[path = "hub_tests.rs"]
mod tests;
