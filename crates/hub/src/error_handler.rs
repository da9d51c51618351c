// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Handler-failure accounting.
//!
//! Repeated failures from one module pause it in the registry and schedule a
//! delayed resume, so a misbehaving handler cannot absorb every matching
//! message.

use crate::registry::{EntryStatus, Registry};
use finger_core::ModuleId;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Tuning for the error handler.
#[derive(Debug, Clone)]
pub struct ErrorHandlerConfig {
    /// Consecutive failures before the module is paused.
    pub pause_after: u32,
    /// Delay before a paused module is resumed.
    pub retry_delay_ms: u64,
}

impl Default for ErrorHandlerConfig {
    fn default() -> Self {
        Self {
            pause_after: 3,
            retry_delay_ms: 5_000,
        }
    }
}

/// What the error handler did about a reported failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrorReport {
    pub paused: bool,
    pub retry_scheduled: bool,
}

/// Tracks consecutive handler failures per module.
#[derive(Clone)]
pub struct ErrorHandler {
    config: ErrorHandlerConfig,
    counts: Arc<Mutex<HashMap<ModuleId, u32>>>,
}

impl ErrorHandler {
    pub fn new(config: ErrorHandlerConfig) -> Self {
        Self {
            config,
            counts: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Record a failure. When the consecutive-failure threshold is reached,
    /// pause the module and schedule a resume after the retry delay.
    pub fn report(
        &self,
        registry: &Arc<RwLock<Registry>>,
        module: &ModuleId,
        error: &str,
    ) -> ErrorReport {
        let count = {
            let mut counts = self.counts.lock();
            let count = counts.entry(module.clone()).or_insert(0);
            *count += 1;
            *count
        };

        tracing::warn!(module = %module, count, error, "handler failure");

        if count < self.config.pause_after {
            return ErrorReport {
                paused: false,
                retry_scheduled: false,
            };
        }

        registry.write().set_status(module, EntryStatus::Paused);

        let registry = Arc::clone(registry);
        let counts = Arc::clone(&self.counts);
        let module = module.clone();
        let delay = Duration::from_millis(self.config.retry_delay_ms);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            counts.lock().remove(&module);
            if registry.write().set_status(&module, EntryStatus::Active) {
                tracing::info!(module = %module, "resumed paused module");
            }
        });

        ErrorReport {
            paused: true,
            retry_scheduled: true,
        }
    }

    /// Clear the failure streak after a success.
    pub fn reset(&self, module: &ModuleId) {
        self.counts.lock().remove(module);
    }

    pub fn failure_count(&self, module: &ModuleId) -> u32 {
        self.counts.lock().get(module).copied().unwrap_or(0)
    }
}

impl Default for ErrorHandler {
    fn default() -> Self {
        Self::new(ErrorHandlerConfig::default())
    }
}

#[cfg(test)]
#[path = "error_handler_tests.rs"]
mod tests;
