// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Completion mailbox for non-blocking message submissions.
//!
//! Clients that submit with a `callbackId` poll
//! `/api/v1/mailbox/callback/{id}` for the outcome.

use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;

/// State of one callback slot.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum Completion {
    Pending,
    Completed {
        #[serde(skip_serializing_if = "Option::is_none")]
        result: Option<Value>,
    },
    Failed {
        error: String,
    },
}

/// Client-keyed completion store.
#[derive(Default)]
pub struct Mailbox {
    slots: Mutex<HashMap<String, Completion>>,
}

impl Mailbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open(&self, id: impl Into<String>) {
        self.slots.lock().insert(id.into(), Completion::Pending);
    }

    pub fn complete(&self, id: &str, result: Option<Value>) {
        self.slots
            .lock()
            .insert(id.to_string(), Completion::Completed { result });
    }

    pub fn fail(&self, id: &str, error: impl Into<String>) {
        self.slots.lock().insert(
            id.to_string(),
            Completion::Failed {
                error: error.into(),
            },
        );
    }

    pub fn get(&self, id: &str) -> Option<Completion> {
        self.slots.lock().get(id).cloned()
    }

    /// Fetch-and-remove a finished completion; pending slots stay.
    pub fn take_finished(&self, id: &str) -> Option<Completion> {
        let mut slots = self.slots.lock();
        match slots.get(id) {
            Some(Completion::Pending) => Some(Completion::Pending),
            Some(_) => slots.remove(id),
            None => None,
        }
    }
}

#[cfg(test)]
#[path = "mailbox_tests.rs"]
mod tests;
