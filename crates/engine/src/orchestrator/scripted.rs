// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scripted LLM turns for tests.

use super::LlmTurn;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;

/// Replays a fixed sequence of completions and records prompts.
#[derive(Clone, Default)]
pub struct ScriptedLlm {
    turns: Arc<Mutex<VecDeque<Result<String, String>>>>,
    prompts: Arc<Mutex<Vec<String>>>,
}

impl ScriptedLlm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, completion: impl Into<String>) {
        self.turns.lock().push_back(Ok(completion.into()));
    }

    pub fn push_err(&self, error: impl Into<String>) {
        self.turns.lock().push_back(Err(error.into()));
    }

    /// Prompts seen so far.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().clone()
    }
}

#[async_trait]
impl LlmTurn for ScriptedLlm {
    async fn complete(&self, prompt: &str) -> Result<String, String> {
        self.prompts.lock().push(prompt.to_string());
        self.turns
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err("script exhausted".to_string()))
    }
}
