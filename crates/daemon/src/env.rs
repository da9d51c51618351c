// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Environment variables consumed by the daemon.

use std::path::PathBuf;

/// Primary HTTP port when `FINGER_HUB_URL` is unset.
pub const DEFAULT_HTTP_PORT: u16 = 5521;

/// WebSocket event-stream port when `FINGER_WS_PORT` is unset.
pub const DEFAULT_WS_PORT: u16 = 5522;

/// Daemon home directory: `FINGER_HOME`, defaulting to `~/.finger`.
pub fn home_dir() -> Option<PathBuf> {
    if let Ok(home) = std::env::var("FINGER_HOME") {
        if !home.is_empty() {
            return Some(PathBuf::from(home));
        }
    }
    dirs::home_dir().map(|home| home.join(".finger"))
}

/// HTTP port parsed from `FINGER_HUB_URL` (e.g. `http://localhost:5521`).
pub fn http_port() -> u16 {
    std::env::var("FINGER_HUB_URL")
        .ok()
        .and_then(|url| {
            url.rsplit(':')
                .next()
                .and_then(|tail| tail.trim_end_matches('/').parse().ok())
        })
        .unwrap_or(DEFAULT_HTTP_PORT)
}

/// WebSocket port from `FINGER_WS_PORT`.
pub fn ws_port() -> u16 {
    std::env::var("FINGER_WS_PORT")
        .ok()
        .and_then(|port| port.parse().ok())
        .unwrap_or(DEFAULT_WS_PORT)
}

/// `FINGER_ALLOW_DIRECT_AGENT_ROUTE`: direct routing to non-primary modules
/// is blocked unless explicitly enabled with `1`, `true`, or `yes`. Unset
/// means blocked; test harnesses go through the `x-finger-route-mode: test`
/// header instead.
pub fn allow_direct_agent_route() -> bool {
    match std::env::var("FINGER_ALLOW_DIRECT_AGENT_ROUTE") {
        Ok(value) => matches!(value.trim(), "1" | "true" | "yes"),
        Err(_) => false,
    }
}

/// `NODE_ENV=test` relaxes the direct-route guard for test harnesses.
pub fn test_mode() -> bool {
    std::env::var("NODE_ENV").is_ok_and(|v| v == "test")
}

/// Directory holding gateway launcher binaries (`FINGER_GATEWAY_DIR`).
pub fn gateway_dir() -> Option<PathBuf> {
    std::env::var("FINGER_GATEWAY_DIR")
        .ok()
        .filter(|dir| !dir.is_empty())
        .map(PathBuf::from)
}

/// Clock correction in milliseconds supplied by the external time-sync
/// collaborator (`FINGER_CLOCK_OFFSET_MS`).
pub fn clock_offset_ms() -> i64 {
    std::env::var("FINGER_CLOCK_OFFSET_MS")
        .ok()
        .and_then(|offset| offset.parse().ok())
        .unwrap_or(0)
}

/// Scripted orchestrator outcome for smoke tests
/// (`FINGER_MOCK_PLAN_OUTCOME=success|failure`).
pub fn mock_plan_outcome() -> Option<String> {
    std::env::var("FINGER_MOCK_PLAN_OUTCOME")
        .ok()
        .filter(|v| !v.is_empty())
}

/// Scripted executor outcome for smoke tests
/// (`FINGER_MOCK_EXEC_OUTCOME=success|failure`).
pub fn mock_exec_outcome() -> Option<String> {
    std::env::var("FINGER_MOCK_EXEC_OUTCOME")
        .ok()
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
#[path = "env_tests.rs"]
mod tests;
