// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP API.
//!
//! Errors never cross this boundary as panics or bare error types: every
//! handler maps failures onto a structured JSON body with a 4xx status for
//! client mistakes (unknown target, missing field, policy denial) and 5xx
//! only for internal failures and timeouts.

use crate::env;
use crate::lifecycle::Daemon;
use crate::mailbox::Completion;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{delete, get, post, put};
use axum::{Json, Router};
use finger_core::{Message, MessageId, ModuleId, Role, SessionId, WorkflowId};
use finger_engine::{PolicyError, PolicyRole, ToolPolicy};
use finger_hub::{HubError, ModuleType, RegistryEntry};
use finger_storage::SessionStoreError;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

type ApiResult = (StatusCode, Json<Value>);

/// Build the full API router.
pub fn router(daemon: Arc<Daemon>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/v1/message", post(post_message))
        .route("/api/v1/mailbox/callback/{id}", get(get_callback))
        .route("/api/v1/agents/register", post(register_agent))
        .route("/api/v1/agents/unregister", post(unregister_agent))
        .route("/api/v1/agents/heartbeat", post(agent_heartbeat))
        .route("/api/v1/agent/{role}", post(agent_entry))
        .route("/api/v1/modules", get(list_modules))
        .route("/api/v1/events/recent", get(recent_events))
        .route("/api/v1/tools", get(list_tools))
        .route("/api/v1/tools/call", post(call_tool))
        .route(
            "/api/v1/tools/policy/{agent_id}",
            get(get_policy).put(put_policy),
        )
        .route("/api/v1/tools/authorize", post(mint_authorization))
        .route(
            "/api/v1/tools/authorize/{token}",
            delete(revoke_authorization),
        )
        .route("/api/v1/sessions", get(list_sessions).post(create_session))
        .route(
            "/api/v1/sessions/{id}",
            get(get_session).delete(delete_session),
        )
        .route(
            "/api/v1/sessions/{id}/messages",
            get(get_messages).post(add_message),
        )
        .route(
            "/api/v1/sessions/{id}/messages/{message_id}",
            put(update_message).delete(delete_message),
        )
        .route("/api/v1/sessions/{id}/pause", post(pause_session))
        .route("/api/v1/sessions/{id}/resume", post(resume_session))
        .route("/api/v1/sessions/{id}/compress", post(compress_session))
        .route("/api/v1/workflows", get(list_workflows))
        .route("/api/v1/workflows/{id}", get(get_workflow))
        .with_state(daemon)
}

async fn health() -> ApiResult {
    (StatusCode::OK, Json(json!({"ok": true})))
}

// -- messages --

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessageRequest {
    target: String,
    #[serde(default)]
    message: Value,
    #[serde(default)]
    blocking: bool,
    #[serde(default)]
    sender: Option<String>,
    #[serde(default)]
    callback_id: Option<String>,
}

/// Whether a direct route to `target` is permitted for this request.
fn direct_route_allowed(
    daemon: &Daemon,
    target: &ModuleId,
    headers: &HeaderMap,
    sender: Option<&str>,
) -> bool {
    target == &daemon.config.primary_target
        || daemon.config.allow_direct_route
        || env::test_mode()
        || sender == Some("cli")
        || headers
            .get("x-finger-route-mode")
            .and_then(|v| v.to_str().ok())
            == Some("test")
}

fn build_message(daemon: &Daemon, request: &MessageRequest, target: &ModuleId) -> Message {
    let kind = request
        .message
        .get("type")
        .and_then(Value::as_str)
        .unwrap_or("message")
        .to_string();
    let source = ModuleId::new(request.sender.as_deref().unwrap_or("http"));
    Message::new(
        MessageId::new(daemon.minter.mint("msg")),
        kind,
        daemon.minter.now_ms(),
        source,
        request.message.clone(),
    )
    .with_dest(target.clone())
}

async fn post_message(
    State(daemon): State<Arc<Daemon>>,
    headers: HeaderMap,
    Json(request): Json<MessageRequest>,
) -> ApiResult {
    if request.target.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"status": "failed", "error": "missing field: target"})),
        );
    }
    let target = ModuleId::new(&request.target);

    if !direct_route_allowed(&daemon, &target, &headers, request.sender.as_deref()) {
        return (
            StatusCode::FORBIDDEN,
            Json(json!({
                "code": "DIRECT_ROUTE_DISABLED",
                "primaryTarget": daemon.config.primary_target,
            })),
        );
    }

    let message = build_message(&daemon, &request, &target);
    let message_id = message.id.clone();

    if request.blocking {
        return blocking_send(&daemon, &target, message).await;
    }

    // Non-blocking: run in the background and surface the outcome through
    // the mailbox when the client supplied a callback id.
    if let Some(callback_id) = &request.callback_id {
        daemon.mailbox.open(callback_id.clone());
    }
    let callback_id = request.callback_id.clone();
    let spawned = Arc::clone(&daemon);
    let spawned_target = target.clone();
    tokio::spawn(async move {
        let outcome = spawned.hub.send_to_module(&spawned_target, message).await;
        if let Some(id) = &callback_id {
            match outcome {
                Ok(result) => spawned.mailbox.complete(id, Some(result)),
                Err(e) => spawned.mailbox.fail(id, e.to_string()),
            }
        } else if let Err(e) = outcome {
            tracing::warn!(target = %spawned_target, error = %e, "non-blocking send failed");
        }
    });

    (
        StatusCode::OK,
        Json(json!({
            "messageId": message_id,
            "status": "accepted",
            "callbackId": request.callback_id,
        })),
    )
}

/// Blocking send with the server-side timeout and retry-on-timeout policy.
async fn blocking_send(daemon: &Daemon, target: &ModuleId, message: Message) -> ApiResult {
    let message_id = message.id.clone();
    let config = &daemon.config;
    let mut attempt: u32 = 0;

    loop {
        let send = daemon.hub.send_to_module(target, message.clone());
        match tokio::time::timeout(config.blocking_timeout, send).await {
            Ok(Ok(result)) => {
                return (
                    StatusCode::OK,
                    Json(json!({
                        "messageId": message_id,
                        "status": "completed",
                        "result": result,
                    })),
                );
            }
            Ok(Err(e @ HubError::NotRegistered(_)))
            | Ok(Err(e @ HubError::BadMessage(_)))
            | Ok(Err(e @ HubError::CallbackNotFound(_))) => {
                return (
                    StatusCode::BAD_REQUEST,
                    Json(json!({
                        "messageId": message_id,
                        "status": "failed",
                        "error": e.to_string(),
                    })),
                );
            }
            Ok(Err(e @ HubError::HandlerFailed { .. })) => {
                return (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({
                        "messageId": message_id,
                        "status": "failed",
                        "error": e.to_string(),
                    })),
                );
            }
            Err(_elapsed) => {
                if attempt >= config.blocking_max_retries {
                    return (
                        StatusCode::GATEWAY_TIMEOUT,
                        Json(json!({
                            "messageId": message_id,
                            "status": "failed",
                            "error": format!(
                                "blocking send timed out after {} attempt(s)",
                                attempt + 1
                            ),
                        })),
                    );
                }
                let backoff = config
                    .blocking_retry_base
                    .saturating_mul(1u32 << attempt.min(16))
                    .min(std::time::Duration::from_secs(30));
                attempt += 1;
                tokio::time::sleep(backoff).await;
            }
        }
    }
}

async fn get_callback(
    State(daemon): State<Arc<Daemon>>,
    Path(id): Path<String>,
) -> ApiResult {
    match daemon.mailbox.take_finished(&id) {
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({"error": "unknown callback id"})),
        ),
        Some(Completion::Pending) => (StatusCode::OK, Json(json!({"status": "pending"}))),
        Some(done) => match serde_json::to_value(&done) {
            Ok(value) => (StatusCode::OK, Json(value)),
            Err(e) => internal(e.to_string()),
        },
    }
}

// -- agents --

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RegisterAgentRequest {
    agent_id: String,
    #[serde(default)]
    agent_name: Option<String>,
    #[serde(default)]
    pid: Option<u32>,
    #[serde(default)]
    capabilities: Vec<String>,
    #[serde(default)]
    start_time: Option<u64>,
}

async fn register_agent(
    State(daemon): State<Arc<Daemon>>,
    Json(request): Json<RegisterAgentRequest>,
) -> ApiResult {
    if request.agent_id.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "missing field: agentId"})),
        );
    }
    let id = ModuleId::new(&request.agent_id);
    let entry = RegistryEntry::new(
        id.clone(),
        ModuleType::Output,
        "agent",
        daemon.minter.now_ms(),
    )
    .with_config(json!({
        "agentName": request.agent_name,
        "pid": request.pid,
        "capabilities": request.capabilities,
        "startTime": request.start_time,
    }));
    daemon.hub.register_external(entry);
    daemon.events.emit_for_agent(
        finger_core::EventType::AgentRegistered,
        id,
        json!({"capabilities": request.capabilities}),
    );
    (StatusCode::OK, Json(json!({"registered": true})))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AgentIdRequest {
    agent_id: String,
}

async fn unregister_agent(
    State(daemon): State<Arc<Daemon>>,
    Json(request): Json<AgentIdRequest>,
) -> ApiResult {
    let id = ModuleId::new(&request.agent_id);
    let removed = daemon.hub.unregister(&id);
    if removed {
        daemon.events.emit_for_agent(
            finger_core::EventType::AgentUnregistered,
            id,
            Value::Null,
        );
    }
    (StatusCode::OK, Json(json!({"unregistered": removed})))
}

async fn agent_heartbeat(
    State(daemon): State<Arc<Daemon>>,
    Json(request): Json<AgentIdRequest>,
) -> ApiResult {
    let id = ModuleId::new(&request.agent_id);
    let known = daemon.hub.touch_heartbeat(&id);
    if !known {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": format!("agent not registered: {}", request.agent_id)})),
        );
    }
    daemon.supervisor.record_heartbeat(&id);
    daemon.events.emit_for_agent(
        finger_core::EventType::AgentHeartbeat,
        id,
        Value::Null,
    );
    (StatusCode::OK, Json(json!({"ok": true})))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AgentEntryRequest {
    #[serde(default)]
    message: Value,
    #[serde(default)]
    sender: Option<String>,
}

/// Per-role entry points (`/api/v1/agent/understand`, `/execute`, ...) that
/// forward to the hub. Planning-side roles land on the primary orchestrator;
/// other roles address their dedicated module.
async fn agent_entry(
    State(daemon): State<Arc<Daemon>>,
    Path(role): Path<String>,
    Json(request): Json<AgentEntryRequest>,
) -> ApiResult {
    let target = match role.as_str() {
        "understand" | "plan" | "chat" => daemon.config.primary_target.clone(),
        other => ModuleId::new(format!("agent-{other}")),
    };
    let message = build_message(
        &daemon,
        &MessageRequest {
            target: target.to_string(),
            message: request.message,
            blocking: true,
            sender: request.sender,
            callback_id: None,
        },
        &target,
    );
    blocking_send(&daemon, &target, message).await
}

// -- registry / events --

async fn list_modules(State(daemon): State<Arc<Daemon>>) -> ApiResult {
    match serde_json::to_value(daemon.hub.entries()) {
        Ok(modules) => (StatusCode::OK, Json(json!({"modules": modules}))),
        Err(e) => internal(e.to_string()),
    }
}

#[derive(Debug, Deserialize)]
struct RecentParams {
    limit: Option<usize>,
}

async fn recent_events(
    State(daemon): State<Arc<Daemon>>,
    Query(params): Query<RecentParams>,
) -> ApiResult {
    let events = daemon.events.recent(params.limit.unwrap_or(100));
    match serde_json::to_value(events) {
        Ok(events) => (StatusCode::OK, Json(json!({"events": events}))),
        Err(e) => internal(e.to_string()),
    }
}

// -- tools --

async fn list_tools(State(daemon): State<Arc<Daemon>>) -> ApiResult {
    match serde_json::to_value(daemon.policy.tools()) {
        Ok(tools) => (StatusCode::OK, Json(json!({"tools": tools}))),
        Err(e) => internal(e.to_string()),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ToolCallRequest {
    agent_id: String,
    tool: String,
    #[serde(default)]
    params: Value,
    #[serde(default)]
    token: Option<String>,
}

async fn call_tool(
    State(daemon): State<Arc<Daemon>>,
    Json(request): Json<ToolCallRequest>,
) -> ApiResult {
    let agent = ModuleId::new(&request.agent_id);
    match daemon
        .tools
        .call(&agent, &request.tool, &request.params, request.token.as_deref())
    {
        Ok(result) => (StatusCode::OK, Json(result)),
        Err(e) => policy_error(e),
    }
}

fn policy_error(error: PolicyError) -> ApiResult {
    let status = match &error {
        PolicyError::ToolNotFound(_) => StatusCode::NOT_FOUND,
        PolicyError::Denied { .. } => StatusCode::FORBIDDEN,
        PolicyError::AuthorizationRequired(_)
        | PolicyError::AuthorizationExpired
        | PolicyError::AuthorizationUsedUp
        | PolicyError::AuthorizationInvalid => StatusCode::UNAUTHORIZED,
    };
    (status, Json(json!({"ok": false, "error": error.to_string()})))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PolicyUpdate {
    #[serde(default)]
    role: Option<PolicyRole>,
    #[serde(default)]
    allowed: Option<Vec<String>>,
    #[serde(default)]
    denied: Option<Vec<String>>,
}

async fn get_policy(
    State(daemon): State<Arc<Daemon>>,
    Path(agent_id): Path<String>,
) -> ApiResult {
    let policy = daemon.policy.policy_for(&ModuleId::new(&agent_id));
    match serde_json::to_value(policy) {
        Ok(policy) => (StatusCode::OK, Json(policy)),
        Err(e) => internal(e.to_string()),
    }
}

async fn put_policy(
    State(daemon): State<Arc<Daemon>>,
    Path(agent_id): Path<String>,
    Json(update): Json<PolicyUpdate>,
) -> ApiResult {
    let agent = ModuleId::new(&agent_id);
    match update.role {
        Some(role) => daemon.policy.apply_preset(agent, role),
        None => daemon.policy.set_policy(
            agent,
            ToolPolicy {
                allowed: update.allowed.unwrap_or_default(),
                denied: update.denied.unwrap_or_default(),
            },
        ),
    }
    (StatusCode::OK, Json(json!({"updated": true})))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MintRequest {
    agent_id: String,
    tool_name: String,
    #[serde(default)]
    issued_by: Option<String>,
    #[serde(default)]
    ttl_ms: Option<u64>,
    #[serde(default)]
    max_uses: Option<u32>,
}

async fn mint_authorization(
    State(daemon): State<Arc<Daemon>>,
    Json(request): Json<MintRequest>,
) -> ApiResult {
    let grant = daemon.policy.issue_token(
        ModuleId::new(&request.agent_id),
        request.tool_name,
        request.issued_by.unwrap_or_else(|| "api".to_string()),
        request.ttl_ms,
        request.max_uses,
    );
    daemon.events.emit_for_agent(
        finger_core::EventType::ToolAuthorizationIssued,
        grant.agent_id.clone(),
        json!({"tool": grant.tool_name}),
    );
    match serde_json::to_value(grant) {
        Ok(grant) => (StatusCode::OK, Json(grant)),
        Err(e) => internal(e.to_string()),
    }
}

async fn revoke_authorization(
    State(daemon): State<Arc<Daemon>>,
    Path(token): Path<String>,
) -> ApiResult {
    let revoked = daemon.policy.revoke_token(&token);
    if revoked {
        daemon.events.emit(
            finger_core::EventType::ToolAuthorizationRevoked,
            json!({}),
        );
    }
    (StatusCode::OK, Json(json!({"revoked": revoked})))
}

// -- sessions --

fn session_error(error: SessionStoreError) -> ApiResult {
    let status = match &error {
        SessionStoreError::NotFound(_) | SessionStoreError::MessageNotFound(_) => {
            StatusCode::NOT_FOUND
        }
        SessionStoreError::InvalidState(_) => StatusCode::BAD_REQUEST,
        SessionStoreError::Persist(_) | SessionStoreError::Io(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    (status, Json(json!({"error": error.to_string()})))
}

fn internal(detail: String) -> ApiResult {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({"error": detail})),
    )
}

async fn list_sessions(State(daemon): State<Arc<Daemon>>) -> ApiResult {
    let mut sessions = daemon.sessions.sessions();
    sessions.sort_by_key(|s| s.created_at);
    match serde_json::to_value(sessions) {
        Ok(sessions) => (StatusCode::OK, Json(json!({"sessions": sessions}))),
        Err(e) => internal(e.to_string()),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateSessionRequest {
    project_path: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default = "default_true")]
    allow_reuse: bool,
}

fn default_true() -> bool {
    true
}

async fn create_session(
    State(daemon): State<Arc<Daemon>>,
    Json(request): Json<CreateSessionRequest>,
) -> ApiResult {
    if request.project_path.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "missing field: projectPath"})),
        );
    }
    match daemon.sessions.create_session(
        &request.project_path,
        request.name.as_deref(),
        request.allow_reuse,
    ) {
        Ok(session) => {
            daemon.events.emit_for_session(
                finger_core::EventType::SessionCreated,
                session.id.clone(),
                json!({"projectPath": session.project_path}),
            );
            match serde_json::to_value(session) {
                Ok(session) => (StatusCode::OK, Json(session)),
                Err(e) => internal(e.to_string()),
            }
        }
        Err(e) => session_error(e),
    }
}

async fn get_session(
    State(daemon): State<Arc<Daemon>>,
    Path(id): Path<String>,
) -> ApiResult {
    match daemon.sessions.touch_session(&SessionId::new(&id)) {
        Ok(session) => match serde_json::to_value(session) {
            Ok(session) => (StatusCode::OK, Json(session)),
            Err(e) => internal(e.to_string()),
        },
        Err(e) => session_error(e),
    }
}

async fn delete_session(
    State(daemon): State<Arc<Daemon>>,
    Path(id): Path<String>,
) -> ApiResult {
    match daemon.sessions.delete_session(&SessionId::new(&id)) {
        Ok(()) => (StatusCode::OK, Json(json!({"deleted": true}))),
        Err(e) => session_error(e),
    }
}

#[derive(Debug, Deserialize)]
struct MessagesParams {
    limit: Option<usize>,
}

async fn get_messages(
    State(daemon): State<Arc<Daemon>>,
    Path(id): Path<String>,
    Query(params): Query<MessagesParams>,
) -> ApiResult {
    let session_id = SessionId::new(&id);
    if daemon.sessions.get_session(&session_id).is_none() {
        return session_error(SessionStoreError::NotFound(session_id));
    }
    let messages = daemon
        .sessions
        .get_messages(&session_id, params.limit.unwrap_or(50));
    match serde_json::to_value(messages) {
        Ok(messages) => (StatusCode::OK, Json(json!({"messages": messages}))),
        Err(e) => internal(e.to_string()),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AddMessageRequest {
    role: Role,
    content: String,
    #[serde(default)]
    metadata: Option<Value>,
}

async fn add_message(
    State(daemon): State<Arc<Daemon>>,
    Path(id): Path<String>,
    Json(request): Json<AddMessageRequest>,
) -> ApiResult {
    let session_id = SessionId::new(&id);
    match daemon.sessions.add_message(
        &session_id,
        request.role,
        &request.content,
        request.metadata,
    ) {
        Ok(message) => {
            daemon.events.emit_for_session(
                finger_core::EventType::MessageAdded,
                session_id,
                json!({"messageId": message.id}),
            );
            match serde_json::to_value(message) {
                Ok(message) => (StatusCode::OK, Json(message)),
                Err(e) => internal(e.to_string()),
            }
        }
        Err(e) => session_error(e),
    }
}

#[derive(Debug, Deserialize)]
struct UpdateMessageRequest {
    content: String,
}

async fn update_message(
    State(daemon): State<Arc<Daemon>>,
    Path((id, message_id)): Path<(String, String)>,
    Json(request): Json<UpdateMessageRequest>,
) -> ApiResult {
    match daemon
        .sessions
        .update_message(&SessionId::new(&id), &message_id, &request.content)
    {
        Ok(()) => (StatusCode::OK, Json(json!({"updated": true}))),
        Err(e) => session_error(e),
    }
}

async fn delete_message(
    State(daemon): State<Arc<Daemon>>,
    Path((id, message_id)): Path<(String, String)>,
) -> ApiResult {
    match daemon
        .sessions
        .delete_message(&SessionId::new(&id), &message_id)
    {
        Ok(()) => (StatusCode::OK, Json(json!({"deleted": true}))),
        Err(e) => session_error(e),
    }
}

async fn pause_session(
    State(daemon): State<Arc<Daemon>>,
    Path(id): Path<String>,
) -> ApiResult {
    let session_id = SessionId::new(&id);
    match daemon.sessions.pause_session(&session_id) {
        Ok(()) => {
            daemon.events.emit_for_session(
                finger_core::EventType::SessionPaused,
                session_id,
                Value::Null,
            );
            (StatusCode::OK, Json(json!({"paused": true})))
        }
        Err(e) => session_error(e),
    }
}

async fn resume_session(
    State(daemon): State<Arc<Daemon>>,
    Path(id): Path<String>,
) -> ApiResult {
    let session_id = SessionId::new(&id);
    match daemon.sessions.resume_session(&session_id) {
        Ok(()) => {
            daemon.events.emit_for_session(
                finger_core::EventType::SessionResumed,
                session_id,
                Value::Null,
            );
            (StatusCode::OK, Json(json!({"paused": false})))
        }
        Err(e) => session_error(e),
    }
}

async fn compress_session(
    State(daemon): State<Arc<Daemon>>,
    Path(id): Path<String>,
) -> ApiResult {
    match daemon.sessions.compress_context(&SessionId::new(&id), None) {
        Ok(compressed) => (StatusCode::OK, Json(json!({"compressed": compressed}))),
        Err(e) => session_error(e),
    }
}

// -- workflows --

async fn list_workflows(State(daemon): State<Arc<Daemon>>) -> ApiResult {
    match daemon.workflows.list() {
        Ok(records) => match serde_json::to_value(records) {
            Ok(workflows) => (StatusCode::OK, Json(json!({"workflows": workflows}))),
            Err(e) => internal(e.to_string()),
        },
        Err(e) => internal(e.to_string()),
    }
}

async fn get_workflow(
    State(daemon): State<Arc<Daemon>>,
    Path(id): Path<String>,
) -> ApiResult {
    match daemon.workflows.load(&WorkflowId::new(&id)) {
        Ok(Some(record)) => match serde_json::to_value(record) {
            Ok(workflow) => (StatusCode::OK, Json(workflow)),
            Err(e) => internal(e.to_string()),
        },
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(json!({"error": format!("workflow not found: {id}")})),
        ),
        Err(e) => internal(e.to_string()),
    }
}

#[cfg(test)]
#[path = "http_tests.rs"]
mod tests;
