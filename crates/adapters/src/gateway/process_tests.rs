// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use finger_core::MonotonicStamper;
use serde_json::json;

/// POSIX sh loop that answers every request with an ack and a successful
/// result, echoing the request id back as the output.
const ECHO_SCRIPT: &str = r#"
while IFS= read -r line; do
  rid=${line#*\"requestId\":\"}
  rid=${rid%%\"*}
  printf '{"type":"ack","requestId":"%s","accepted":true}\n' "$rid"
  printf '{"type":"result","requestId":"%s","success":true,"output":"%s"}\n' "$rid" "$rid"
done
"#;

fn gateway_with(script: &str) -> (ProcessGateway, mpsc::Receiver<GatewayEnvelope>) {
    gateway_with_timeouts(script, ACK_TIMEOUT, RESULT_TIMEOUT)
}

fn gateway_with_timeouts(
    script: &str,
    ack: Duration,
    result: Duration,
) -> (ProcessGateway, mpsc::Receiver<GatewayEnvelope>) {
    let config = GatewayConfig::new(ModuleId::new("gw"), "sh")
        .with_args(vec!["-c".to_string(), script.to_string()])
        .with_timeouts(ack, result);
    ProcessGateway::new(config, Minter::new(MonotonicStamper::default()))
}

#[tokio::test]
async fn sync_request_resolves_with_result() {
    let (gateway, _inbound) = gateway_with(ECHO_SCRIPT);

    let reply = gateway
        .request(json!({"text": "hi"}), DeliveryMode::Sync)
        .await
        .unwrap();
    match reply {
        GatewayReply::Completed { request_id, output } => {
            assert!(request_id.as_str().starts_with("gw-"));
            assert_eq!(output.unwrap(), json!(request_id.as_str()));
        }
        other => panic!("unexpected reply: {other:?}"),
    }
    assert!(gateway.is_running());
    gateway.stop().await;
}

#[tokio::test]
async fn async_request_resolves_with_ack() {
    let (gateway, _inbound) = gateway_with(ECHO_SCRIPT);

    let reply = gateway
        .request(json!({"n": 1}), DeliveryMode::Async)
        .await
        .unwrap();
    match reply {
        GatewayReply::Accepted {
            accepted,
            gateway_id,
            message,
            ..
        } => {
            assert!(accepted);
            assert_eq!(gateway_id, ModuleId::new("gw"));
            assert!(message.is_none());
        }
        other => panic!("unexpected reply: {other:?}"),
    }
    gateway.stop().await;
}

#[tokio::test]
async fn rejected_ack_still_resolves() {
    let script = r#"
while IFS= read -r line; do
  rid=${line#*\"requestId\":\"}
  rid=${rid%%\"*}
  printf '{"type":"ack","requestId":"%s","accepted":false,"message":"queue full"}\n' "$rid"
done
"#;
    let (gateway, _inbound) = gateway_with(script);

    let reply = gateway.request(json!({}), DeliveryMode::Async).await.unwrap();
    match reply {
        GatewayReply::Accepted {
            accepted, message, ..
        } => {
            assert!(!accepted);
            assert_eq!(message.as_deref(), Some("queue full"));
        }
        other => panic!("unexpected reply: {other:?}"),
    }
    gateway.stop().await;
}

#[tokio::test]
async fn failed_result_surfaces_gateway_error() {
    let script = r#"
while IFS= read -r line; do
  rid=${line#*\"requestId\":\"}
  rid=${rid%%\"*}
  printf '{"type":"result","requestId":"%s","success":false,"error":"model unavailable"}\n' "$rid"
done
"#;
    let (gateway, _inbound) = gateway_with(script);

    let err = gateway
        .request(json!({}), DeliveryMode::Sync)
        .await
        .unwrap_err();
    match err {
        GatewayError::RequestFailed { error, .. } => assert_eq!(error, "model unavailable"),
        other => panic!("unexpected error: {other:?}"),
    }
    gateway.stop().await;
}

#[tokio::test]
async fn ack_timeout_when_gateway_stays_silent() {
    let script = "while IFS= read -r line; do :; done";
    let (gateway, _inbound) =
        gateway_with_timeouts(script, Duration::from_millis(100), RESULT_TIMEOUT);

    let err = gateway
        .request(json!({}), DeliveryMode::Async)
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::AckTimeout { after_ms: 100, .. }));
    // The pending entry was cleaned up.
    assert!(gateway.shared.pending_acks.lock().is_empty());
    gateway.stop().await;
}

#[tokio::test]
async fn malformed_lines_are_discarded() {
    let script = r#"
while IFS= read -r line; do
  rid=${line#*\"requestId\":\"}
  rid=${rid%%\"*}
  printf 'this is not json\n'
  printf '{"type":"bogus"}\n'
  printf '{"type":"result","requestId":"%s","success":true,"output":1}\n' "$rid"
done
"#;
    let (gateway, _inbound) = gateway_with(script);

    let reply = gateway.request(json!({}), DeliveryMode::Sync).await.unwrap();
    assert_eq!(reply.output(), Some(&json!(1)));
    gateway.stop().await;
}

#[tokio::test]
async fn child_exit_rejects_pending_and_preserves_exit_code() {
    let script = "IFS= read -r line; exit 7";
    let (gateway, _inbound) = gateway_with(script);

    let err = gateway
        .request(json!({}), DeliveryMode::Sync)
        .await
        .unwrap_err();
    match err {
        GatewayError::ProcessExited { reason } => assert!(reason.contains("exit code 7")),
        other => panic!("unexpected error: {other:?}"),
    }

    // Next request restarts the process and succeeds against a fresh child.
    // (The script exits after one request, so spawn count is observable.)
    let err2 = gateway
        .request(json!({}), DeliveryMode::Sync)
        .await
        .unwrap_err();
    assert!(matches!(err2, GatewayError::ProcessExited { .. }));
    gateway.stop().await;
}

#[tokio::test]
async fn restart_after_exit_serves_new_requests() {
    // First child exits immediately; ensure_started spawns a replacement
    // that answers normally.
    let script = r#"
if [ ! -f "$MARKER" ]; then
  : > "$MARKER"
  exit 3
fi
while IFS= read -r line; do
  rid=${line#*\"requestId\":\"}
  rid=${rid%%\"*}
  printf '{"type":"result","requestId":"%s","success":true,"output":"second"}\n' "$rid"
done
"#;
    let dir = tempfile::tempdir().unwrap();
    let marker = dir.path().join("spawned-once");
    let config = GatewayConfig::new(ModuleId::new("gw"), "sh")
        .with_args(vec!["-c".to_string(), script.to_string()])
        .with_env(vec![(
            "MARKER".to_string(),
            marker.to_string_lossy().to_string(),
        )])
        .with_timeouts(ACK_TIMEOUT, Duration::from_secs(5));
    let (gateway, _inbound) = ProcessGateway::new(config, Minter::new(MonotonicStamper::default()));

    let err = gateway
        .request(json!({}), DeliveryMode::Sync)
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::ProcessExited { .. }));

    let reply = gateway.request(json!({}), DeliveryMode::Sync).await.unwrap();
    assert_eq!(reply.output(), Some(&json!("second")));
    gateway.stop().await;
}

#[tokio::test]
async fn pipelined_requests_correlate_by_request_id() {
    // The child answers two requests in reverse order.
    let script = r#"
IFS= read -r a
IFS= read -r b
rida=${a#*\"requestId\":\"}; rida=${rida%%\"*}
ridb=${b#*\"requestId\":\"}; ridb=${ridb%%\"*}
printf '{"type":"result","requestId":"%s","success":true,"output":"%s"}\n' "$ridb" "$ridb"
printf '{"type":"result","requestId":"%s","success":true,"output":"%s"}\n' "$rida" "$rida"
while IFS= read -r line; do :; done
"#;
    let (gateway, _inbound) = gateway_with(script);

    let first = gateway.request(json!({"n": 1}), DeliveryMode::Sync);
    let second = gateway.request(json!({"n": 2}), DeliveryMode::Sync);
    let (first, second) = tokio::join!(first, second);

    for reply in [first.unwrap(), second.unwrap()] {
        match reply {
            GatewayReply::Completed { request_id, output } => {
                assert_eq!(output.unwrap(), json!(request_id.as_str()));
            }
            other => panic!("unexpected reply: {other:?}"),
        }
    }
    gateway.stop().await;
}

#[tokio::test]
async fn unsolicited_envelopes_are_forwarded() {
    let script = r#"
printf '{"type":"event","name":"boot","payload":{"ok":true}}\n'
printf '{"type":"input","sender":"gw","message":{"hello":true}}\n'
while IFS= read -r line; do
  rid=${line#*\"requestId\":\"}
  rid=${rid%%\"*}
  printf '{"type":"result","requestId":"%s","success":true}\n' "$rid"
done
"#;
    let (gateway, mut inbound) = gateway_with(script);

    gateway.request(json!({}), DeliveryMode::Sync).await.unwrap();

    let first = inbound.recv().await.unwrap();
    match first {
        GatewayEnvelope::Event { name, payload } => {
            assert_eq!(name, "boot");
            assert_eq!(payload.unwrap(), json!({"ok": true}));
        }
        other => panic!("unexpected envelope: {other:?}"),
    }
    let second = inbound.recv().await.unwrap();
    match second {
        GatewayEnvelope::Input { sender, message, .. } => {
            assert_eq!(sender.as_deref(), Some("gw"));
            assert_eq!(message, json!({"hello": true}));
        }
        other => panic!("unexpected envelope: {other:?}"),
    }
    gateway.stop().await;
}

#[tokio::test]
async fn stop_kills_the_child() {
    let (gateway, _inbound) = gateway_with(ECHO_SCRIPT);
    gateway.request(json!({}), DeliveryMode::Sync).await.unwrap();
    assert!(gateway.is_running());

    gateway.stop().await;
    // The reaper flips the alive flag once the child is gone.
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(!gateway.is_running());
}

#[tokio::test]
async fn spawn_failure_is_reported() {
    let config = GatewayConfig::new(
        ModuleId::new("gw"),
        "/nonexistent/binary/for/finger-tests",
    );
    let (gateway, _inbound) = ProcessGateway::new(config, Minter::new(MonotonicStamper::default()));
    let err = gateway
        .request(json!({}), DeliveryMode::Sync)
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::SpawnFailed(_)));
}
