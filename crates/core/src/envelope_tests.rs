// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use serde_json::json;

#[test]
fn request_wire_format() {
    let envelope = GatewayEnvelope::Request {
        request_id: RequestId::new("exec-1700000000000-1"),
        delivery_mode: DeliveryMode::Sync,
        message: json!({"text": "hi"}),
    };
    let value = serde_json::to_value(&envelope).unwrap();
    assert_eq!(value["type"], "request");
    assert_eq!(value["requestId"], "exec-1700000000000-1");
    assert_eq!(value["deliveryMode"], "sync");
}

#[test]
fn parses_ack_line() {
    let line = r#"{"type":"ack","requestId":"m-1-1","accepted":true}"#;
    let envelope = GatewayEnvelope::parse_line(line).unwrap();
    match envelope {
        GatewayEnvelope::Ack {
            request_id,
            accepted,
            message,
        } => {
            assert_eq!(request_id, "m-1-1");
            assert!(accepted);
            assert!(message.is_none());
        }
        other => panic!("unexpected envelope: {other:?}"),
    }
}

#[test]
fn parses_failed_result() {
    let line = r#"{"type":"result","requestId":"m-1-2","success":false,"error":"model unavailable"}"#;
    let envelope = GatewayEnvelope::parse_line(line).unwrap();
    match envelope {
        GatewayEnvelope::Result { success, error, .. } => {
            assert!(!success);
            assert_eq!(error.as_deref(), Some("model unavailable"));
        }
        other => panic!("unexpected envelope: {other:?}"),
    }
}

#[test]
fn parses_unsolicited_input_and_event() {
    let input =
        GatewayEnvelope::parse_line(r#"{"type":"input","target":"orchestrator","message":{}}"#)
            .unwrap();
    match input {
        GatewayEnvelope::Input { target, blocking, .. } => {
            assert_eq!(target, Some(ModuleId::new("orchestrator")));
            assert!(blocking.is_none());
        }
        other => panic!("unexpected envelope: {other:?}"),
    }

    let event = GatewayEnvelope::parse_line(r#"{"type":"event","name":"progress"}"#).unwrap();
    match event {
        GatewayEnvelope::Event { name, payload } => {
            assert_eq!(name, "progress");
            assert!(payload.is_none());
        }
        other => panic!("unexpected envelope: {other:?}"),
    }
}

#[test]
fn rejects_garbage_lines() {
    assert!(GatewayEnvelope::parse_line("not json").is_err());
    assert!(GatewayEnvelope::parse_line(r#"{"type":"unknown"}"#).is_err());
    assert!(GatewayEnvelope::parse_line(r#"{"type":"ack"}"#).is_err()); // missing requestId
}

#[test]
fn to_line_round_trips() {
    let envelope = GatewayEnvelope::Input {
        target: None,
        sender: Some("gateway-1".into()),
        blocking: Some(true),
        message: json!({"k": "v"}),
    };
    let line = envelope.to_line().unwrap();
    assert!(!line.contains('\n'));
    assert_eq!(GatewayEnvelope::parse_line(&line).unwrap(), envelope);
}

#[test]
fn request_id_accessor() {
    let envelope = GatewayEnvelope::Event { name: "x".into(), payload: None };
    assert!(envelope.request_id().is_none());

    let ack = GatewayEnvelope::Ack {
        request_id: RequestId::new("r-1"),
        accepted: false,
        message: Some("queue full".into()),
    };
    assert_eq!(ack.request_id(), Some(&RequestId::new("r-1")));
}
