// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use finger_core::{FakeClock, MonotonicStamper};
use serde_json::json;
use tempfile::tempdir;

fn bus() -> EventBus {
    EventBus::new(Minter::new(MonotonicStamper::new(FakeClock::at(1_000))))
}

fn collect() -> (Arc<Mutex<Vec<Event>>>, impl Fn(&Event) + Send + Sync) {
    let seen: Arc<Mutex<Vec<Event>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    (seen, move |event: &Event| sink.lock().push(event.clone()))
}

#[test]
fn subscribe_by_type_filters() {
    let bus = bus();
    let (seen, handler) = collect();
    bus.subscribe(EventType::TaskStarted, handler);

    bus.emit(EventType::TaskStarted, json!({"n": 1}));
    bus.emit(EventType::TaskCompleted, json!({"n": 2}));

    let seen = seen.lock();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].event_type, EventType::TaskStarted);
}

#[test]
fn subscribe_multiple_and_group() {
    let bus = bus();
    let (by_types, type_handler) = collect();
    bus.subscribe_multiple(
        vec![EventType::ToolCall, EventType::ToolResult],
        type_handler,
    );
    let (by_group, group_handler) = collect();
    bus.subscribe_by_group(EventGroup::Tool, group_handler);

    bus.emit(EventType::ToolCall, json!({}));
    bus.emit(EventType::ToolError, json!({}));
    bus.emit(EventType::TaskStarted, json!({}));

    assert_eq!(by_types.lock().len(), 1);
    assert_eq!(by_group.lock().len(), 2);
}

#[test]
fn subscribe_all_sees_everything() {
    let bus = bus();
    let (seen, handler) = collect();
    bus.subscribe_all(handler);

    bus.emit(EventType::SystemStarted, json!({}));
    bus.emit(EventType::SessionCreated, json!({}));
    assert_eq!(seen.lock().len(), 2);
}

#[test]
fn unsubscribe_stops_delivery() {
    let bus = bus();
    let (seen, handler) = collect();
    let id = bus.subscribe_all(handler);

    bus.emit(EventType::SystemStarted, json!({}));
    assert!(bus.unsubscribe(id));
    bus.emit(EventType::SystemStarted, json!({}));

    assert_eq!(seen.lock().len(), 1);
    assert!(!bus.unsubscribe(id));
    assert_eq!(bus.subscriber_count(), 0);
}

#[test]
fn update_filter_narrows_a_live_subscription() {
    let bus = bus();
    let (seen, handler) = collect();
    let id = bus.subscribe_all(handler);

    bus.emit(EventType::TaskStarted, json!({}));
    assert!(bus.update_filter(
        id,
        SubscriptionFilter {
            types: None,
            groups: Some(vec![EventGroup::System]),
        }
    ));
    bus.emit(EventType::TaskStarted, json!({}));
    bus.emit(EventType::SystemStarted, json!({}));

    let seen = seen.lock();
    assert_eq!(seen.len(), 2);
    assert_eq!(seen[1].event_type, EventType::SystemStarted);
}

#[test]
fn one_failing_handler_does_not_block_later_handlers() {
    let bus = bus();
    // A handler whose downstream channel is gone just drops events.
    let (tx, rx) = std::sync::mpsc::channel::<Event>();
    drop(rx);
    bus.subscribe_all(move |event| {
        let _ = tx.send(event.clone());
    });
    let (seen, handler) = collect();
    bus.subscribe_all(handler);

    bus.emit(EventType::SystemStarted, json!({}));
    assert_eq!(seen.lock().len(), 1);
}

#[test]
fn timestamps_on_one_emitter_are_nondecreasing() {
    let bus = bus();
    for _ in 0..5 {
        bus.emit(EventType::WorkflowProgress, json!({}));
    }
    let events = bus.recent(10);
    for pair in events.windows(2) {
        assert!(pair[0].timestamp <= pair[1].timestamp);
    }
}

#[test]
fn ring_keeps_newest_events() {
    let bus = bus();
    for n in 0..1_100u32 {
        bus.emit(EventType::WorkflowProgress, json!({"n": n}));
    }
    let recent = bus.recent(usize::MAX);
    assert_eq!(recent.len(), 1_024);
    assert_eq!(recent.last().unwrap().payload["n"], 1_099);
    assert_eq!(recent[0].payload["n"], 76);

    let tail = bus.recent(10);
    assert_eq!(tail.len(), 10);
    assert_eq!(tail[0].payload["n"], 1_090);
}

#[test]
fn session_and_agent_variants_attach_ids() {
    let bus = bus();
    let event = bus.emit_for_session(
        EventType::SessionUpdated,
        SessionId::new("s-1"),
        json!({}),
    );
    assert_eq!(event.session_id, Some(SessionId::new("s-1")));

    let event = bus.emit_for_agent(EventType::AgentHeartbeat, ModuleId::new("a-1"), json!({}));
    assert_eq!(event.agent_id, Some(ModuleId::new("a-1")));
}

#[test]
fn persistence_appends_jsonl_lines() {
    let dir = tempdir().unwrap();
    let bus = EventBus::new(Minter::new(MonotonicStamper::new(FakeClock::at(1))))
        .with_persistence(EventLog::new(dir.path()));

    bus.emit(EventType::SystemStarted, json!({"pid": 1}));
    bus.emit(EventType::TaskStarted, json!({}));

    let files: Vec<_> = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().path())
        .collect();
    assert_eq!(files.len(), 1);
    let events = finger_storage::event_log::read_events(&files[0]).unwrap();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].event_type, EventType::SystemStarted);
}
