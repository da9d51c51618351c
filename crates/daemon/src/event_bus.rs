// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Typed pub/sub event bus.
//!
//! `emit` fans out synchronously to matching subscribers; a recent-events
//! ring supports catch-up queries; when persistence is configured every
//! event is appended to the JSONL log. Subscribers that fail (a full or
//! closed channel behind the handler) never prevent later subscribers.

use finger_core::{Event, EventGroup, EventType, Minter, ModuleId, SessionId};
use finger_storage::EventLog;
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Capacity of the recent-events ring; the oldest entries are evicted.
const RING_CAPACITY: usize = 1024;

/// Per-subscription filter. Empty filter matches everything.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SubscriptionFilter {
    #[serde(default)]
    pub types: Option<Vec<EventType>>,
    #[serde(default)]
    pub groups: Option<Vec<EventGroup>>,
}

impl SubscriptionFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn matches(&self, event: &Event) -> bool {
        if let Some(types) = &self.types {
            if !types.contains(&event.event_type) {
                return false;
            }
        }
        if let Some(groups) = &self.groups {
            if !groups.contains(&event.group()) {
                return false;
            }
        }
        true
    }
}

/// Handle for removing a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionId(u64);

type Handler = Arc<dyn Fn(&Event) + Send + Sync>;

struct Subscriber {
    id: SubscriptionId,
    filter: SubscriptionFilter,
    handler: Handler,
}

/// The daemon event bus.
pub struct EventBus {
    minter: Minter,
    subscribers: Mutex<Vec<Subscriber>>,
    ring: Mutex<VecDeque<Event>>,
    persist: Option<EventLog>,
    next_id: AtomicU64,
}

impl EventBus {
    pub fn new(minter: Minter) -> Self {
        Self {
            minter,
            subscribers: Mutex::new(Vec::new()),
            ring: Mutex::new(VecDeque::with_capacity(RING_CAPACITY)),
            persist: None,
            next_id: AtomicU64::new(1),
        }
    }

    /// Persist every emitted event to the given JSONL log.
    pub fn with_persistence(mut self, log: EventLog) -> Self {
        self.persist = Some(log);
        self
    }

    // -- subscriptions --

    pub fn subscribe(
        &self,
        event_type: EventType,
        handler: impl Fn(&Event) + Send + Sync + 'static,
    ) -> SubscriptionId {
        self.subscribe_filtered(
            SubscriptionFilter {
                types: Some(vec![event_type]),
                groups: None,
            },
            handler,
        )
    }

    pub fn subscribe_multiple(
        &self,
        types: Vec<EventType>,
        handler: impl Fn(&Event) + Send + Sync + 'static,
    ) -> SubscriptionId {
        self.subscribe_filtered(
            SubscriptionFilter {
                types: Some(types),
                groups: None,
            },
            handler,
        )
    }

    pub fn subscribe_by_group(
        &self,
        group: EventGroup,
        handler: impl Fn(&Event) + Send + Sync + 'static,
    ) -> SubscriptionId {
        self.subscribe_filtered(
            SubscriptionFilter {
                types: None,
                groups: Some(vec![group]),
            },
            handler,
        )
    }

    pub fn subscribe_all(
        &self,
        handler: impl Fn(&Event) + Send + Sync + 'static,
    ) -> SubscriptionId {
        self.subscribe_filtered(SubscriptionFilter::all(), handler)
    }

    pub fn subscribe_filtered(
        &self,
        filter: SubscriptionFilter,
        handler: impl Fn(&Event) + Send + Sync + 'static,
    ) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::SeqCst));
        self.subscribers.lock().push(Subscriber {
            id,
            filter,
            handler: Arc::new(handler),
        });
        id
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self.subscribers.lock();
        let before = subscribers.len();
        subscribers.retain(|s| s.id != id);
        subscribers.len() != before
    }

    /// Replace the filter of an existing subscription (WS re-subscribe).
    pub fn update_filter(&self, id: SubscriptionId, filter: SubscriptionFilter) -> bool {
        let mut subscribers = self.subscribers.lock();
        match subscribers.iter_mut().find(|s| s.id == id) {
            Some(subscriber) => {
                subscriber.filter = filter;
                true
            }
            None => false,
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }

    // -- emission --

    /// Mint and emit an event.
    pub fn emit(&self, event_type: EventType, payload: Value) -> Event {
        let event = Event::new(
            self.minter.mint("ev"),
            event_type,
            self.minter.now_ms(),
            payload,
        );
        self.emit_event(event.clone());
        event
    }

    pub fn emit_for_session(
        &self,
        event_type: EventType,
        session_id: SessionId,
        payload: Value,
    ) -> Event {
        let event = Event::new(
            self.minter.mint("ev"),
            event_type,
            self.minter.now_ms(),
            payload,
        )
        .with_session(session_id);
        self.emit_event(event.clone());
        event
    }

    pub fn emit_for_agent(
        &self,
        event_type: EventType,
        agent_id: ModuleId,
        payload: Value,
    ) -> Event {
        let event = Event::new(
            self.minter.mint("ev"),
            event_type,
            self.minter.now_ms(),
            payload,
        )
        .with_agent(agent_id);
        self.emit_event(event.clone());
        event
    }

    /// Synchronous fan-out of a prebuilt event.
    pub fn emit_event(&self, event: Event) {
        {
            let mut ring = self.ring.lock();
            if ring.len() == RING_CAPACITY {
                ring.pop_front();
            }
            ring.push_back(event.clone());
        }

        if let Some(log) = &self.persist {
            if let Err(e) = log.append(&event) {
                tracing::warn!(error = %e, "failed to persist event");
            }
        }

        // Snapshot the handler list so subscriber callbacks run without the
        // lock and cannot block subscription changes.
        let handlers: Vec<Handler> = {
            let subscribers = self.subscribers.lock();
            subscribers
                .iter()
                .filter(|s| s.filter.matches(&event))
                .map(|s| Arc::clone(&s.handler))
                .collect()
        };
        for handler in handlers {
            handler(&event);
        }
    }

    /// Newest `limit` events, oldest first.
    pub fn recent(&self, limit: usize) -> Vec<Event> {
        let ring = self.ring.lock();
        let skip = ring.len().saturating_sub(limit);
        ring.iter().skip(skip).cloned().collect()
    }
}

#[cfg(test)]
#[path = "event_bus_tests.rs"]
mod tests;
