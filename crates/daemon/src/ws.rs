// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! WebSocket event stream.
//!
//! Runs on its own port. A client connects, optionally sends
//! `{"type":"subscribe","types":[...],"groups":[...]}` to narrow its filter,
//! and receives matching events as JSON text frames. Closed sockets are
//! skipped: the bus handler feeds a bounded channel, and the forwarding task
//! unsubscribes when the socket goes away.

use crate::event_bus::{EventBus, SubscriptionFilter};
use axum::extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use axum::routing::any;
use axum::Router;
use finger_core::Event;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Router for the event-stream port.
pub fn router(events: Arc<EventBus>) -> Router {
    Router::new()
        .route("/", any(upgrade))
        .with_state(events)
}

async fn upgrade(State(events): State<Arc<EventBus>>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, events))
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum ClientMessage {
    Subscribe {
        #[serde(flatten)]
        filter: SubscriptionFilter,
    },
}

async fn handle_socket(socket: WebSocket, events: Arc<EventBus>) {
    let (mut sink, mut stream) = socket.split();

    // Events flow bus -> channel -> socket. try_send keeps a slow client
    // from ever blocking emit; overflow drops frames for this client only.
    let (tx, mut rx) = mpsc::channel::<Event>(256);
    let subscription = events.subscribe_filtered(SubscriptionFilter::all(), move |event| {
        let _ = tx.try_send(event.clone());
    });

    loop {
        tokio::select! {
            incoming = stream.next() => match incoming {
                Some(Ok(WsMessage::Text(text))) => {
                    match serde_json::from_str::<ClientMessage>(&text) {
                        Ok(ClientMessage::Subscribe { filter }) => {
                            events.update_filter(subscription, filter);
                        }
                        Err(e) => {
                            tracing::debug!(error = %e, "ignoring malformed ws message");
                        }
                    }
                }
                Some(Ok(WsMessage::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::debug!(error = %e, "ws receive error");
                    break;
                }
            },
            event = rx.recv() => match event {
                Some(event) => {
                    let frame = match serde_json::to_string(&event) {
                        Ok(frame) => frame,
                        Err(e) => {
                            tracing::warn!(error = %e, "failed to serialize event");
                            continue;
                        }
                    };
                    if sink.send(WsMessage::Text(frame.into())).await.is_err() {
                        break;
                    }
                }
                None => break,
            },
        }
    }

    events.unsubscribe(subscription);
}

#[cfg(test)]
#[path = "ws_tests.rs"]
mod tests;
