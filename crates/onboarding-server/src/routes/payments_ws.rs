// Copyright (C) 2025 The Well Solutions
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Payment push channel.
//!
//! A client opens `/api/payments/ws?recordId=...` and joins the room of its
//! record. Every [`PaymentEvent`] published for that record is forwarded as
//! a JSON text frame until either side goes away.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use futures::{SinkExt, StreamExt};
use onboarding_core::PaymentEvent;
use tokio::sync::broadcast::Receiver;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, warn};

use super::onboarding::RecordQuery;
use super::require_record_id;
use crate::AppState;
use crate::error::ApiError;

pub fn router() -> Router<AppState> {
    Router::new().route("/ws", get(subscribe))
}

async fn subscribe(
    State(state): State<AppState>,
    Query(query): Query<RecordQuery>,
    ws: WebSocketUpgrade,
) -> Result<Response, ApiError> {
    let record_id = require_record_id(query.record_id)?;
    let events = state.notifier.subscribe(&record_id);
    debug!(record_id = %record_id, "Client joined payment room");
    Ok(ws.on_upgrade(move |socket| forward_events(socket, events, record_id)))
}

async fn forward_events(socket: WebSocket, mut events: Receiver<PaymentEvent>, record_id: String) {
    let (mut sender, mut receiver) = socket.split();

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) => {
                    let json = match serde_json::to_string(&event) {
                        Ok(json) => json,
                        Err(e) => {
                            warn!(record_id = %record_id, error = %e, "Failed to encode payment event");
                            continue;
                        }
                    };
                    if sender.send(Message::Text(json.into())).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(record_id = %record_id, skipped, "Payment room subscriber lagged");
                }
                Err(RecvError::Closed) => break,
            },
            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }

    debug!(record_id = %record_id, "Client left payment room");
}
