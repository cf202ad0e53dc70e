// Copyright (C) 2025 The Well Solutions
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Payment push channel.
//!
//! Browsers waiting on a delayed payment subscribe to a per-record room.
//! Webhook ingestion publishes into the room; nothing is queued for
//! subscribers that connect later, so polling `check-payment-status`
//! remains the fallback.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;

/// Messages buffered per room before slow subscribers start lagging.
const ROOM_CAPACITY: usize = 16;

/// Event pushed to a record's room.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PaymentEvent {
    #[serde(rename_all = "camelCase")]
    PaymentSucceeded {
        record_id: String,
        payment_id: Option<String>,
        payment_source: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    PaymentFailed {
        record_id: String,
        payment_id: Option<String>,
        error_message: Option<String>,
    },
}

impl PaymentEvent {
    pub fn record_id(&self) -> &str {
        match self {
            PaymentEvent::PaymentSucceeded { record_id, .. }
            | PaymentEvent::PaymentFailed { record_id, .. } => record_id,
        }
    }
}

/// Room registry keyed by record id.
#[derive(Default)]
pub struct PaymentNotifier {
    rooms: DashMap<String, broadcast::Sender<PaymentEvent>>,
}

impl PaymentNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Join the room for `record_id`, creating it on first use.
    pub fn subscribe(&self, record_id: &str) -> broadcast::Receiver<PaymentEvent> {
        self.rooms
            .entry(record_id.to_string())
            .or_insert_with(|| broadcast::channel(ROOM_CAPACITY).0)
            .subscribe()
    }

    /// Deliver `event` to current subscribers. Returns how many received it.
    pub fn publish(&self, event: PaymentEvent) -> usize {
        let record_id = event.record_id().to_string();
        let Some(sender) = self.rooms.get(&record_id).map(|s| s.clone()) else {
            debug!(record_id = %record_id, "No payment subscribers, event dropped");
            return 0;
        };

        match sender.send(event) {
            Ok(delivered) => delivered,
            Err(_) => {
                // Everyone left; forget the room.
                self.rooms
                    .remove_if(&record_id, |_, s| s.receiver_count() == 0);
                debug!(record_id = %record_id, "Payment room empty, event dropped");
                0
            }
        }
    }

    /// Rooms with at least one subscriber.
    pub fn active_rooms(&self) -> usize {
        self.rooms
            .iter()
            .filter(|entry| entry.value().receiver_count() > 0)
            .count()
    }
}
