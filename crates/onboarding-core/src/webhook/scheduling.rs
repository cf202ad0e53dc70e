// Copyright (C) 2025 The Well Solutions
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Scheduling (Calendly) events.

use serde::Deserialize;
use serde_json::Value;
use tracing::{info, warn};

use super::{WebhookAck, WebhookIngestor};
use crate::error::OnboardingError;

const INVITEE_CREATED: &str = "invitee.created";

#[derive(Debug, Deserialize)]
pub(super) struct SchedulingEvent {
    event: String,
    #[serde(default)]
    payload: Value,
}

impl SchedulingEvent {
    /// The record id carried in the booking link's `utm_content`.
    fn record_id(&self) -> Option<&str> {
        self.payload
            .pointer("/tracking/utm_content")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|id| !id.is_empty())
    }
}

impl WebhookIngestor {
    pub(super) async fn apply_scheduling_event(
        &self,
        event: SchedulingEvent,
    ) -> Result<WebhookAck, OnboardingError> {
        if event.event != INVITEE_CREATED {
            info!(event_type = %event.event, "Unhandled scheduling event");
            return Ok(WebhookAck::ignored(&event.event));
        }

        let Some(record_id) = event.record_id() else {
            warn!("Scheduling event without utm_content record id");
            return Ok(WebhookAck::rejected(
                "Cannot process Calendly event: missing zohoRecordId",
            ));
        };

        self.store
            .upsert_meeting_booking(record_id, &event.payload)
            .await?;
        info!(zoho_record_id = record_id, "Meeting booking stored");

        Ok(WebhookAck::processed(
            "Calendly invitee.created event processed successfully",
        ))
    }
}
