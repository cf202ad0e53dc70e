// Copyright (C) 2025 The Well Solutions
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Webhook ingestion.
//!
//! Scheduling and payment providers push events here. Each delivery is
//! authenticated over its raw body, then folded into the record store with
//! an idempotent upsert. Ingestion never writes to the CRM; the
//! reconciliation engine picks the new state up on the client's next visit.

mod payment;
mod scheduling;
pub mod signature;

pub use payment::payment_source_label;
pub use signature::SignatureError;

use std::sync::Arc;

use serde::Serialize;
use tracing::warn;

use crate::adapters::{AlertSink, PaymentProvider};
use crate::error::OnboardingError;
use crate::notify::PaymentNotifier;
use crate::store::RecordStore;

/// Header carrying the scheduling provider's signature.
pub const CALENDLY_SIGNATURE_HEADER: &str = "Calendly-Webhook-Signature";

/// Header carrying the payment provider's signature.
pub const STRIPE_SIGNATURE_HEADER: &str = "Stripe-Signature";

/// Shared secrets for webhook authentication.
#[derive(Debug, Clone, Default)]
pub struct WebhookSecrets {
    pub calendly: Option<String>,
    pub stripe: Option<String>,
}

/// Acknowledgement returned to the provider.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WebhookAck {
    pub success: bool,
    pub message: String,
}

impl WebhookAck {
    fn processed(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    fn rejected(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }

    fn ignored(event_type: &str) -> Self {
        Self::processed(format!(
            "Event {event_type} received but not processed - event type not supported"
        ))
    }
}

pub struct WebhookIngestor {
    store: Arc<dyn RecordStore>,
    payments: Arc<dyn PaymentProvider>,
    notifier: Arc<PaymentNotifier>,
    alerts: Arc<dyn AlertSink>,
    secrets: WebhookSecrets,
}

impl WebhookIngestor {
    pub fn new(
        store: Arc<dyn RecordStore>,
        payments: Arc<dyn PaymentProvider>,
        notifier: Arc<PaymentNotifier>,
        alerts: Arc<dyn AlertSink>,
        secrets: WebhookSecrets,
    ) -> Self {
        Self {
            store,
            payments,
            notifier,
            alerts,
            secrets,
        }
    }

    /// Authenticate and apply a scheduling delivery.
    pub async fn handle_calendly(
        &self,
        signature: Option<&str>,
        body: &[u8],
    ) -> Result<WebhookAck, OnboardingError> {
        signature::verify_calendly(self.secrets.calendly.as_deref(), signature, body)
            .map_err(|e| unauthorized("calendly", e))?;
        let event = serde_json::from_slice(body)
            .map_err(|e| OnboardingError::validation("body", e.to_string()))?;
        self.apply_scheduling_event(event).await
    }

    /// Authenticate and apply a payment delivery.
    pub async fn handle_stripe(
        &self,
        signature: Option<&str>,
        body: &[u8],
    ) -> Result<WebhookAck, OnboardingError> {
        signature::verify_stripe(self.secrets.stripe.as_deref(), signature, body)
            .map_err(|e| unauthorized("stripe", e))?;
        let event = serde_json::from_slice(body)
            .map_err(|e| OnboardingError::validation("body", e.to_string()))?;
        self.apply_payment_event(event).await
    }
}

fn unauthorized(provider: &str, err: SignatureError) -> OnboardingError {
    warn!(provider, error = %err, "Webhook signature rejected");
    OnboardingError::Unauthorized(format!("Invalid {provider} webhook signature: {err}"))
}
