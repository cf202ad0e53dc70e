// Copyright (C) 2025 The Well Solutions
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Payment (Stripe) events.
//!
//! Only payment intents created through `create_payment_intent` are known
//! to the store; events for any other client secret are acknowledged and
//! dropped.

use serde::Deserialize;
use tracing::{info, warn};

use super::{WebhookAck, WebhookIngestor};
use crate::error::OnboardingError;
use crate::model::{PaymentRecord, PaymentStatus, PaymentUpdate};
use crate::notify::PaymentEvent;

pub const CARD_LABEL: &str = "Credit Card/Debit Card";
pub const BANK_TRANSFER_LABEL: &str = "Bank Transfer";

/// Method types that settle after a delay.
const DELAYED_METHODS: [&str; 5] = [
    "us_bank_account",
    "customer_balance",
    "sepa_debit",
    "ach_debit",
    "ach_credit_transfer",
];

/// Human label stored as the payment source.
pub fn payment_source_label(method_type: &str) -> String {
    if method_type == "card" {
        CARD_LABEL.to_string()
    } else if DELAYED_METHODS.contains(&method_type) {
        BANK_TRANSFER_LABEL.to_string()
    } else {
        method_type.to_string()
    }
}

#[derive(Debug, Deserialize)]
pub(super) struct PaymentEventEnvelope {
    #[serde(rename = "type")]
    event_type: String,
    data: EventData,
}

#[derive(Debug, Deserialize)]
struct EventData {
    object: PaymentIntentObject,
}

#[derive(Debug, Deserialize)]
struct PaymentIntentObject {
    id: Option<String>,
    client_secret: Option<String>,
    amount_received: Option<i64>,
    amount: Option<i64>,
    payment_method: Option<String>,
    #[serde(default)]
    payment_method_types: Vec<String>,
    invoice: Option<String>,
    last_payment_error: Option<LastPaymentError>,
}

#[derive(Debug, Deserialize)]
struct LastPaymentError {
    message: Option<String>,
}

impl WebhookIngestor {
    pub(super) async fn apply_payment_event(
        &self,
        envelope: PaymentEventEnvelope,
    ) -> Result<WebhookAck, OnboardingError> {
        let status = match envelope.event_type.as_str() {
            "payment_intent.succeeded" => PaymentStatus::Succeeded,
            "payment_intent.payment_failed" => PaymentStatus::Failed,
            "payment_intent.processing" => PaymentStatus::Processing,
            other => {
                info!(event_type = other, "Unhandled payment event");
                return Ok(WebhookAck::ignored(other));
            }
        };

        let intent = envelope.data.object;
        let Some(secret) = intent.client_secret.as_deref() else {
            warn!(event_type = %envelope.event_type, "Payment event without client secret");
            return Ok(WebhookAck::processed("Payment event without client secret ignored"));
        };
        let Some(payment) = self.store.find_payment_by_client_secret(secret).await? else {
            info!(
                payment_id = ?intent.id,
                "Payment event for unknown payment intent ignored"
            );
            return Ok(WebhookAck::processed("Unknown payment intent ignored"));
        };

        match status {
            PaymentStatus::Succeeded => self.payment_succeeded(&payment, &intent).await?,
            PaymentStatus::Failed => self.payment_failed(&payment, &intent).await?,
            PaymentStatus::Processing => {
                self.apply_update(secret, PaymentUpdate {
                    status,
                    payment_id: intent.id.clone(),
                    payment_source: None,
                    amount: None,
                    hosted_invoice_url: None,
                    error_message: None,
                })
                .await?;
            }
        }

        Ok(WebhookAck::processed(format!(
            "Stripe {} event processed successfully",
            envelope.event_type
        )))
    }

    async fn payment_succeeded(
        &self,
        payment: &PaymentRecord,
        intent: &PaymentIntentObject,
    ) -> Result<(), OnboardingError> {
        let method_type = self.method_type(intent).await;
        let payment_source = method_type.as_deref().map(payment_source_label);
        let hosted_invoice_url = self.hosted_invoice_url(payment, intent).await;

        self.apply_update(&payment.client_secret, PaymentUpdate {
            status: PaymentStatus::Succeeded,
            payment_id: intent.id.clone(),
            payment_source: payment_source.clone(),
            amount: intent.amount_received.or(intent.amount),
            hosted_invoice_url,
            error_message: None,
        })
        .await?;

        if method_type
            .as_deref()
            .is_some_and(|m| DELAYED_METHODS.contains(&m))
        {
            self.notifier.publish(PaymentEvent::PaymentSucceeded {
                record_id: payment.zoho_record_id.clone(),
                payment_id: intent.id.clone(),
                payment_source,
            });
        }
        Ok(())
    }

    async fn payment_failed(
        &self,
        payment: &PaymentRecord,
        intent: &PaymentIntentObject,
    ) -> Result<(), OnboardingError> {
        let error_message = intent
            .last_payment_error
            .as_ref()
            .and_then(|e| e.message.clone())
            .or_else(|| Some("Payment failed".to_string()));

        self.apply_update(&payment.client_secret, PaymentUpdate {
            status: PaymentStatus::Failed,
            payment_id: intent.id.clone(),
            payment_source: None,
            amount: None,
            hosted_invoice_url: None,
            error_message: error_message.clone(),
        })
        .await?;

        self.notifier.publish(PaymentEvent::PaymentFailed {
            record_id: payment.zoho_record_id.clone(),
            payment_id: intent.id.clone(),
            error_message: error_message.clone(),
        });
        self.alerts
            .send_message(&format!(
                "Payment failed for record {}: {}",
                payment.zoho_record_id,
                error_message.as_deref().unwrap_or("unknown error")
            ))
            .await;
        Ok(())
    }

    async fn apply_update(&self, secret: &str, update: PaymentUpdate) -> Result<(), OnboardingError> {
        let status = update.status;
        if let Some(record) = self.store.update_payment_by_secret(secret, &update).await? {
            info!(
                zoho_record_id = %record.zoho_record_id,
                status = %status,
                "Payment record updated"
            );
        }
        Ok(())
    }

    /// The settled method type, looked up from the payment method and
    /// falling back to the first allowed type.
    async fn method_type(&self, intent: &PaymentIntentObject) -> Option<String> {
        if let Some(pm) = intent.payment_method.as_deref() {
            match self.payments.payment_method_type(pm).await {
                Ok(Some(kind)) => return Some(kind),
                Ok(None) => {}
                Err(e) => warn!(payment_method = pm, error = %e, "Payment method lookup failed"),
            }
        }
        intent.payment_method_types.first().cloned()
    }

    /// Hosted invoice URL; lookup failures keep whatever is stored.
    async fn hosted_invoice_url(
        &self,
        payment: &PaymentRecord,
        intent: &PaymentIntentObject,
    ) -> Option<String> {
        let invoice_id = intent.invoice.as_deref().or(payment.invoice_id.as_deref())?;
        match self.payments.retrieve_invoice(invoice_id).await {
            Ok(invoice) => invoice.hosted_invoice_url,
            Err(e) => {
                warn!(invoice_id, error = %e, "Invoice lookup failed");
                None
            }
        }
    }
}
