// Copyright (C) 2025 The Well Solutions
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Provider adapters.
//!
//! Each external system sits behind a trait so the engines can be driven by
//! the HTTP clients in production and by the in-memory mocks in tests.
//!
//! | Trait              | Production    | Concern                                |
//! |--------------------|---------------|----------------------------------------|
//! | [`CrmClient`]      | [`ZohoCrm`]   | record read/write, token refresh       |
//! | [`PaymentProvider`]| [`StripeClient`] | invoices, payment intents, checkout |
//! | [`SigningProvider`]| [`PandaDocClient`] | signing sessions and status       |
//! | [`AlertSink`]      | [`SlackAlerts`] | operational alerts                   |

pub mod mock;
pub mod pandadoc;
pub mod slack;
pub mod stripe;
pub mod zoho;

pub use self::pandadoc::PandaDocClient;
pub use self::slack::SlackAlerts;
pub use self::stripe::StripeClient;
pub use self::zoho::{TokenCache, ZohoCrm};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::model::{CrmRecord, InvoiceLinks};

// ============================================================================
// Errors
// ============================================================================

/// Failure talking to an external provider.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Credentials were refused or a token could not be obtained.
    #[error("{provider} authentication failed: {message}")]
    Unauthenticated {
        provider: &'static str,
        message: String,
    },

    /// The provider reports that the addressed object does not exist.
    #[error("{provider}: {message}")]
    NotFound {
        provider: &'static str,
        message: String,
    },

    /// The provider answered with an application-level refusal.
    #[error("{provider} rejected the request: {message}")]
    Rejected {
        provider: &'static str,
        message: String,
    },

    /// Network failure or non-success HTTP status.
    #[error("{provider} request failed: {message}")]
    Transport {
        provider: &'static str,
        message: String,
    },

    /// The response body did not have the expected shape.
    #[error("{provider} returned an unexpected response: {message}")]
    Decode {
        provider: &'static str,
        message: String,
    },
}

impl ProviderError {
    pub(crate) fn transport(provider: &'static str, err: impl std::fmt::Display) -> Self {
        Self::Transport {
            provider,
            message: err.to_string(),
        }
    }

    pub(crate) fn decode(provider: &'static str, err: impl std::fmt::Display) -> Self {
        Self::Decode {
            provider,
            message: err.to_string(),
        }
    }
}

// ============================================================================
// CRM
// ============================================================================

/// Read/write access to the CRM report holding onboarding records.
#[async_trait]
pub trait CrmClient: Send + Sync {
    /// A valid access token, refreshed when close to expiry.
    async fn access_token(&self) -> Result<String, ProviderError>;

    async fn get_record_by_id(&self, record_id: &str) -> Result<CrmRecord, ProviderError>;

    async fn get_records(&self) -> Result<Vec<CrmRecord>, ProviderError>;

    /// Partially update a record. Only the given columns change.
    async fn update_record(
        &self,
        record_id: &str,
        fields: Map<String, Value>,
    ) -> Result<(), ProviderError>;
}

// ============================================================================
// Payments
// ============================================================================

/// Input for an invoice-backed payment intent.
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentIntentRequest {
    pub record_id: String,
    pub customer_id: String,
    /// Amount in cents.
    pub amount: i64,
}

/// A finalized invoice and the secret that confirms its payment intent.
#[derive(Debug, Clone, PartialEq)]
pub struct InvoicePaymentIntent {
    pub client_secret: String,
    pub invoice_id: String,
}

/// Input for a hosted checkout session.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckoutRequest {
    pub record_id: String,
    pub customer_id: String,
    /// Amount in cents.
    pub amount: i64,
}

/// Payment processor operations.
#[async_trait]
pub trait PaymentProvider: Send + Sync {
    /// Find a customer by email or create one. Returns the customer id.
    async fn create_customer(&self, email: &str, name: Option<&str>)
    -> Result<String, ProviderError>;

    /// Create a hosted checkout session. Returns its URL.
    async fn create_checkout_session(
        &self,
        request: &CheckoutRequest,
    ) -> Result<String, ProviderError>;

    async fn create_invoice_payment_intent(
        &self,
        request: &PaymentIntentRequest,
    ) -> Result<InvoicePaymentIntent, ProviderError>;

    async fn retrieve_invoice(&self, invoice_id: &str) -> Result<InvoiceLinks, ProviderError>;

    /// The `type` of a payment method (`card`, `us_bank_account`, ...).
    async fn payment_method_type(&self, payment_method_id: &str)
    -> Result<Option<String>, ProviderError>;
}

// ============================================================================
// Signing
// ============================================================================

/// Recipient role whose signature completes the agreement.
pub const SIGNER_ROLE: &str = "Client";

/// A document recipient.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Recipient {
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub role: Option<String>,
    pub has_completed: bool,
    pub shared_link: Option<String>,
}

impl Recipient {
    pub fn full_name(&self) -> Option<String> {
        let name = [self.first_name.as_deref(), self.last_name.as_deref()]
            .into_iter()
            .flatten()
            .filter(|part| !part.trim().is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        (!name.is_empty()).then_some(name)
    }
}

/// A filled document field.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentField {
    pub field_id: Option<String>,
    pub name: Option<String>,
    pub value: Option<String>,
    /// Role of the recipient the field is assigned to.
    pub role: Option<String>,
}

/// Signing-provider view of a document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentDetails {
    pub id: String,
    pub status: String,
    pub recipients: Vec<Recipient>,
    pub fields: Vec<DocumentField>,
}

impl DocumentDetails {
    pub fn is_draft(&self) -> bool {
        self.status == "document.draft"
    }

    /// The recipient holding [`SIGNER_ROLE`].
    pub fn signer(&self) -> Option<&Recipient> {
        self.recipients.iter().find(|r| {
            r.role
                .as_deref()
                .is_some_and(|role| role.eq_ignore_ascii_case(SIGNER_ROLE))
        })
    }

    /// Value of the signer's title field, if filled.
    pub fn signer_title(&self) -> Option<String> {
        self.fields
            .iter()
            .filter(|f| {
                f.role
                    .as_deref()
                    .is_none_or(|role| role.eq_ignore_ascii_case(SIGNER_ROLE))
            })
            .find(|f| {
                [f.field_id.as_deref(), f.name.as_deref()]
                    .into_iter()
                    .flatten()
                    .any(|key| {
                        let key = key.to_ascii_lowercase();
                        key == "title" || key == "signer_title" || key == "signer title"
                    })
            })
            .and_then(|f| f.value.clone())
            .filter(|v| !v.trim().is_empty())
    }
}

/// Evidence that the signer has completed the document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignedDocument {
    pub shared_link: Option<String>,
    pub signer_name: Option<String>,
    pub signer_title: Option<String>,
}

/// Document-signing provider operations.
#[async_trait]
pub trait SigningProvider: Send + Sync {
    async fn document_details(&self, document_id: &str) -> Result<DocumentDetails, ProviderError>;

    /// Move a draft document to `sent` without emailing recipients.
    async fn send_document(&self, document_id: &str) -> Result<(), ProviderError>;

    /// Create an embedded signing session. Returns the session id.
    async fn create_session(
        &self,
        document_id: &str,
        recipient_email: &str,
    ) -> Result<String, ProviderError>;

    /// `Some` once the Client-role recipient has signed.
    async fn is_document_signed(
        &self,
        document_id: &str,
    ) -> Result<Option<SignedDocument>, ProviderError> {
        let details = self.document_details(document_id).await?;
        let Some(signer) = details.signer() else {
            return Ok(None);
        };
        if !signer.has_completed {
            return Ok(None);
        }

        Ok(Some(SignedDocument {
            shared_link: signer.shared_link.clone(),
            signer_name: signer.full_name(),
            signer_title: details.signer_title(),
        }))
    }
}

// ============================================================================
// Alerts
// ============================================================================

/// Context of an error worth paging on.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorAlert {
    pub message: String,
    pub status_code: u16,
    pub method: String,
    pub endpoint: String,
    pub timestamp: DateTime<Utc>,
    pub record_id: Option<String>,
    pub stack: Option<String>,
}

/// Context reported by the browser for a frontend failure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrontendErrorReport {
    pub error_message: String,
    pub stack_trace: Option<String>,
    pub record_id: Option<String>,
    pub component: Option<String>,
    pub page: Option<String>,
    pub user_action: Option<String>,
    pub browser_info: Option<String>,
    pub error_type: Option<String>,
    pub severity: Option<String>,
    pub additional_context: Option<Map<String, Value>>,
}

/// Fire-and-forget operational alerting.
///
/// Implementations log and swallow their own failures.
#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn send_message(&self, text: &str);

    async fn send_error_alert(&self, alert: &ErrorAlert);

    async fn send_frontend_alert(&self, report: &FrontendErrorReport);
}
