// Copyright (C) 2025 The Well Solutions
// SPDX-License-Identifier: AGPL-3.0-or-later
//! In-memory provider adapters for testing.
//!
//! Each mock records the calls it receives so tests can assert on how many
//! provider round-trips an operation made.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::Mutex;

use crate::model::{CrmRecord, InvoiceLinks};

use super::{
    AlertSink, CheckoutRequest, CrmClient, DocumentDetails, ErrorAlert, FrontendErrorReport,
    InvoicePaymentIntent, PaymentIntentRequest, PaymentProvider, ProviderError, Recipient,
    SIGNER_ROLE, SigningProvider,
};

fn crm_record(record_id: &str, fields: Value) -> CrmRecord {
    let mut map = match fields {
        Value::Object(map) => map,
        _ => Map::new(),
    };
    map.insert("ID".to_string(), Value::String(record_id.to_string()));
    CrmRecord::new(map)
}

// ============================================================================
// CRM
// ============================================================================

/// CRM mock holding records in memory. Updates are merged into the stored
/// record, so a later read observes earlier pushes.
#[derive(Default)]
pub struct MockCrm {
    records: Mutex<HashMap<String, CrmRecord>>,
    updates: Mutex<Vec<(String, Map<String, Value>)>>,
    unavailable: AtomicBool,
}

impl MockCrm {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a record; `fields` must be a JSON object. `ID` is filled in.
    pub fn with_record(mut self, record_id: &str, fields: Value) -> Self {
        self.records
            .get_mut()
            .insert(record_id.to_string(), crm_record(record_id, fields));
        self
    }

    pub async fn insert(&self, record_id: &str, fields: Value) {
        self.records
            .lock()
            .await
            .insert(record_id.to_string(), crm_record(record_id, fields));
    }

    /// Make every call fail with a transport error.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub async fn record(&self, record_id: &str) -> Option<CrmRecord> {
        self.records.lock().await.get(record_id).cloned()
    }

    pub async fn updates(&self) -> Vec<(String, Map<String, Value>)> {
        self.updates.lock().await.clone()
    }

    pub async fn update_count(&self) -> usize {
        self.updates.lock().await.len()
    }

    fn check_available(&self) -> Result<(), ProviderError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(ProviderError::Transport {
                provider: "zoho",
                message: "mock CRM unavailable".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl CrmClient for MockCrm {
    async fn access_token(&self) -> Result<String, ProviderError> {
        self.check_available()?;
        Ok("mock-token".to_string())
    }

    async fn get_record_by_id(&self, record_id: &str) -> Result<CrmRecord, ProviderError> {
        self.check_available()?;
        self.record(record_id).await.ok_or_else(|| ProviderError::NotFound {
            provider: "zoho",
            message: format!("No Data Available for record {record_id}"),
        })
    }

    async fn get_records(&self) -> Result<Vec<CrmRecord>, ProviderError> {
        self.check_available()?;
        let mut records: Vec<_> = self.records.lock().await.values().cloned().collect();
        records.sort_by_key(|r| r.id());
        Ok(records)
    }

    async fn update_record(
        &self,
        record_id: &str,
        fields: Map<String, Value>,
    ) -> Result<(), ProviderError> {
        self.check_available()?;
        let mut records = self.records.lock().await;
        let record = records
            .get_mut(record_id)
            .ok_or_else(|| ProviderError::NotFound {
                provider: "zoho",
                message: format!("No Data Available for record {record_id}"),
            })?;
        record.merge(&fields);
        self.updates
            .lock()
            .await
            .push((record_id.to_string(), fields));
        Ok(())
    }
}

// ============================================================================
// Payments
// ============================================================================

/// Payment-provider mock issuing sequential secrets.
#[derive(Default)]
pub struct MockPayments {
    intent_calls: AtomicUsize,
    checkout_calls: AtomicUsize,
    customers: Mutex<HashMap<String, String>>,
    invoices: Mutex<HashMap<String, InvoiceLinks>>,
    method_types: Mutex<HashMap<String, String>>,
    failing: AtomicBool,
}

impl MockPayments {
    pub fn new() -> Self {
        Self::default()
    }

    /// A provider that rejects every intent and checkout creation.
    pub fn failing() -> Self {
        let mock = Self::default();
        mock.failing.store(true, Ordering::SeqCst);
        mock
    }

    pub fn with_payment_method(mut self, payment_method_id: &str, kind: &str) -> Self {
        self.method_types
            .get_mut()
            .insert(payment_method_id.to_string(), kind.to_string());
        self
    }

    pub async fn insert_invoice(&self, invoice: InvoiceLinks) {
        self.invoices
            .lock()
            .await
            .insert(invoice.invoice_id.clone(), invoice);
    }

    pub fn intent_calls(&self) -> usize {
        self.intent_calls.load(Ordering::SeqCst)
    }

    pub fn checkout_calls(&self) -> usize {
        self.checkout_calls.load(Ordering::SeqCst)
    }

    fn check_failing(&self) -> Result<(), ProviderError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(ProviderError::Rejected {
                provider: "stripe",
                message: "mock payment provider rejected the request".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl PaymentProvider for MockPayments {
    async fn create_customer(
        &self,
        email: &str,
        _name: Option<&str>,
    ) -> Result<String, ProviderError> {
        let mut customers = self.customers.lock().await;
        let next = customers.len() + 1;
        Ok(customers
            .entry(email.to_string())
            .or_insert_with(|| format!("cus_mock_{next}"))
            .clone())
    }

    async fn create_checkout_session(
        &self,
        request: &CheckoutRequest,
    ) -> Result<String, ProviderError> {
        self.check_failing()?;
        let n = self.checkout_calls.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format!(
            "https://checkout.mock/{}/cs_mock_{n}",
            request.record_id
        ))
    }

    async fn create_invoice_payment_intent(
        &self,
        request: &PaymentIntentRequest,
    ) -> Result<InvoicePaymentIntent, ProviderError> {
        self.check_failing()?;
        let n = self.intent_calls.fetch_add(1, Ordering::SeqCst) + 1;
        let invoice_id = format!("in_mock_{n}");
        self.insert_invoice(InvoiceLinks {
            invoice_id: invoice_id.clone(),
            hosted_invoice_url: Some(format!("https://invoice.mock/{invoice_id}")),
            invoice_pdf: Some(format!("https://invoice.mock/{invoice_id}/pdf")),
            status: Some("open".to_string()),
            amount_due: Some(request.amount),
        })
        .await;
        Ok(InvoicePaymentIntent {
            client_secret: format!("pi_mock_{n}_secret"),
            invoice_id,
        })
    }

    async fn retrieve_invoice(&self, invoice_id: &str) -> Result<InvoiceLinks, ProviderError> {
        self.invoices
            .lock()
            .await
            .get(invoice_id)
            .cloned()
            .ok_or_else(|| ProviderError::NotFound {
                provider: "stripe",
                message: format!("No such invoice: '{invoice_id}'"),
            })
    }

    async fn payment_method_type(
        &self,
        payment_method_id: &str,
    ) -> Result<Option<String>, ProviderError> {
        Ok(self
            .method_types
            .lock()
            .await
            .get(payment_method_id)
            .cloned())
    }
}

// ============================================================================
// Signing
// ============================================================================

/// Signing-provider mock with documents keyed by id.
#[derive(Default)]
pub struct MockSigning {
    documents: Mutex<HashMap<String, DocumentDetails>>,
    sessions: AtomicUsize,
    sent: AtomicUsize,
    sessions_fail: AtomicBool,
}

impl MockSigning {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a document with one Client-role recipient.
    pub fn with_document(mut self, document_id: &str, signer_email: &str, signed: bool) -> Self {
        self.documents.get_mut().insert(
            document_id.to_string(),
            DocumentDetails {
                id: document_id.to_string(),
                status: if signed {
                    "document.completed".to_string()
                } else {
                    "document.sent".to_string()
                },
                recipients: vec![Recipient {
                    email: Some(signer_email.to_string()),
                    first_name: Some("Jo".to_string()),
                    last_name: Some("Bloggs".to_string()),
                    role: Some(SIGNER_ROLE.to_string()),
                    has_completed: signed,
                    shared_link: Some(format!("https://sign.mock/{document_id}")),
                }],
                fields: Vec::new(),
            },
        );
        self
    }

    /// Replace a document's details.
    pub async fn insert(&self, details: DocumentDetails) {
        self.documents
            .lock()
            .await
            .insert(details.id.clone(), details);
    }

    /// Mark every recipient of the document as having signed.
    pub async fn sign(&self, document_id: &str) {
        if let Some(doc) = self.documents.lock().await.get_mut(document_id) {
            doc.status = "document.completed".to_string();
            for recipient in &mut doc.recipients {
                recipient.has_completed = true;
            }
        }
    }

    /// Make session creation fail.
    pub fn set_sessions_failing(&self, failing: bool) {
        self.sessions_fail.store(failing, Ordering::SeqCst);
    }

    pub fn session_count(&self) -> usize {
        self.sessions.load(Ordering::SeqCst)
    }

    pub fn sent_count(&self) -> usize {
        self.sent.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SigningProvider for MockSigning {
    async fn document_details(&self, document_id: &str) -> Result<DocumentDetails, ProviderError> {
        self.documents
            .lock()
            .await
            .get(document_id)
            .cloned()
            .ok_or_else(|| ProviderError::NotFound {
                provider: "pandadoc",
                message: format!("document {document_id} not found"),
            })
    }

    async fn send_document(&self, document_id: &str) -> Result<(), ProviderError> {
        self.sent.fetch_add(1, Ordering::SeqCst);
        if let Some(doc) = self.documents.lock().await.get_mut(document_id) {
            doc.status = "document.sent".to_string();
        }
        Ok(())
    }

    async fn create_session(
        &self,
        document_id: &str,
        _recipient_email: &str,
    ) -> Result<String, ProviderError> {
        if self.sessions_fail.load(Ordering::SeqCst) {
            return Err(ProviderError::Transport {
                provider: "pandadoc",
                message: "mock session failure".to_string(),
            });
        }
        let n = self.sessions.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format!("session-{document_id}-{n}"))
    }
}

// ============================================================================
// Alerts
// ============================================================================

/// Alert sink that keeps everything it is asked to send.
#[derive(Default)]
pub struct RecordingAlerts {
    messages: Mutex<Vec<String>>,
    alerts: Mutex<Vec<ErrorAlert>>,
    frontend: Mutex<Vec<FrontendErrorReport>>,
}

impl RecordingAlerts {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn messages(&self) -> Vec<String> {
        self.messages.lock().await.clone()
    }

    pub async fn alerts(&self) -> Vec<ErrorAlert> {
        self.alerts.lock().await.clone()
    }

    pub async fn frontend_reports(&self) -> Vec<FrontendErrorReport> {
        self.frontend.lock().await.clone()
    }
}

#[async_trait]
impl AlertSink for RecordingAlerts {
    async fn send_message(&self, text: &str) {
        self.messages.lock().await.push(text.to_string());
    }

    async fn send_error_alert(&self, alert: &ErrorAlert) {
        self.alerts.lock().await.push(alert.clone());
    }

    async fn send_frontend_alert(&self, report: &FrontendErrorReport) {
        self.frontend.lock().await.push(report.clone());
    }
}
