// Copyright (C) 2025 The Well Solutions
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Reconciliation engine.
//!
//! Brings the three systems of record for a client into agreement:
//!
//! ```text
//!   CRM record ──refresh──▶ Record Store ──derive──▶ client steps
//!        ▲                        │
//!        └────── push flags ◀─────┴── provider status (signing, payments)
//! ```
//!
//! Only this engine writes completion flags back to the CRM. Every push is
//! gated on local state so a converged client causes no further CRM writes.

use std::sync::Arc;

use serde_json::{Map, Value, json};
use tracing::{info, instrument, warn};

use crate::adapters::{
    CheckoutRequest, CrmClient, PaymentIntentRequest, PaymentProvider, SigningProvider,
};
use crate::error::OnboardingError;
use crate::model::{
    ClientRecord, ClientStep, CrmRecord, InvoiceLinks, NewPayment, PaymentStatus,
    PaymentStatusView, RecordWithSteps, StepKind, StepListing, YES, fields,
};
use crate::steps;
use crate::store::RecordStore;

/// Zoho Creator date format, e.g. `17-Oct-2026`.
const CRM_DATE_FORMAT: &str = "%d-%b-%Y";

/// Behaviour switches for the engine.
#[derive(Debug, Clone)]
pub struct ServiceOptions {
    /// Complete the agreement step on load when the document is already signed.
    pub auto_complete_signed: bool,
}

impl Default for ServiceOptions {
    fn default() -> Self {
        Self {
            auto_complete_signed: true,
        }
    }
}

/// Onboarding operations over the record store and provider adapters.
#[derive(Clone)]
pub struct OnboardingService {
    store: Arc<dyn RecordStore>,
    crm: Arc<dyn CrmClient>,
    payments: Arc<dyn PaymentProvider>,
    signing: Arc<dyn SigningProvider>,
    options: ServiceOptions,
}

impl OnboardingService {
    pub fn new(
        store: Arc<dyn RecordStore>,
        crm: Arc<dyn CrmClient>,
        payments: Arc<dyn PaymentProvider>,
        signing: Arc<dyn SigningProvider>,
        options: ServiceOptions,
    ) -> Self {
        Self {
            store,
            crm,
            payments,
            signing,
            options,
        }
    }

    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    // ========================================================================
    // Refresh
    // ========================================================================

    /// Fetch the CRM record, upsert the cache and derive required steps.
    #[instrument(skip(self))]
    pub async fn refresh_and_derive(&self, record_id: &str) -> Result<ClientRecord, OnboardingError> {
        require_id(record_id)?;

        let crm_record = self.crm.get_record_by_id(record_id).await?;
        let client = self
            .store
            .upsert_client(&ClientRecord::from_crm(record_id, &crm_record))
            .await?;
        let required = steps::derive_required_steps(self.store.as_ref(), &client).await?;

        info!(
            zoho_record_id = %client.zoho_record_id,
            required = ?required,
            "Client record refreshed"
        );
        Ok(client)
    }

    /// Refresh the record, reconcile provider state and return the steps.
    #[instrument(skip(self))]
    pub async fn get_record_with_steps(
        &self,
        record_id: &str,
    ) -> Result<RecordWithSteps, OnboardingError> {
        let client = self.refresh_and_derive(record_id).await?;
        let record_id = client.zoho_record_id.clone();

        let signing_session_id = match (
            client.requires(StepKind::Agreement),
            client.pandadoc_id.as_deref(),
        ) {
            (true, Some(document_id)) => {
                match self.signing_session(document_id, &client).await {
                    Ok(session) => session,
                    Err(e) => {
                        warn!(document_id, error = %e, "Signing session unavailable");
                        None
                    }
                }
            }
            _ => None,
        };

        if self.options.auto_complete_signed {
            self.sync_agreement(&client).await?;
        }
        self.sync_payment(&client).await?;

        let record = self.store.get_client(&record_id).await?.unwrap_or(client);
        let steps = self.store.list_client_steps(&record_id).await?;

        Ok(RecordWithSteps {
            record,
            steps,
            signing_session_id,
        })
    }

    /// Create an embedded signing session for the document's first recipient.
    async fn signing_session(
        &self,
        document_id: &str,
        client: &ClientRecord,
    ) -> Result<Option<String>, OnboardingError> {
        let details = self.signing.document_details(document_id).await?;
        if details.is_draft() {
            self.signing.send_document(document_id).await?;
        }

        let email = details
            .recipients
            .first()
            .and_then(|r| r.email.clone())
            .or_else(|| client.contact_email.clone());
        let Some(email) = email else {
            warn!(document_id, "Signing document has no recipient email");
            return Ok(None);
        };

        let session = self.signing.create_session(document_id, &email).await?;
        Ok(Some(session))
    }

    // ========================================================================
    // Agreement
    // ========================================================================

    /// Push signed-agreement info if the agreement step is still open.
    async fn sync_agreement(&self, client: &ClientRecord) -> Result<bool, OnboardingError> {
        let Some(step) = self.client_step(client, StepKind::Agreement).await? else {
            return Ok(false);
        };
        if step.is_completed {
            return Ok(false);
        }

        let pushed = self.push_signed_document(client).await?;
        if pushed {
            self.store
                .complete_client_step(&client.zoho_record_id, step.step_id)
                .await?;
        }
        Ok(pushed)
    }

    /// Write the signed document's link and signer to the CRM.
    /// Returns `false` when there is no document or it is unsigned.
    async fn push_signed_document(&self, client: &ClientRecord) -> Result<bool, OnboardingError> {
        let Some(document_id) = client.pandadoc_id.as_deref() else {
            warn!(zoho_record_id = %client.zoho_record_id, "No signing document for record");
            return Ok(false);
        };
        let Some(signed) = self.signing.is_document_signed(document_id).await? else {
            return Ok(false);
        };

        let mut update = Map::new();
        if let Some(link) = signed
            .shared_link
            .clone()
            .or_else(|| client.custom_pandadoc_url.clone())
        {
            update.insert(
                fields::SENDER_PANDADOC_URL.to_string(),
                json!({ "value": link, "url": link }),
            );
        }
        if let Some(name) = signed.signer_name {
            update.insert(fields::SIGNER_NAME.to_string(), Value::String(name));
        }
        if let Some(title) = signed.signer_title {
            update.insert(fields::SIGNER_TITLE.to_string(), Value::String(title));
        }
        update.insert(
            fields::PANDADOC_AGREEMENT_COMPLETED.to_string(),
            Value::String(YES.to_string()),
        );

        self.crm.update_record(&client.zoho_record_id, update).await?;
        self.store
            .mark_agreement_completed(&client.zoho_record_id)
            .await?;

        info!(zoho_record_id = %client.zoho_record_id, document_id, "Signed agreement pushed to CRM");
        Ok(true)
    }

    // ========================================================================
    // Payment
    // ========================================================================

    /// Push payment info if the CRM and the local step both lack completion.
    async fn sync_payment(&self, client: &ClientRecord) -> Result<bool, OnboardingError> {
        if !client.requires(StepKind::Payment) || client.completed_in_crm(StepKind::Payment) {
            return Ok(false);
        }
        let step = self.client_step(client, StepKind::Payment).await?;
        if step.as_ref().is_some_and(|s| s.is_completed) {
            return Ok(false);
        }

        let pushed = self.push_payment(client).await?;
        if let (true, Some(step)) = (pushed, step) {
            self.store
                .complete_client_step(&client.zoho_record_id, step.step_id)
                .await?;
        }
        Ok(pushed)
    }

    /// Write a succeeded payment to the CRM.
    /// Returns `false` when there is no succeeded payment.
    async fn push_payment(&self, client: &ClientRecord) -> Result<bool, OnboardingError> {
        let Some(payment) = self.store.get_payment(&client.zoho_record_id).await? else {
            return Ok(false);
        };
        if payment.status() != Some(PaymentStatus::Succeeded) {
            return Ok(false);
        }

        let mut update = Map::new();
        if let Some(payment_id) = &payment.payment_id {
            update.insert(fields::STRIPE_PAYMENT_ID.to_string(), json!(payment_id));
        }
        if let Some(source) = &payment.payment_source {
            update.insert(fields::PAYMENT_SOURCE.to_string(), json!(source));
        }
        update.insert(
            fields::PAYMENT_DATE.to_string(),
            json!(payment.updated_at.format(CRM_DATE_FORMAT).to_string()),
        );
        update.insert(fields::PAYMENT_STATUS.to_string(), json!("Succeeded"));
        update.insert(fields::STRIPE_PAYMENT_COMPLETED.to_string(), json!(YES));

        self.crm.update_record(&client.zoho_record_id, update).await?;
        self.store
            .mark_payment_completed(&client.zoho_record_id)
            .await?;

        info!(
            zoho_record_id = %client.zoho_record_id,
            payment_id = ?payment.payment_id,
            "Payment pushed to CRM"
        );
        Ok(true)
    }

    async fn client_step(
        &self,
        client: &ClientRecord,
        kind: StepKind,
    ) -> Result<Option<ClientStep>, OnboardingError> {
        let Some(definition) = self
            .store
            .find_step_definition_by_name(kind.definition_name())
            .await?
        else {
            return Ok(None);
        };
        self.store
            .find_client_step(&client.zoho_record_id, definition.id)
            .await
    }

    // ========================================================================
    // Steps
    // ========================================================================

    pub async fn list_steps(&self, record_id: Option<&str>) -> Result<StepListing, OnboardingError> {
        steps::list_steps(self.store.as_ref(), record_id).await
    }

    /// Mark a required step completed and run its side effect.
    #[instrument(skip(self))]
    pub async fn complete_step(
        &self,
        record_id: &str,
        step_id: i64,
    ) -> Result<ClientStep, OnboardingError> {
        require_id(record_id)?;

        let definition = self
            .store
            .get_step_definition(step_id)
            .await?
            .ok_or_else(|| {
                OnboardingError::NotFound(format!("Step with ID {step_id} does not exist"))
            })?;

        let updated = self
            .store
            .complete_client_step(record_id, step_id)
            .await?
            .ok_or_else(|| {
                OnboardingError::NotFound(format!(
                    "Step with ID {step_id} not found for client record {record_id}"
                ))
            })?;

        match definition.kind() {
            Some(StepKind::Agreement) => {
                let client = self.cached_client(record_id).await?;
                if !client.completed_in_crm(StepKind::Agreement) {
                    self.push_signed_document(&client).await?;
                }
            }
            Some(StepKind::Payment) => {
                let client = self.cached_client(record_id).await?;
                if !client.completed_in_crm(StepKind::Payment) {
                    self.push_payment(&client).await?;
                }
            }
            Some(StepKind::Meeting) => {
                let mut update = Map::new();
                update.insert(fields::INTAKE_MEETING_COMPLETED.to_string(), json!(YES));
                self.crm.update_record(record_id, update).await?;
                self.store.mark_meeting_completed(record_id).await?;
            }
            None => {
                warn!(step = %definition.name, "Completed step has no known kind");
            }
        }

        info!(zoho_record_id = record_id, step_id, step = %definition.name, "Step completed");
        Ok(updated)
    }

    async fn cached_client(&self, record_id: &str) -> Result<ClientRecord, OnboardingError> {
        match self.store.get_client(record_id).await? {
            Some(client) => Ok(client),
            None => self.refresh_and_derive(record_id).await,
        }
    }

    // ========================================================================
    // Payments
    // ========================================================================

    /// Return the live payment secret for a client, creating one if needed.
    #[instrument(skip(self))]
    pub async fn create_payment_intent(&self, record_id: &str) -> Result<String, OnboardingError> {
        require_id(record_id)?;
        let client = self.require_client(record_id).await?;
        let customer_id = client.stripe_customer_id.clone().ok_or_else(|| {
            OnboardingError::InvalidState(format!(
                "Client record {record_id} has no Stripe customer"
            ))
        })?;
        let amount = positive_amount(&client)?;

        if let Some(existing) = self.store.get_payment(record_id).await?
            && existing.status() != Some(PaymentStatus::Failed)
        {
            info!(zoho_record_id = record_id, "Reusing live payment intent");
            return Ok(existing.client_secret);
        }

        let intent = self
            .payments
            .create_invoice_payment_intent(&PaymentIntentRequest {
                record_id: record_id.to_string(),
                customer_id: customer_id.clone(),
                amount,
            })
            .await?;

        self.store
            .save_payment(&NewPayment {
                zoho_record_id: record_id.to_string(),
                client_secret: intent.client_secret.clone(),
                customer_id: Some(customer_id),
                invoice_id: Some(intent.invoice_id.clone()),
                amount: Some(amount),
            })
            .await?;

        info!(zoho_record_id = record_id, invoice_id = %intent.invoice_id, "Payment intent created");
        Ok(intent.client_secret)
    }

    /// Create a hosted checkout session. Returns its URL.
    #[instrument(skip(self))]
    pub async fn create_checkout_session(&self, record_id: &str) -> Result<String, OnboardingError> {
        require_id(record_id)?;
        let client = self.require_client(record_id).await?;
        let amount = positive_amount(&client)?;

        let customer_id = match (&client.stripe_customer_id, &client.contact_email) {
            (Some(id), _) => id.clone(),
            (None, Some(email)) => {
                self.payments
                    .create_customer(email, client.contact_name.as_deref())
                    .await?
            }
            (None, None) => {
                return Err(OnboardingError::InvalidState(format!(
                    "Client record {record_id} has no Stripe customer or contact email"
                )));
            }
        };

        let url = self
            .payments
            .create_checkout_session(&CheckoutRequest {
                record_id: record_id.to_string(),
                customer_id,
                amount,
            })
            .await?;

        info!(zoho_record_id = record_id, "Checkout session created");
        Ok(url)
    }

    /// The hosted invoice URL, fetched and cached when not yet known.
    #[instrument(skip(self))]
    pub async fn download_invoice(&self, record_id: &str) -> Result<String, OnboardingError> {
        require_id(record_id)?;
        let payment = self.require_payment(record_id).await?;
        if let Some(url) = payment.hosted_invoice_url {
            return Ok(url);
        }

        let invoice_id = payment.invoice_id.ok_or_else(|| no_invoice(record_id))?;
        let invoice = self.payments.retrieve_invoice(&invoice_id).await?;
        let url = invoice.hosted_invoice_url.ok_or_else(|| no_invoice(record_id))?;
        self.store.set_hosted_invoice_url(record_id, &url).await?;
        Ok(url)
    }

    /// Live invoice links and status from the payment provider.
    #[instrument(skip(self))]
    pub async fn download_due_invoice(&self, record_id: &str) -> Result<InvoiceLinks, OnboardingError> {
        require_id(record_id)?;
        let payment = self.require_payment(record_id).await?;
        let invoice_id = payment.invoice_id.ok_or_else(|| no_invoice(record_id))?;
        Ok(self.payments.retrieve_invoice(&invoice_id).await?)
    }

    pub async fn check_payment_status(
        &self,
        record_id: &str,
    ) -> Result<PaymentStatusView, OnboardingError> {
        require_id(record_id)?;
        let payment = self.require_payment(record_id).await?;
        Ok(PaymentStatusView::from(&payment))
    }

    // ========================================================================
    // CRM
    // ========================================================================

    pub async fn list_crm_records(&self) -> Result<Vec<CrmRecord>, OnboardingError> {
        Ok(self.crm.get_records().await?)
    }

    async fn require_client(&self, record_id: &str) -> Result<ClientRecord, OnboardingError> {
        self.store.get_client(record_id).await?.ok_or_else(|| {
            OnboardingError::NotFound(format!("Client record {record_id} not found"))
        })
    }

    async fn require_payment(
        &self,
        record_id: &str,
    ) -> Result<crate::model::PaymentRecord, OnboardingError> {
        self.store.get_payment(record_id).await?.ok_or_else(|| {
            OnboardingError::NotFound(format!("No payment found for client record {record_id}"))
        })
    }
}

fn require_id(record_id: &str) -> Result<(), OnboardingError> {
    if record_id.trim().is_empty() {
        return Err(OnboardingError::validation("recordId", "must not be empty"));
    }
    Ok(())
}

fn positive_amount(client: &ClientRecord) -> Result<i64, OnboardingError> {
    client.amount.filter(|a| *a > 0).ok_or_else(|| {
        OnboardingError::InvalidState(format!(
            "Client record {} has no payable amount; Amount must be a positive whole number of cents",
            client.zoho_record_id
        ))
    })
}

fn no_invoice(record_id: &str) -> OnboardingError {
    OnboardingError::NotFound(format!("No invoice found for client record {record_id}"))
}
