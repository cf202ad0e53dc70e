// Copyright (C) 2025 The Well Solutions
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Shared test context: in-memory SQLite store and mock providers.

#![allow(dead_code)]

use std::sync::Arc;

use onboarding_core::adapters::mock::{MockCrm, MockPayments, MockSigning, RecordingAlerts};
use onboarding_core::model::{NewPayment, PaymentStatus, PaymentUpdate, StepKind};
use onboarding_core::store::RecordStore;
use onboarding_core::webhook::signature;
use onboarding_core::{
    OnboardingService, PaymentNotifier, ServiceOptions, SqliteRecordStore, WebhookIngestor,
    WebhookSecrets,
};

pub const CALENDLY_SECRET: &str = "calendly-signing-key";
pub const STRIPE_SECRET: &str = "whsec_test";

pub struct TestContext {
    pub store: Arc<SqliteRecordStore>,
    pub crm: Arc<MockCrm>,
    pub payments: Arc<MockPayments>,
    pub signing: Arc<MockSigning>,
    pub alerts: Arc<RecordingAlerts>,
    pub notifier: Arc<PaymentNotifier>,
    pub service: OnboardingService,
    pub ingestor: WebhookIngestor,
}

impl TestContext {
    pub async fn new(crm: MockCrm) -> Self {
        Self::with_providers(crm, MockPayments::new(), MockSigning::new()).await
    }

    pub async fn with_providers(crm: MockCrm, payments: MockPayments, signing: MockSigning) -> Self {
        let store = Arc::new(
            SqliteRecordStore::connect("sqlite::memory:")
                .await
                .expect("Failed to create in-memory store"),
        );
        let crm = Arc::new(crm);
        let payments = Arc::new(payments);
        let signing = Arc::new(signing);
        let alerts = Arc::new(RecordingAlerts::new());
        let notifier = Arc::new(PaymentNotifier::new());

        let service = OnboardingService::new(
            store.clone(),
            crm.clone(),
            payments.clone(),
            signing.clone(),
            ServiceOptions::default(),
        );
        let ingestor = WebhookIngestor::new(
            store.clone(),
            payments.clone(),
            notifier.clone(),
            alerts.clone(),
            WebhookSecrets {
                calendly: Some(CALENDLY_SECRET.to_string()),
                stripe: Some(STRIPE_SECRET.to_string()),
            },
        );

        Self {
            store,
            crm,
            payments,
            signing,
            alerts,
            notifier,
            service,
            ingestor,
        }
    }

    /// Store a payment record directly, optionally with a status.
    pub async fn seed_payment(&self, record_id: &str, secret: &str, status: Option<PaymentStatus>) {
        self.store
            .save_payment(&NewPayment {
                zoho_record_id: record_id.to_string(),
                client_secret: secret.to_string(),
                customer_id: Some("cus_1".to_string()),
                invoice_id: None,
                amount: Some(5000),
            })
            .await
            .expect("Failed to seed payment");

        if let Some(status) = status {
            self.store
                .update_payment_by_secret(
                    secret,
                    &PaymentUpdate {
                        status,
                        payment_id: Some(format!("pi_{record_id}")),
                        payment_source: Some("Credit Card/Debit Card".to_string()),
                        amount: Some(5000),
                        hosted_invoice_url: None,
                        error_message: None,
                    },
                )
                .await
                .expect("Failed to seed payment status");
        }
    }

    pub async fn step_id(&self, kind: StepKind) -> i64 {
        self.store
            .find_step_definition_by_name(kind.definition_name())
            .await
            .expect("Failed to read step definitions")
            .expect("Step definition missing")
            .id
    }
}

pub fn stripe_header(body: &[u8]) -> String {
    signature::sign(STRIPE_SECRET, chrono::Utc::now().timestamp(), body)
}

pub fn calendly_header(body: &[u8]) -> String {
    signature::sign(CALENDLY_SECRET, chrono::Utc::now().timestamp(), body)
}
