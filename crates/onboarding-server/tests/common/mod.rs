// Copyright (C) 2025 The Well Solutions
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Router-level test harness over the in-memory store and mock providers.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use onboarding_core::adapters::mock::{MockCrm, MockPayments, MockSigning, RecordingAlerts};
use onboarding_core::webhook::signature;
use onboarding_core::{
    OnboardingService, PaymentNotifier, ServiceOptions, SqliteRecordStore, WebhookIngestor,
    WebhookSecrets,
};
use onboarding_server::AppState;
use onboarding_server::config::ServerConfig;
use serde_json::Value;
use tower::ServiceExt;

pub const CALENDLY_SECRET: &str = "calendly-signing-key";
pub const STRIPE_SECRET: &str = "whsec_test";

pub struct TestApp {
    pub router: Router,
    pub store: Arc<SqliteRecordStore>,
    pub crm: Arc<MockCrm>,
    pub alerts: Arc<RecordingAlerts>,
    pub notifier: Arc<PaymentNotifier>,
}

impl TestApp {
    pub async fn new(crm: MockCrm) -> Self {
        Self::build(crm, false).await
    }

    pub async fn production(crm: MockCrm) -> Self {
        Self::build(crm, true).await
    }

    async fn build(crm: MockCrm, production: bool) -> Self {
        let store = Arc::new(
            SqliteRecordStore::connect("sqlite::memory:")
                .await
                .expect("Failed to create in-memory store"),
        );
        let crm = Arc::new(crm);
        let payments = Arc::new(MockPayments::new());
        let alerts = Arc::new(RecordingAlerts::new());
        let notifier = Arc::new(PaymentNotifier::new());

        let service = OnboardingService::new(
            store.clone(),
            crm.clone(),
            payments.clone(),
            Arc::new(MockSigning::new()),
            ServiceOptions::default(),
        );
        let ingestor = WebhookIngestor::new(
            store.clone(),
            payments,
            notifier.clone(),
            alerts.clone(),
            WebhookSecrets {
                calendly: Some(CALENDLY_SECRET.to_string()),
                stripe: Some(STRIPE_SECRET.to_string()),
            },
        );

        let state = AppState {
            service,
            ingestor: Arc::new(ingestor),
            notifier: notifier.clone(),
            alerts: alerts.clone(),
            production,
        };
        let config = ServerConfig {
            production,
            ..ServerConfig::default()
        };

        Self {
            router: onboarding_server::router(state, &config),
            store,
            crm,
            alerts,
            notifier,
        }
    }

    pub async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("Router failed");
        let status = response.status();
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("Failed to read body")
            .to_bytes();
        let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, json)
    }

    pub async fn get(&self, uri: &str) -> (StatusCode, Value) {
        self.send(Request::get(uri).body(Body::empty()).unwrap()).await
    }

    pub async fn post_json(&self, uri: &str, body: Value) -> (StatusCode, Value) {
        self.send(
            Request::post(uri)
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
    }

    /// Wait for alerts sent from spawned tasks.
    pub async fn wait_for_alerts(&self, count: usize) -> usize {
        for _ in 0..50 {
            let sent = self.alerts.alerts().await.len();
            if sent >= count {
                return sent;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        self.alerts.alerts().await.len()
    }
}

pub fn signed_header(secret: &str, body: &[u8]) -> String {
    signature::sign(secret, chrono::Utc::now().timestamp(), body)
}
