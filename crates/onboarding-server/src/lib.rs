// Copyright (C) 2025 The Well Solutions
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Onboarding Server - HTTP surface for the onboarding portal
//!
//! Thin axum layer over [`onboarding_core`]. Handlers validate input, call
//! the reconciliation engine or the webhook ingestor, and wrap the result in
//! the shared `{success, data, message, timestamp, statusCode}` envelope.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | GET | `/api/onboarding/get-record?recordId=` | Refresh, reconcile, return record with steps |
//! | GET | `/api/onboarding/record?recordId=` | Refresh the cached record and derive steps |
//! | GET | `/api/onboarding/records` | All CRM onboarding records |
//! | GET | `/api/onboarding/steps[?recordId=]` | Step catalogue or a client's steps |
//! | POST | `/api/onboarding/complete-step` | Complete a required step |
//! | POST | `/api/onboarding/create-payment-intent` | Live payment secret for a client |
//! | POST | `/api/onboarding/create-checkout-session` | Hosted checkout URL |
//! | GET | `/api/onboarding/download-invoice?recordId=` | Hosted invoice URL |
//! | GET | `/api/onboarding/download-due-invoice?recordId=` | Live invoice links |
//! | GET | `/api/onboarding/check-payment-status?recordId=` | Payment status poll |
//! | POST | `/api/webhook/calendly` | Scheduling webhook |
//! | POST | `/api/webhook/stripe` | Payment webhook |
//! | POST | `/api/alerts/frontend-error` | Browser error report |
//! | GET | `/api/payments/ws?recordId=` | Payment push channel (WebSocket) |
//! | GET | `/health` | Liveness and database check |

pub mod config;
pub mod envelope;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::{HeaderValue, Method, header};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use chrono::Utc;
use onboarding_core::adapters::{
    AlertSink, ErrorAlert, PandaDocClient, SlackAlerts, StripeClient, ZohoCrm,
};
use onboarding_core::store::RecordStore;
use onboarding_core::{
    Config, OnboardingError, OnboardingService, PaymentNotifier, PostgresRecordStore,
    ServiceOptions, SqliteRecordStore, WebhookIngestor, WebhookSecrets,
};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::ServerConfig;
use crate::envelope::ApiEnvelope;
use crate::error::{ErrorDetails, client_message, should_alert};

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub service: OnboardingService,
    pub ingestor: Arc<WebhookIngestor>,
    pub notifier: Arc<PaymentNotifier>,
    pub alerts: Arc<dyn AlertSink>,
    /// Sanitize error messages before they leave the server.
    pub production: bool,
}

impl AppState {
    /// Connect the record store and build the production adapters.
    pub async fn from_config(config: &Config, production: bool) -> Result<Self, OnboardingError> {
        let store: Arc<dyn RecordStore> = if config.database_url.starts_with("sqlite:") {
            Arc::new(SqliteRecordStore::connect(&config.database_url).await?)
        } else {
            Arc::new(PostgresRecordStore::connect(&config.database_url).await?)
        };
        info!("Record store connected and migrated");

        let http = reqwest::Client::new();
        let payments = Arc::new(StripeClient::new(http.clone(), config.stripe.clone()));
        let alerts: Arc<dyn AlertSink> =
            Arc::new(SlackAlerts::new(http.clone(), config.slack_webhook_url.clone()));
        let notifier = Arc::new(PaymentNotifier::new());

        let service = OnboardingService::new(
            store.clone(),
            Arc::new(ZohoCrm::new(http.clone(), config.zoho.clone())),
            payments.clone(),
            Arc::new(PandaDocClient::new(http, config.pandadoc.clone())),
            ServiceOptions {
                auto_complete_signed: config.auto_complete_signed,
            },
        );
        let ingestor = WebhookIngestor::new(
            store,
            payments,
            notifier.clone(),
            alerts.clone(),
            WebhookSecrets {
                calendly: config.calendly_signing_key.clone(),
                stripe: config.stripe.webhook_secret.clone(),
            },
        );

        Ok(Self {
            service,
            ingestor: Arc::new(ingestor),
            notifier,
            alerts,
            production,
        })
    }
}

/// Build the application router.
pub fn router(state: AppState, config: &ServerConfig) -> Router {
    let api = Router::new()
        .nest("/onboarding", routes::onboarding::router())
        .nest("/webhook", routes::webhook::router())
        .nest("/alerts", routes::alerts::router())
        .nest("/payments", routes::payments_ws::router());

    Router::new()
        .nest("/api", api)
        .route("/health", get(routes::health))
        .layer(middleware::from_fn_with_state(state.clone(), error_policy))
        .layer(cors_layer(&config.cors_allowed_origins))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| HeaderValue::from_str(origin).ok())
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any)
        .expose_headers([header::CONTENT_TYPE])
}

/// Alerts on failed requests and sanitizes their messages in production.
async fn error_policy(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let method = request.method().to_string();
    let path = request.uri().path().to_string();
    let record_id = request.uri().query().and_then(record_id_param);

    let mut response = next.run(request).await;
    let Some(details) = response.extensions_mut().remove::<ErrorDetails>() else {
        return response;
    };

    if should_alert(details.status, &details.message) {
        let alert = ErrorAlert {
            message: details.message.clone(),
            status_code: details.status.as_u16(),
            method,
            endpoint: path,
            timestamp: Utc::now(),
            record_id,
            stack: Some(format!("code: {}", details.code)),
        };
        let alerts = state.alerts.clone();
        tokio::spawn(async move {
            alerts.send_error_alert(&alert).await;
        });
    }

    if state.production {
        let message = client_message(details.status, &details.message, true);
        return ApiEnvelope::error(details.status, message).into_response();
    }
    response
}

fn record_id_param(query: &str) -> Option<String> {
    url::form_urlencoded::parse(query.as_bytes())
        .find(|(key, _)| key == "recordId")
        .map(|(_, value)| value.into_owned())
        .filter(|id| !id.is_empty())
}
