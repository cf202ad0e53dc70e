// Copyright (C) 2025 The Well Solutions
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Onboarding Core - Client Onboarding Reconciliation
//!
//! This crate keeps a client's onboarding steps (sign agreement, pay,
//! book intake meeting) consistent across the CRM, the signing provider,
//! the payment processor and a local record store.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       onboarding-server (axum)                           │
//! │            /api/onboarding/*   /api/webhook/*   /api/payments/ws          │
//! └─────────────────────────────────────────────────────────────────────────┘
//!           │                               │                      ▲
//!           ▼                               ▼                      │ push
//! ┌───────────────────────┐     ┌───────────────────────┐   ┌──────────────┐
//! │ Reconciliation Engine │     │   Webhook Ingestion   │──▶│   Payment    │
//! │  (OnboardingService)  │     │   (WebhookIngestor)   │   │   Notifier   │
//! └───────────────────────┘     └───────────────────────┘   └──────────────┘
//!      │            │                       │
//!      │            ▼                       ▼
//!      │   ┌─────────────────┐    ┌─────────────────────┐
//!      │   │ Step Derivation │───▶│    Record Store      │
//!      │   └─────────────────┘    │ (SQLite / Postgres)  │
//!      │                          └─────────────────────┘
//!      ▼
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Provider adapters: Zoho CRM · Stripe · PandaDoc · Slack                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Step State Machine
//!
//! ```text
//!   CRM flag "<X>_Required" = "Yes"
//!                │ derive
//!                ▼
//!        ┌──────────────┐  provider confirms / complete-step   ┌───────────┐
//!        │  INCOMPLETE  │─────────────────────────────────────▶│ COMPLETED │
//!        └──────────────┘                                      └───────────┘
//!                                                                   │
//!                                                      push "<X>_Completed"
//!                                                                   ▼
//!                                                                  CRM
//! ```
//!
//! Completed steps are never reset by derivation.
//!
//! # Configuration
//!
//! | Variable | Required | Default | Description |
//! |----------|----------|---------|-------------|
//! | `ONBOARDING_DATABASE_URL` | Yes | - | `sqlite:` or `postgres:` URL |
//! | `ZOHO_CLIENT_ID` / `ZOHO_CLIENT_SECRET` / `ZOHO_REFRESH_TOKEN` | Yes | - | CRM OAuth credentials |
//! | `STRIPE_SECRET_KEY` | Yes | - | Payment processor key |
//! | `PANDADOC_API_KEY` | Yes | - | Signing provider key |
//! | `STRIPE_WEBHOOK_SECRET` | No | - | Payment webhook secret |
//! | `CALENDLY_WEBHOOK_SIGNING_KEY` | No | - | Scheduling webhook secret |
//! | `SLACK_WEBHOOK_URL` | No | - | Alert destination |
//! | `ONBOARDING_AUTO_COMPLETE_SIGNED` | No | `true` | Complete signed agreements on load |
//!
//! See [`config`] for the full list.
//!
//! # Modules
//!
//! - [`adapters`]: provider traits, HTTP clients and test mocks
//! - [`config`]: configuration from environment variables
//! - [`error`]: error taxonomy with HTTP status mapping
//! - [`model`]: domain records
//! - [`notify`]: per-record payment push channel
//! - [`reconcile`]: the reconciliation engine
//! - [`steps`]: step derivation
//! - [`store`]: record store trait and sqlx backends
//! - [`webhook`]: webhook authentication and ingestion

pub mod adapters;
pub mod config;
pub mod error;
pub mod migrations;
pub mod model;
pub mod notify;
pub mod reconcile;
pub mod steps;
pub mod store;
pub mod webhook;

pub use config::Config;
pub use error::OnboardingError;
pub use notify::{PaymentEvent, PaymentNotifier};
pub use reconcile::{OnboardingService, ServiceOptions};
pub use store::{PostgresRecordStore, RecordStore, SqliteRecordStore};
pub use webhook::{WebhookAck, WebhookIngestor, WebhookSecrets};
