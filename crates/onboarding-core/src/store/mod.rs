// Copyright (C) 2025 The Well Solutions
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Record Store interfaces and backends.
//!
//! The store is a cache of CRM records plus the locally owned onboarding
//! state (client steps, payments, meeting bookings). Every write is an
//! idempotent upsert so concurrent requests for one client are tolerated.

pub mod postgres;
pub mod sqlite;

pub use self::postgres::PostgresRecordStore;
pub use self::sqlite::SqliteRecordStore;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::OnboardingError;
use crate::model::{
    ClientRecord, ClientStep, MeetingBooking, NewPayment, PaymentRecord, PaymentUpdate,
    StepDefinition, StepView,
};

/// Persistence operations used by the engines.
#[async_trait]
pub trait RecordStore: Send + Sync {
    // ------------------------------------------------------------------------
    // Client records
    // ------------------------------------------------------------------------

    /// Insert or merge a client record. Absent fields keep their cached value.
    async fn upsert_client(&self, client: &ClientRecord) -> Result<ClientRecord, OnboardingError>;

    async fn get_client(&self, zoho_record_id: &str)
    -> Result<Option<ClientRecord>, OnboardingError>;

    /// Set the cached `PandaDoc_Agreement_Completed` flag.
    async fn mark_agreement_completed(&self, zoho_record_id: &str) -> Result<(), OnboardingError>;

    /// Set the cached `Stripe_Payment_Completed` flag.
    async fn mark_payment_completed(&self, zoho_record_id: &str) -> Result<(), OnboardingError>;

    /// Set the cached `Intake_Meeting_Completed` flag.
    async fn mark_meeting_completed(&self, zoho_record_id: &str) -> Result<(), OnboardingError>;

    // ------------------------------------------------------------------------
    // Step catalogue and client steps
    // ------------------------------------------------------------------------

    /// All step definitions ordered by `step_order`.
    async fn list_step_definitions(&self) -> Result<Vec<StepDefinition>, OnboardingError>;

    async fn get_step_definition(&self, id: i64)
    -> Result<Option<StepDefinition>, OnboardingError>;

    async fn find_step_definition_by_name(
        &self,
        name: &str,
    ) -> Result<Option<StepDefinition>, OnboardingError>;

    async fn find_client_step(
        &self,
        zoho_record_id: &str,
        step_id: i64,
    ) -> Result<Option<ClientStep>, OnboardingError>;

    /// Create a client step unless one exists. Never resets completion.
    async fn create_client_step(
        &self,
        zoho_record_id: &str,
        step_id: i64,
    ) -> Result<(), OnboardingError>;

    /// The client's steps joined with their definitions, ordered by `step_order`.
    async fn list_client_steps(&self, zoho_record_id: &str)
    -> Result<Vec<StepView>, OnboardingError>;

    /// Mark a client step completed. Returns `None` when no such step exists.
    async fn complete_client_step(
        &self,
        zoho_record_id: &str,
        step_id: i64,
    ) -> Result<Option<ClientStep>, OnboardingError>;

    // ------------------------------------------------------------------------
    // Payments
    // ------------------------------------------------------------------------

    async fn get_payment(&self, zoho_record_id: &str)
    -> Result<Option<PaymentRecord>, OnboardingError>;

    async fn find_payment_by_client_secret(
        &self,
        client_secret: &str,
    ) -> Result<Option<PaymentRecord>, OnboardingError>;

    /// Store a new payment attempt, replacing any previous one for the client.
    async fn save_payment(&self, payment: &NewPayment) -> Result<PaymentRecord, OnboardingError>;

    /// Apply a webhook update to the payment with `client_secret`.
    /// Returns `None` when the secret is unknown.
    async fn update_payment_by_secret(
        &self,
        client_secret: &str,
        update: &PaymentUpdate,
    ) -> Result<Option<PaymentRecord>, OnboardingError>;

    /// Cache a hosted invoice URL fetched on demand.
    async fn set_hosted_invoice_url(
        &self,
        zoho_record_id: &str,
        url: &str,
    ) -> Result<(), OnboardingError>;

    // ------------------------------------------------------------------------
    // Meeting bookings
    // ------------------------------------------------------------------------

    /// Insert or overwrite the booking payload for a client.
    async fn upsert_meeting_booking(
        &self,
        zoho_record_id: &str,
        payload: &Value,
    ) -> Result<(), OnboardingError>;

    async fn get_meeting_booking(
        &self,
        zoho_record_id: &str,
    ) -> Result<Option<MeetingBooking>, OnboardingError>;

    // ------------------------------------------------------------------------
    // Health
    // ------------------------------------------------------------------------

    async fn health_check(&self) -> Result<bool, OnboardingError>;
}
