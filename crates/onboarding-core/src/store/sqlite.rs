// Copyright (C) 2025 The Well Solutions
// SPDX-License-Identifier: AGPL-3.0-or-later
//! SQLite-backed record store.

use std::path::Path;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use sqlx::SqlitePool;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::types::Json;

use crate::error::OnboardingError;
use crate::migrations;
use crate::model::{
    ClientRecord, ClientStep, MeetingBooking, NewPayment, PaymentRecord, PaymentUpdate,
    StepDefinition, StepView,
};

use super::RecordStore;

/// SQLite-backed record store.
#[derive(Clone)]
pub struct SqliteRecordStore {
    pool: SqlitePool,
}

impl SqliteRecordStore {
    /// Create a new SQLite store from an existing, migrated pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create and initialize a SQLite store from a file path.
    ///
    /// Creates parent directories and the database file when missing, then
    /// runs all migrations.
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self, OnboardingError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| OnboardingError::Database {
                operation: "create_dir".to_string(),
                details: format!("Failed to create directory {:?}: {}", parent, e),
            })?;
        }

        let url = format!("sqlite:{}?mode=rwc", path.to_string_lossy());
        Self::connect(&url).await
    }

    /// Connect to a SQLite URL and run migrations.
    pub async fn connect(url: &str) -> Result<Self, OnboardingError> {
        // An in-memory database only lives as long as its single connection.
        let max_connections = if url.contains(":memory:") { 1 } else { 5 };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await
            .map_err(|e| OnboardingError::Database {
                operation: "connect".to_string(),
                details: format!("Failed to connect to SQLite at {}: {}", url, e),
            })?;

        migrations::run_sqlite(&pool).await?;

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl RecordStore for SqliteRecordStore {
    async fn upsert_client(&self, client: &ClientRecord) -> Result<ClientRecord, OnboardingError> {
        let now = Utc::now();
        sqlx::query(
            r#"
            INSERT INTO clients (
                zoho_record_id, deal_id, deal_name, contact_id, contact_name, contact_email,
                company_id, company_name, pandadoc_id, agreement_id, agreement_name,
                agreement_required, stripe_required, intake_meeting_required,
                stripe_customer_id, amount, payment_link, custom_pandadoc_url,
                pandadoc_agreement_completed, stripe_payment_completed, intake_meeting_completed,
                created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (zoho_record_id) DO UPDATE SET
                deal_id = excluded.deal_id,
                deal_name = excluded.deal_name,
                contact_id = excluded.contact_id,
                contact_name = excluded.contact_name,
                contact_email = excluded.contact_email,
                company_id = excluded.company_id,
                company_name = excluded.company_name,
                pandadoc_id = excluded.pandadoc_id,
                agreement_id = excluded.agreement_id,
                agreement_name = excluded.agreement_name,
                agreement_required = excluded.agreement_required,
                stripe_required = excluded.stripe_required,
                intake_meeting_required = excluded.intake_meeting_required,
                stripe_customer_id = excluded.stripe_customer_id,
                amount = excluded.amount,
                payment_link = excluded.payment_link,
                custom_pandadoc_url = excluded.custom_pandadoc_url,
                -- Completion flags are also set locally after a push.
                pandadoc_agreement_completed = COALESCE(excluded.pandadoc_agreement_completed, clients.pandadoc_agreement_completed),
                stripe_payment_completed = COALESCE(excluded.stripe_payment_completed, clients.stripe_payment_completed),
                intake_meeting_completed = COALESCE(excluded.intake_meeting_completed, clients.intake_meeting_completed),
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&client.zoho_record_id)
        .bind(&client.deal_id)
        .bind(&client.deal_name)
        .bind(&client.contact_id)
        .bind(&client.contact_name)
        .bind(&client.contact_email)
        .bind(&client.company_id)
        .bind(&client.company_name)
        .bind(&client.pandadoc_id)
        .bind(&client.agreement_id)
        .bind(&client.agreement_name)
        .bind(&client.agreement_required)
        .bind(&client.stripe_required)
        .bind(&client.intake_meeting_required)
        .bind(&client.stripe_customer_id)
        .bind(client.amount)
        .bind(&client.payment_link)
        .bind(&client.custom_pandadoc_url)
        .bind(&client.pandadoc_agreement_completed)
        .bind(&client.stripe_payment_completed)
        .bind(&client.intake_meeting_completed)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        self.get_client(&client.zoho_record_id)
            .await?
            .ok_or_else(|| OnboardingError::Database {
                operation: "upsert_client".to_string(),
                details: format!("client {} missing after upsert", client.zoho_record_id),
            })
    }

    async fn get_client(
        &self,
        zoho_record_id: &str,
    ) -> Result<Option<ClientRecord>, OnboardingError> {
        let record = sqlx::query_as::<_, ClientRecord>(
            r#"
            SELECT * FROM clients WHERE zoho_record_id = ?
            "#,
        )
        .bind(zoho_record_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    async fn mark_agreement_completed(&self, zoho_record_id: &str) -> Result<(), OnboardingError> {
        sqlx::query(
            r#"
            UPDATE clients SET pandadoc_agreement_completed = 'Yes', updated_at = ?
            WHERE zoho_record_id = ?
            "#,
        )
        .bind(Utc::now())
        .bind(zoho_record_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn mark_payment_completed(&self, zoho_record_id: &str) -> Result<(), OnboardingError> {
        sqlx::query(
            r#"
            UPDATE clients SET stripe_payment_completed = 'Yes', updated_at = ?
            WHERE zoho_record_id = ?
            "#,
        )
        .bind(Utc::now())
        .bind(zoho_record_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn mark_meeting_completed(&self, zoho_record_id: &str) -> Result<(), OnboardingError> {
        sqlx::query(
            r#"
            UPDATE clients SET intake_meeting_completed = 'Yes', updated_at = ?
            WHERE zoho_record_id = ?
            "#,
        )
        .bind(Utc::now())
        .bind(zoho_record_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_step_definitions(&self) -> Result<Vec<StepDefinition>, OnboardingError> {
        let steps = sqlx::query_as::<_, StepDefinition>(
            r#"
            SELECT id, name, title, step_order FROM onboarding_steps ORDER BY step_order, id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(steps)
    }

    async fn get_step_definition(
        &self,
        id: i64,
    ) -> Result<Option<StepDefinition>, OnboardingError> {
        let step = sqlx::query_as::<_, StepDefinition>(
            r#"
            SELECT id, name, title, step_order FROM onboarding_steps WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(step)
    }

    async fn find_step_definition_by_name(
        &self,
        name: &str,
    ) -> Result<Option<StepDefinition>, OnboardingError> {
        let step = sqlx::query_as::<_, StepDefinition>(
            r#"
            SELECT id, name, title, step_order FROM onboarding_steps WHERE name = ?
            "#,
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        Ok(step)
    }

    async fn find_client_step(
        &self,
        zoho_record_id: &str,
        step_id: i64,
    ) -> Result<Option<ClientStep>, OnboardingError> {
        let step = sqlx::query_as::<_, ClientStep>(
            r#"
            SELECT id, zoho_record_id, step_id, is_completed, created_at, updated_at
            FROM client_steps
            WHERE zoho_record_id = ? AND step_id = ?
            "#,
        )
        .bind(zoho_record_id)
        .bind(step_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(step)
    }

    async fn create_client_step(
        &self,
        zoho_record_id: &str,
        step_id: i64,
    ) -> Result<(), OnboardingError> {
        let now = Utc::now();
        sqlx::query(
            r#"
            INSERT INTO client_steps (zoho_record_id, step_id, is_completed, created_at, updated_at)
            VALUES (?, ?, 0, ?, ?)
            ON CONFLICT (zoho_record_id, step_id) DO NOTHING
            "#,
        )
        .bind(zoho_record_id)
        .bind(step_id)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_client_steps(
        &self,
        zoho_record_id: &str,
    ) -> Result<Vec<StepView>, OnboardingError> {
        let mut steps = sqlx::query_as::<_, StepView>(
            r#"
            SELECT s.id, s.name, s.title, s.step_order, cs.is_completed
            FROM client_steps cs
            JOIN onboarding_steps s ON s.id = cs.step_id
            WHERE cs.zoho_record_id = ?
            ORDER BY s.step_order, s.id
            "#,
        )
        .bind(zoho_record_id)
        .fetch_all(&self.pool)
        .await?;

        for step in &mut steps {
            step.is_required = true;
        }

        Ok(steps)
    }

    async fn complete_client_step(
        &self,
        zoho_record_id: &str,
        step_id: i64,
    ) -> Result<Option<ClientStep>, OnboardingError> {
        let result = sqlx::query(
            r#"
            UPDATE client_steps SET is_completed = 1, updated_at = ?
            WHERE zoho_record_id = ? AND step_id = ?
            "#,
        )
        .bind(Utc::now())
        .bind(zoho_record_id)
        .bind(step_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }

        self.find_client_step(zoho_record_id, step_id).await
    }

    async fn get_payment(
        &self,
        zoho_record_id: &str,
    ) -> Result<Option<PaymentRecord>, OnboardingError> {
        let record = sqlx::query_as::<_, PaymentRecord>(
            r#"
            SELECT * FROM stripe_payments WHERE zoho_record_id = ?
            "#,
        )
        .bind(zoho_record_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    async fn find_payment_by_client_secret(
        &self,
        client_secret: &str,
    ) -> Result<Option<PaymentRecord>, OnboardingError> {
        let record = sqlx::query_as::<_, PaymentRecord>(
            r#"
            SELECT * FROM stripe_payments WHERE client_secret = ?
            "#,
        )
        .bind(client_secret)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    async fn save_payment(&self, payment: &NewPayment) -> Result<PaymentRecord, OnboardingError> {
        let now = Utc::now();
        sqlx::query(
            r#"
            INSERT INTO stripe_payments (
                zoho_record_id, client_secret, customer_id, invoice_id, amount,
                created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (zoho_record_id) DO UPDATE SET
                client_secret = excluded.client_secret,
                customer_id = excluded.customer_id,
                invoice_id = excluded.invoice_id,
                amount = excluded.amount,
                payment_id = NULL,
                payment_status = NULL,
                payment_source = NULL,
                hosted_invoice_url = NULL,
                error_message = NULL,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&payment.zoho_record_id)
        .bind(&payment.client_secret)
        .bind(&payment.customer_id)
        .bind(&payment.invoice_id)
        .bind(payment.amount)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        self.get_payment(&payment.zoho_record_id)
            .await?
            .ok_or_else(|| OnboardingError::Database {
                operation: "save_payment".to_string(),
                details: format!("payment for {} missing after save", payment.zoho_record_id),
            })
    }

    async fn update_payment_by_secret(
        &self,
        client_secret: &str,
        update: &PaymentUpdate,
    ) -> Result<Option<PaymentRecord>, OnboardingError> {
        let result = sqlx::query(
            r#"
            UPDATE stripe_payments SET
                payment_status = ?,
                payment_id = COALESCE(?, payment_id),
                payment_source = COALESCE(?, payment_source),
                amount = COALESCE(?, amount),
                hosted_invoice_url = COALESCE(?, hosted_invoice_url),
                error_message = ?,
                updated_at = ?
            WHERE client_secret = ?
            "#,
        )
        .bind(update.status.as_str())
        .bind(&update.payment_id)
        .bind(&update.payment_source)
        .bind(update.amount)
        .bind(&update.hosted_invoice_url)
        .bind(&update.error_message)
        .bind(Utc::now())
        .bind(client_secret)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }

        self.find_payment_by_client_secret(client_secret).await
    }

    async fn set_hosted_invoice_url(
        &self,
        zoho_record_id: &str,
        url: &str,
    ) -> Result<(), OnboardingError> {
        sqlx::query(
            r#"
            UPDATE stripe_payments SET hosted_invoice_url = ?, updated_at = ?
            WHERE zoho_record_id = ?
            "#,
        )
        .bind(url)
        .bind(Utc::now())
        .bind(zoho_record_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn upsert_meeting_booking(
        &self,
        zoho_record_id: &str,
        payload: &Value,
    ) -> Result<(), OnboardingError> {
        let now = Utc::now();
        sqlx::query(
            r#"
            INSERT INTO calendly_bookings (zoho_record_id, payload, created_at, updated_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT (zoho_record_id) DO UPDATE SET
                payload = excluded.payload,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(zoho_record_id)
        .bind(Json(payload))
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_meeting_booking(
        &self,
        zoho_record_id: &str,
    ) -> Result<Option<MeetingBooking>, OnboardingError> {
        let booking = sqlx::query_as::<_, MeetingBooking>(
            r#"
            SELECT zoho_record_id, payload, created_at, updated_at
            FROM calendly_bookings
            WHERE zoho_record_id = ?
            "#,
        )
        .bind(zoho_record_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(booking)
    }

    async fn health_check(&self) -> Result<bool, OnboardingError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CrmRecord, PaymentStatus, StepKind};
    use serde_json::json;

    /// Create an in-memory SQLite pool for testing.
    async fn test_pool() -> SqlitePool {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("Failed to create in-memory SQLite pool");

        migrations::SQLITE
            .run(&pool)
            .await
            .expect("Failed to run migrations");

        pool
    }

    fn client(id: &str, fields: Value) -> ClientRecord {
        let map = match fields {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        };
        ClientRecord::from_crm(id, &CrmRecord::new(map))
    }

    fn new_payment(id: &str, secret: &str) -> NewPayment {
        NewPayment {
            zoho_record_id: id.to_string(),
            client_secret: secret.to_string(),
            customer_id: Some("cus_1".to_string()),
            invoice_id: Some("in_1".to_string()),
            amount: Some(5000),
        }
    }

    #[tokio::test]
    async fn test_seeded_step_definitions() {
        let store = SqliteRecordStore::new(test_pool().await);

        let steps = store.list_step_definitions().await.unwrap();
        let names: Vec<_> = steps.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["Agreement", "Payment", "Intake Meeting"]);
        assert_eq!(steps[0].title, "Sign Our Service Agreement");

        let meeting = store
            .find_step_definition_by_name("Intake Meeting")
            .await
            .unwrap()
            .expect("seeded");
        assert_eq!(meeting.kind(), Some(StepKind::Meeting));
        assert!(store.get_step_definition(99).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_upsert_client_follows_crm() {
        let store = SqliteRecordStore::new(test_pool().await);

        let created = store
            .upsert_client(&client(
                "rec-1",
                json!({"Deal_Name": "Acme onboarding", "Stripe_Required": "Yes", "Amount": 1000}),
            ))
            .await
            .unwrap();
        assert_eq!(created.deal_name.as_deref(), Some("Acme onboarding"));

        let refreshed = store
            .upsert_client(&client("rec-1", json!({"Amount": "2500", "Contact_Name": "Jo"})))
            .await
            .unwrap();
        assert_eq!(refreshed.deal_name, None);
        assert_eq!(refreshed.stripe_required, None);
        assert_eq!(refreshed.amount, Some(2500));
        assert_eq!(refreshed.contact_name.as_deref(), Some("Jo"));
        assert_eq!(refreshed.created_at, created.created_at);
        assert!(refreshed.updated_at >= created.updated_at);
    }

    #[tokio::test]
    async fn test_upsert_client_keeps_local_completion() {
        let store = SqliteRecordStore::new(test_pool().await);
        store
            .upsert_client(&client("rec-1", json!({"Stripe_Required": "Yes"})))
            .await
            .unwrap();
        store.mark_payment_completed("rec-1").await.unwrap();

        let refreshed = store
            .upsert_client(&client("rec-1", json!({"Stripe_Required": "Yes"})))
            .await
            .unwrap();
        assert!(refreshed.completed_in_crm(StepKind::Payment));
    }

    #[tokio::test]
    async fn test_completion_flags() {
        let store = SqliteRecordStore::new(test_pool().await);
        store
            .upsert_client(&client("rec-1", json!({})))
            .await
            .unwrap();

        store.mark_agreement_completed("rec-1").await.unwrap();
        store.mark_payment_completed("rec-1").await.unwrap();

        let record = store.get_client("rec-1").await.unwrap().unwrap();
        assert!(record.completed_in_crm(StepKind::Agreement));
        assert!(record.completed_in_crm(StepKind::Payment));
        assert!(!record.completed_in_crm(StepKind::Meeting));
    }

    #[tokio::test]
    async fn test_create_client_step_is_idempotent_and_never_resets() {
        let store = SqliteRecordStore::new(test_pool().await);

        store.create_client_step("rec-1", 2).await.unwrap();
        store.create_client_step("rec-1", 2).await.unwrap();
        let steps = store.list_client_steps("rec-1").await.unwrap();
        assert_eq!(steps.len(), 1);
        assert!(!steps[0].is_completed);
        assert!(steps[0].is_required);

        let completed = store
            .complete_client_step("rec-1", 2)
            .await
            .unwrap()
            .expect("step exists");
        assert!(completed.is_completed);

        store.create_client_step("rec-1", 2).await.unwrap();
        let step = store.find_client_step("rec-1", 2).await.unwrap().unwrap();
        assert!(step.is_completed);
    }

    #[tokio::test]
    async fn test_list_client_steps_ordered() {
        let store = SqliteRecordStore::new(test_pool().await);
        store.create_client_step("rec-1", 3).await.unwrap();
        store.create_client_step("rec-1", 1).await.unwrap();
        store.create_client_step("rec-2", 2).await.unwrap();

        let steps = store.list_client_steps("rec-1").await.unwrap();
        let names: Vec<_> = steps.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["Agreement", "Intake Meeting"]);
    }

    #[tokio::test]
    async fn test_complete_missing_client_step() {
        let store = SqliteRecordStore::new(test_pool().await);
        let result = store.complete_client_step("rec-1", 1).await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_save_payment_replaces_previous_attempt() {
        let store = SqliteRecordStore::new(test_pool().await);

        store.save_payment(&new_payment("rec-1", "pi_1_secret")).await.unwrap();
        store
            .update_payment_by_secret(
                "pi_1_secret",
                &PaymentUpdate {
                    status: PaymentStatus::Failed,
                    payment_id: Some("pi_1".into()),
                    payment_source: None,
                    amount: None,
                    hosted_invoice_url: None,
                    error_message: Some("card declined".into()),
                },
            )
            .await
            .unwrap();

        let replaced = store.save_payment(&new_payment("rec-1", "pi_2_secret")).await.unwrap();
        assert_eq!(replaced.client_secret, "pi_2_secret");
        assert!(replaced.payment_status.is_none());
        assert!(replaced.error_message.is_none());
        assert!(
            store
                .find_payment_by_client_secret("pi_1_secret")
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_update_payment_by_secret() {
        let store = SqliteRecordStore::new(test_pool().await);
        store.save_payment(&new_payment("rec-1", "pi_1_secret")).await.unwrap();

        let updated = store
            .update_payment_by_secret(
                "pi_1_secret",
                &PaymentUpdate {
                    status: PaymentStatus::Succeeded,
                    payment_id: Some("pi_1".into()),
                    payment_source: Some("Credit Card/Debit Card".into()),
                    amount: Some(5000),
                    hosted_invoice_url: Some("https://invoice.stripe.com/i/1".into()),
                    error_message: None,
                },
            )
            .await
            .unwrap()
            .expect("payment exists");

        assert_eq!(updated.status(), Some(PaymentStatus::Succeeded));
        assert_eq!(updated.payment_id.as_deref(), Some("pi_1"));
        assert_eq!(
            updated.hosted_invoice_url.as_deref(),
            Some("https://invoice.stripe.com/i/1")
        );

        let unknown = store
            .update_payment_by_secret(
                "pi_unknown_secret",
                &PaymentUpdate {
                    status: PaymentStatus::Processing,
                    payment_id: None,
                    payment_source: None,
                    amount: None,
                    hosted_invoice_url: None,
                    error_message: None,
                },
            )
            .await
            .unwrap();
        assert!(unknown.is_none());
    }

    #[tokio::test]
    async fn test_meeting_booking_overwrites_payload() {
        let store = SqliteRecordStore::new(test_pool().await);

        store
            .upsert_meeting_booking("rec-1", &json!({"event": "first"}))
            .await
            .unwrap();
        store
            .upsert_meeting_booking("rec-1", &json!({"event": "second"}))
            .await
            .unwrap();

        let booking = store.get_meeting_booking("rec-1").await.unwrap().unwrap();
        assert_eq!(booking.payload.0, json!({"event": "second"}));
    }

    #[tokio::test]
    async fn test_health_check() {
        let store = SqliteRecordStore::new(test_pool().await);
        assert!(store.health_check().await.unwrap());
    }
}
