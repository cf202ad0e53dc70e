// Copyright (C) 2025 The Well Solutions
// SPDX-License-Identifier: AGPL-3.0-or-later
//! PostgreSQL-backed record store.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use sqlx::types::Json;

use crate::error::OnboardingError;
use crate::migrations;
use crate::model::{
    ClientRecord, ClientStep, MeetingBooking, NewPayment, PaymentRecord, PaymentUpdate,
    StepDefinition, StepView,
};

use super::RecordStore;

/// PostgreSQL-backed record store.
#[derive(Clone)]
pub struct PostgresRecordStore {
    pool: PgPool,
}

impl PostgresRecordStore {
    /// Create a new PostgreSQL store from an existing, migrated pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect to a PostgreSQL URL and run migrations.
    pub async fn connect(url: &str) -> Result<Self, OnboardingError> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(url)
            .await
            .map_err(|e| OnboardingError::Database {
                operation: "connect".to_string(),
                details: format!("Failed to connect to PostgreSQL: {}", e),
            })?;

        migrations::run_postgres(&pool).await?;

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl RecordStore for PostgresRecordStore {
    async fn upsert_client(&self, client: &ClientRecord) -> Result<ClientRecord, OnboardingError> {
        let now = Utc::now();
        let record = sqlx::query_as::<_, ClientRecord>(
            r#"
            INSERT INTO clients (
                zoho_record_id, deal_id, deal_name, contact_id, contact_name, contact_email,
                company_id, company_name, pandadoc_id, agreement_id, agreement_name,
                agreement_required, stripe_required, intake_meeting_required,
                stripe_customer_id, amount, payment_link, custom_pandadoc_url,
                pandadoc_agreement_completed, stripe_payment_completed, intake_meeting_completed,
                created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16,
                    $17, $18, $19, $20, $21, $22, $22)
            ON CONFLICT (zoho_record_id) DO UPDATE SET
                deal_id = EXCLUDED.deal_id,
                deal_name = EXCLUDED.deal_name,
                contact_id = EXCLUDED.contact_id,
                contact_name = EXCLUDED.contact_name,
                contact_email = EXCLUDED.contact_email,
                company_id = EXCLUDED.company_id,
                company_name = EXCLUDED.company_name,
                pandadoc_id = EXCLUDED.pandadoc_id,
                agreement_id = EXCLUDED.agreement_id,
                agreement_name = EXCLUDED.agreement_name,
                agreement_required = EXCLUDED.agreement_required,
                stripe_required = EXCLUDED.stripe_required,
                intake_meeting_required = EXCLUDED.intake_meeting_required,
                stripe_customer_id = EXCLUDED.stripe_customer_id,
                amount = EXCLUDED.amount,
                payment_link = EXCLUDED.payment_link,
                custom_pandadoc_url = EXCLUDED.custom_pandadoc_url,
                -- Completion flags are also set locally after a push.
                pandadoc_agreement_completed = COALESCE(EXCLUDED.pandadoc_agreement_completed, clients.pandadoc_agreement_completed),
                stripe_payment_completed = COALESCE(EXCLUDED.stripe_payment_completed, clients.stripe_payment_completed),
                intake_meeting_completed = COALESCE(EXCLUDED.intake_meeting_completed, clients.intake_meeting_completed),
                updated_at = EXCLUDED.updated_at
            RETURNING *
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
        .fetch_one(&self.pool)
        .await?;

        Ok(record)
    }

    async fn get_client(
        &self,
        zoho_record_id: &str,
    ) -> Result<Option<ClientRecord>, OnboardingError> {
        let record =
            sqlx::query_as::<_, ClientRecord>("SELECT * FROM clients WHERE zoho_record_id = $1")
                .bind(zoho_record_id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(record)
    }

    async fn mark_agreement_completed(&self, zoho_record_id: &str) -> Result<(), OnboardingError> {
        sqlx::query(
            r#"
            UPDATE clients SET pandadoc_agreement_completed = 'Yes', updated_at = NOW()
            WHERE zoho_record_id = $1
            "#,
        )
        .bind(zoho_record_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn mark_payment_completed(&self, zoho_record_id: &str) -> Result<(), OnboardingError> {
        sqlx::query(
            r#"
            UPDATE clients SET stripe_payment_completed = 'Yes', updated_at = NOW()
            WHERE zoho_record_id = $1
            "#,
        )
        .bind(zoho_record_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn mark_meeting_completed(&self, zoho_record_id: &str) -> Result<(), OnboardingError> {
        sqlx::query(
            r#"
            UPDATE clients SET intake_meeting_completed = 'Yes', updated_at = NOW()
            WHERE zoho_record_id = $1
            "#,
        )
        .bind(zoho_record_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_step_definitions(&self) -> Result<Vec<StepDefinition>, OnboardingError> {
        let steps = sqlx::query_as::<_, StepDefinition>(
            "SELECT id, name, title, step_order FROM onboarding_steps ORDER BY step_order, id",
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
            "SELECT id, name, title, step_order FROM onboarding_steps WHERE id = $1",
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
            "SELECT id, name, title, step_order FROM onboarding_steps WHERE name = $1",
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
            WHERE zoho_record_id = $1 AND step_id = $2
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
        sqlx::query(
            r#"
            INSERT INTO client_steps (zoho_record_id, step_id, is_completed, created_at, updated_at)
            VALUES ($1, $2, FALSE, NOW(), NOW())
            ON CONFLICT (zoho_record_id, step_id) DO NOTHING
            "#,
        )
        .bind(zoho_record_id)
        .bind(step_id)
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
            WHERE cs.zoho_record_id = $1
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
        let step = sqlx::query_as::<_, ClientStep>(
            r#"
            UPDATE client_steps SET is_completed = TRUE, updated_at = NOW()
            WHERE zoho_record_id = $1 AND step_id = $2
            RETURNING id, zoho_record_id, step_id, is_completed, created_at, updated_at
            "#,
        )
        .bind(zoho_record_id)
        .bind(step_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(step)
    }

    async fn get_payment(
        &self,
        zoho_record_id: &str,
    ) -> Result<Option<PaymentRecord>, OnboardingError> {
        let record = sqlx::query_as::<_, PaymentRecord>(
            "SELECT * FROM stripe_payments WHERE zoho_record_id = $1",
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
            "SELECT * FROM stripe_payments WHERE client_secret = $1",
        )
        .bind(client_secret)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    async fn save_payment(&self, payment: &NewPayment) -> Result<PaymentRecord, OnboardingError> {
        let record = sqlx::query_as::<_, PaymentRecord>(
            r#"
            INSERT INTO stripe_payments (
                zoho_record_id, client_secret, customer_id, invoice_id, amount,
                created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, NOW(), NOW())
            ON CONFLICT (zoho_record_id) DO UPDATE SET
                client_secret = EXCLUDED.client_secret,
                customer_id = EXCLUDED.customer_id,
                invoice_id = EXCLUDED.invoice_id,
                amount = EXCLUDED.amount,
                payment_id = NULL,
                payment_status = NULL,
                payment_source = NULL,
                hosted_invoice_url = NULL,
                error_message = NULL,
                updated_at = NOW()
            RETURNING *
            "#,
        )
        .bind(&payment.zoho_record_id)
        .bind(&payment.client_secret)
        .bind(&payment.customer_id)
        .bind(&payment.invoice_id)
        .bind(payment.amount)
        .fetch_one(&self.pool)
        .await?;

        Ok(record)
    }

    async fn update_payment_by_secret(
        &self,
        client_secret: &str,
        update: &PaymentUpdate,
    ) -> Result<Option<PaymentRecord>, OnboardingError> {
        let record = sqlx::query_as::<_, PaymentRecord>(
            r#"
            UPDATE stripe_payments SET
                payment_status = $1,
                payment_id = COALESCE($2, payment_id),
                payment_source = COALESCE($3, payment_source),
                amount = COALESCE($4, amount),
                hosted_invoice_url = COALESCE($5, hosted_invoice_url),
                error_message = $6,
                updated_at = NOW()
            WHERE client_secret = $7
            RETURNING *
            "#,
        )
        .bind(update.status.as_str())
        .bind(&update.payment_id)
        .bind(&update.payment_source)
        .bind(update.amount)
        .bind(&update.hosted_invoice_url)
        .bind(&update.error_message)
        .bind(client_secret)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    async fn set_hosted_invoice_url(
        &self,
        zoho_record_id: &str,
        url: &str,
    ) -> Result<(), OnboardingError> {
        sqlx::query(
            r#"
            UPDATE stripe_payments SET hosted_invoice_url = $1, updated_at = NOW()
            WHERE zoho_record_id = $2
            "#,
        )
        .bind(url)
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
        sqlx::query(
            r#"
            INSERT INTO calendly_bookings (zoho_record_id, payload, created_at, updated_at)
            VALUES ($1, $2, NOW(), NOW())
            ON CONFLICT (zoho_record_id) DO UPDATE SET
                payload = EXCLUDED.payload,
                updated_at = NOW()
            "#,
        )
        .bind(zoho_record_id)
        .bind(Json(payload))
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
            WHERE zoho_record_id = $1
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
