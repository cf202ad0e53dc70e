// Copyright (C) 2025 The Well Solutions
// SPDX-License-Identifier: AGPL-3.0-or-later
//! `/api/onboarding` endpoints.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use onboarding_core::model::{
    ClientRecord, ClientStep, CrmRecord, InvoiceLinks, PaymentStatusView, RecordWithSteps,
    StepListing,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::{ApiResult, json_body, require_record_id};
use crate::AppState;
use crate::envelope::ApiEnvelope;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/get-record", get(get_record))
        .route("/record", get(refresh_record))
        .route("/records", get(list_records))
        .route("/steps", get(list_steps))
        .route("/complete-step", post(complete_step))
        .route("/create-payment-intent", post(create_payment_intent))
        .route("/create-checkout-session", post(create_checkout_session))
        .route("/download-invoice", get(download_invoice))
        .route("/download-due-invoice", get(download_due_invoice))
        .route("/check-payment-status", get(check_payment_status))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordQuery {
    pub record_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordBody {
    pub record_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteStepBody {
    pub zoho_record_id: Option<String>,
    pub step_id: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientSecret {
    pub client_secret: String,
}

#[derive(Debug, Serialize)]
pub struct RedirectUrl {
    pub url: String,
}

async fn get_record(
    State(state): State<AppState>,
    Query(query): Query<RecordQuery>,
) -> ApiResult<RecordWithSteps> {
    let record_id = require_record_id(query.record_id)?;
    info!(record_id = %record_id, "Fetching onboarding record");
    let data = state.service.get_record_with_steps(&record_id).await?;
    Ok(ApiEnvelope::with_message(data, "Record retrieved successfully"))
}

async fn refresh_record(
    State(state): State<AppState>,
    Query(query): Query<RecordQuery>,
) -> ApiResult<ClientRecord> {
    let record_id = require_record_id(query.record_id)?;
    let data = state.service.refresh_and_derive(&record_id).await?;
    Ok(ApiEnvelope::with_message(data, "Record retrieved successfully"))
}

async fn list_records(State(state): State<AppState>) -> ApiResult<Vec<CrmRecord>> {
    let data = state.service.list_crm_records().await?;
    Ok(ApiEnvelope::with_message(data, "Records retrieved successfully"))
}

async fn list_steps(
    State(state): State<AppState>,
    Query(query): Query<RecordQuery>,
) -> ApiResult<StepListing> {
    let record_id = query.record_id.filter(|id| !id.trim().is_empty());
    let data = state.service.list_steps(record_id.as_deref()).await?;
    Ok(ApiEnvelope::ok(data))
}

async fn complete_step(
    State(state): State<AppState>,
    body: Result<Json<CompleteStepBody>, JsonRejection>,
) -> ApiResult<ClientStep> {
    let body = json_body(body)?;
    let record_id = require_record_id(body.zoho_record_id)?;
    let data = state.service.complete_step(&record_id, body.step_id).await?;
    Ok(ApiEnvelope::with_message(data, "Step completed successfully"))
}

async fn create_payment_intent(
    State(state): State<AppState>,
    body: Result<Json<RecordBody>, JsonRejection>,
) -> ApiResult<ClientSecret> {
    let record_id = require_record_id(json_body(body)?.record_id)?;
    let client_secret = state.service.create_payment_intent(&record_id).await?;
    Ok(ApiEnvelope::with_message(
        ClientSecret { client_secret },
        "Payment intent created successfully",
    ))
}

async fn create_checkout_session(
    State(state): State<AppState>,
    body: Result<Json<RecordBody>, JsonRejection>,
) -> ApiResult<RedirectUrl> {
    let record_id = require_record_id(json_body(body)?.record_id)?;
    let url = state.service.create_checkout_session(&record_id).await?;
    Ok(ApiEnvelope::with_message(
        RedirectUrl { url },
        "Checkout session created successfully",
    ))
}

async fn download_invoice(
    State(state): State<AppState>,
    Query(query): Query<RecordQuery>,
) -> ApiResult<RedirectUrl> {
    let record_id = require_record_id(query.record_id)?;
    let url = state.service.download_invoice(&record_id).await?;
    Ok(ApiEnvelope::with_message(
        RedirectUrl { url },
        "Invoice retrieved successfully",
    ))
}

async fn download_due_invoice(
    State(state): State<AppState>,
    Query(query): Query<RecordQuery>,
) -> ApiResult<InvoiceLinks> {
    let record_id = require_record_id(query.record_id)?;
    let data = state.service.download_due_invoice(&record_id).await?;
    Ok(ApiEnvelope::with_message(data, "Invoice retrieved successfully"))
}

async fn check_payment_status(
    State(state): State<AppState>,
    Query(query): Query<RecordQuery>,
) -> ApiResult<PaymentStatusView> {
    let record_id = require_record_id(query.record_id)?;
    let data = state.service.check_payment_status(&record_id).await?;
    Ok(ApiEnvelope::ok(data))
}
