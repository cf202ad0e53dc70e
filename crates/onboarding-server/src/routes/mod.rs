// Copyright (C) 2025 The Well Solutions
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Route handlers.

pub mod alerts;
pub mod onboarding;
pub mod payments_ws;
pub mod webhook;

use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::Json;
use onboarding_core::OnboardingError;
use serde::Serialize;

use crate::AppState;
use crate::envelope::ApiEnvelope;
use crate::error::ApiError;

pub type ApiResult<T> = Result<ApiEnvelope<T>, ApiError>;

#[derive(Debug, Serialize)]
pub struct HealthStatus {
    pub status: &'static str,
    pub database: bool,
}

pub async fn health(State(state): State<AppState>) -> ApiResult<HealthStatus> {
    let database = state.service.store().health_check().await?;
    Ok(ApiEnvelope::ok(HealthStatus {
        status: if database { "ok" } else { "degraded" },
        database,
    }))
}

/// Unwrap a JSON body, turning extractor rejections into validation errors.
pub(crate) fn json_body<T>(body: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    body.map(|Json(value)| value)
        .map_err(|rejection| OnboardingError::validation("body", rejection.body_text()).into())
}

/// A required, non-blank `recordId`.
pub(crate) fn require_record_id(record_id: Option<String>) -> Result<String, ApiError> {
    record_id
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty())
        .ok_or_else(|| OnboardingError::validation("recordId", "recordId is required").into())
}
