// Copyright (C) 2025 The Well Solutions
// SPDX-License-Identifier: AGPL-3.0-or-later
//! `/api/alerts` endpoints.

use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::routing::post;
use axum::{Json, Router};
use onboarding_core::OnboardingError;
use onboarding_core::adapters::FrontendErrorReport;
use tracing::warn;

use super::{ApiResult, json_body};
use crate::AppState;
use crate::envelope::ApiEnvelope;

pub fn router() -> Router<AppState> {
    Router::new().route("/frontend-error", post(frontend_error))
}

/// Relay a browser-side failure to the alert channel.
async fn frontend_error(
    State(state): State<AppState>,
    body: Result<Json<FrontendErrorReport>, JsonRejection>,
) -> ApiResult<Option<()>> {
    let report = json_body(body)?;
    if report.error_message.trim().is_empty() {
        return Err(OnboardingError::validation("errorMessage", "errorMessage is required").into());
    }

    warn!(
        record_id = report.record_id.as_deref().unwrap_or("-"),
        page = report.page.as_deref().unwrap_or("-"),
        error = %report.error_message,
        "Frontend error reported"
    );

    let alerts = state.alerts.clone();
    tokio::spawn(async move {
        alerts.send_frontend_alert(&report).await;
    });

    Ok(ApiEnvelope::with_message(None, "Error report received"))
}
