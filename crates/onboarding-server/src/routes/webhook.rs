// Copyright (C) 2025 The Well Solutions
// SPDX-License-Identifier: AGPL-3.0-or-later
//! `/api/webhook` endpoints.
//!
//! Both handlers take the raw body: signatures are computed over the exact
//! bytes the provider sent.

use axum::extract::State;
use axum::http::HeaderMap;
use axum::routing::post;
use axum::{Json, Router};
use bytes::Bytes;
use onboarding_core::WebhookAck;
use onboarding_core::webhook::{CALENDLY_SIGNATURE_HEADER, STRIPE_SIGNATURE_HEADER};

use crate::AppState;
use crate::error::ApiError;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/calendly", post(calendly))
        .route("/stripe", post(stripe))
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

async fn calendly(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookAck>, ApiError> {
    let ack = state
        .ingestor
        .handle_calendly(header(&headers, CALENDLY_SIGNATURE_HEADER), &body)
        .await?;
    Ok(Json(ack))
}

async fn stripe(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookAck>, ApiError> {
    let ack = state
        .ingestor
        .handle_stripe(header(&headers, STRIPE_SIGNATURE_HEADER), &body)
        .await?;
    Ok(Json(ack))
}
