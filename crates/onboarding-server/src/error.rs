// Copyright (C) 2025 The Well Solutions
// SPDX-License-Identifier: AGPL-3.0-or-later
//! HTTP error mapping and the error-alert policy.

use std::sync::LazyLock;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use onboarding_core::OnboardingError;
use regex::Regex;
use tracing::{error, warn};

use crate::envelope::ApiEnvelope;

const GENERIC_SERVER_ERROR: &str = "An internal server error occurred. Please try again later.";
const REDACTED: &str = "[REDACTED]";

/// Messages that make a 401/403 worth an alert.
static CRITICAL_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)payment.*failed",
        r"(?i)stripe.*error",
        r"(?i)zoho.*error",
        r"(?i)database.*connection",
        r"(?i)authentication.*failed",
        r"(?i)authorization.*failed",
    ]
    .iter()
    .filter_map(|p| Regex::new(p).ok())
    .collect()
});

static NOT_FOUND_SUBJECTS: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?i)payment|invoice|client|record").ok());

static SENSITIVE_WORDS: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?i)password|token|key|secret").ok());

/// Error returned by handlers.
#[derive(Debug)]
pub struct ApiError(pub OnboardingError);

impl From<OnboardingError> for ApiError {
    fn from(err: OnboardingError) -> Self {
        Self(err)
    }
}

/// Attached to error responses so the error layer can alert and sanitize.
#[derive(Debug, Clone)]
pub struct ErrorDetails {
    pub status: StatusCode,
    pub code: &'static str,
    pub message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let message = self.0.to_string();

        if status.is_server_error() {
            error!(code = self.0.error_code(), error = %message, "Request failed");
        } else {
            warn!(code = self.0.error_code(), error = %message, "Request rejected");
        }

        let mut response = ApiEnvelope::error(status, message.clone()).into_response();
        response.extensions_mut().insert(ErrorDetails {
            status,
            code: self.0.error_code(),
            message,
        });
        response
    }
}

/// Whether an error response should page the team.
pub fn should_alert(status: StatusCode, message: &str) -> bool {
    match status.as_u16() {
        500.. => true,
        401 | 403 => CRITICAL_PATTERNS.iter().any(|re| re.is_match(message)),
        404 => NOT_FOUND_SUBJECTS
            .as_ref()
            .is_some_and(|re| re.is_match(message)),
        _ => false,
    }
}

/// The message shown to clients.
pub fn client_message(status: StatusCode, message: &str, production: bool) -> String {
    if !production {
        return message.to_string();
    }
    if status.is_server_error() {
        return GENERIC_SERVER_ERROR.to_string();
    }
    match SENSITIVE_WORDS.as_ref() {
        Some(re) => re.replace_all(message, REDACTED).into_owned(),
        None => message.to_string(),
    }
}
