// Copyright (C) 2025 The Well Solutions
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Response envelope shared by every JSON endpoint.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chrono::Utc;
use serde::Serialize;

pub const DEFAULT_MESSAGE: &str = "Operation successful";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiEnvelope<T> {
    pub success: bool,
    pub data: T,
    pub message: String,
    pub timestamp: String,
    pub status_code: u16,
}

impl<T: Serialize> ApiEnvelope<T> {
    pub fn ok(data: T) -> Self {
        Self::with_message(data, DEFAULT_MESSAGE)
    }

    pub fn with_message(data: T, message: impl Into<String>) -> Self {
        Self {
            success: true,
            data,
            message: message.into(),
            timestamp: Utc::now().to_rfc3339(),
            status_code: StatusCode::OK.as_u16(),
        }
    }
}

impl ApiEnvelope<Option<()>> {
    pub fn error(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            message: message.into(),
            timestamp: Utc::now().to_rfc3339(),
            status_code: status.as_u16(),
        }
    }
}

impl<T: Serialize> IntoResponse for ApiEnvelope<T> {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.status_code).unwrap_or(StatusCode::OK);
        (status, Json(self)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_shape() {
        let json = serde_json::to_value(ApiEnvelope::ok(serde_json::json!({"a": 1}))).unwrap();
        assert_eq!(json["success"], true);
        assert_eq!(json["data"]["a"], 1);
        assert_eq!(json["message"], DEFAULT_MESSAGE);
        assert_eq!(json["statusCode"], 200);
        assert!(json["timestamp"].is_string());
    }

    #[test]
    fn test_error_shape() {
        let json =
            serde_json::to_value(ApiEnvelope::error(StatusCode::NOT_FOUND, "missing")).unwrap();
        assert_eq!(json["success"], false);
        assert!(json["data"].is_null());
        assert_eq!(json["statusCode"], 404);
    }
}
