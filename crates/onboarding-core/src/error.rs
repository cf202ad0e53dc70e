// Copyright (C) 2025 The Well Solutions
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Error types for onboarding-core.
//!
//! Provides a unified error type that maps to HTTP error envelopes.

use thiserror::Error;

use crate::adapters::ProviderError;

/// Result type using OnboardingError
pub type Result<T> = std::result::Result<T, OnboardingError>;

/// Errors that can occur while reconciling a client's onboarding state.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum OnboardingError {
    /// The CRM access token could not be obtained.
    #[error("authentication with {provider} failed: {message}")]
    Unauthenticated {
        /// Provider that refused the credentials.
        provider: &'static str,
        /// Error details.
        message: String,
    },

    /// A record, step or payment does not exist.
    #[error("{0}")]
    NotFound(String),

    /// The record exists but is not in a state that allows the operation.
    #[error("{0}")]
    InvalidState(String),

    /// A provider answered but refused the request.
    #[error("{provider} rejected the request: {message}")]
    UpstreamRejected {
        /// Provider name.
        provider: &'static str,
        /// Message returned by the provider.
        message: String,
    },

    /// A provider could not be reached or returned a non-success status.
    #[error("{provider} request failed: {message}")]
    Upstream {
        /// Provider name.
        provider: &'static str,
        /// Error details.
        message: String,
    },

    /// Webhook signature verification failed.
    #[error("{0}")]
    Unauthorized(String),

    /// Input validation failed.
    #[error("invalid {field}: {message}")]
    Validation {
        /// The field that failed validation.
        field: String,
        /// The validation error message.
        message: String,
    },

    /// Database operation failed.
    #[error("database error during {operation}: {details}")]
    Database {
        /// The operation that failed.
        operation: String,
        /// Error details.
        details: String,
    },

    /// A payload could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl OnboardingError {
    /// Shorthand for a validation failure on `field`.
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Get the error code string for this error type.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Unauthenticated { .. } => "UPSTREAM_UNAUTHENTICATED",
            Self::NotFound(_) => "NOT_FOUND",
            Self::InvalidState(_) => "INVALID_STATE",
            Self::UpstreamRejected { .. } => "UPSTREAM_REJECTED",
            Self::Upstream { .. } => "UPSTREAM_ERROR",
            Self::Unauthorized(_) => "UNAUTHORIZED",
            Self::Validation { .. } => "VALIDATION_ERROR",
            Self::Database { .. } => "DATABASE_ERROR",
            Self::Serialization(_) => "SERIALIZATION_ERROR",
        }
    }

    /// HTTP status code this error surfaces as.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::NotFound(_) => 404,
            Self::InvalidState(_) | Self::UpstreamRejected { .. } | Self::Validation { .. } => 400,
            Self::Unauthorized(_) => 401,
            Self::Unauthenticated { .. }
            | Self::Upstream { .. }
            | Self::Database { .. }
            | Self::Serialization(_) => 500,
        }
    }
}

impl From<sqlx::Error> for OnboardingError {
    fn from(err: sqlx::Error) -> Self {
        OnboardingError::Database {
            operation: "query".to_string(),
            details: err.to_string(),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for OnboardingError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        OnboardingError::Database {
            operation: "migrate".to_string(),
            details: err.to_string(),
        }
    }
}

impl From<ProviderError> for OnboardingError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::Unauthenticated { provider, message } => {
                OnboardingError::Unauthenticated { provider, message }
            }
            ProviderError::NotFound { provider, message } => {
                OnboardingError::NotFound(format!("{provider}: {message}"))
            }
            ProviderError::Rejected { provider, message } => {
                OnboardingError::UpstreamRejected { provider, message }
            }
            ProviderError::Transport { provider, message }
            | ProviderError::Decode { provider, message } => {
                OnboardingError::Upstream { provider, message }
            }
        }
    }
}
