// Copyright (C) 2025 The Well Solutions
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Server configuration from environment variables.

use std::env;

use onboarding_core::config::ConfigError;

const DEFAULT_PORT: u16 = 5000;
const DEFAULT_FRONTEND_URL: &str = "http://localhost:8080";

/// HTTP server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Listen port
    pub port: u16,
    /// Hide internal error details from responses
    pub production: bool,
    /// Origins allowed by CORS
    pub cors_allowed_origins: Vec<String>,
}

impl ServerConfig {
    /// Load configuration from environment variables.
    ///
    /// - `ONBOARDING_PORT` (default: 5000)
    /// - `APP_ENV`: `production` enables error sanitizing
    /// - `CORS_ALLOWED_ORIGINS`: comma-separated list; defaults to `FRONTEND_URL`
    ///   (default: http://localhost:8080)
    pub fn from_env() -> Result<Self, ConfigError> {
        let port = match env::var("ONBOARDING_PORT") {
            Ok(value) => value
                .trim()
                .parse()
                .map_err(|_| ConfigError::Invalid("ONBOARDING_PORT", "must be a port number"))?,
            Err(_) => DEFAULT_PORT,
        };

        let production = env::var("APP_ENV")
            .map(|v| v.trim().eq_ignore_ascii_case("production"))
            .unwrap_or(false);

        let cors_allowed_origins = match env::var("CORS_ALLOWED_ORIGINS") {
            Ok(list) => parse_origins(&list),
            Err(_) => vec![
                env::var("FRONTEND_URL")
                    .ok()
                    .filter(|v| !v.trim().is_empty())
                    .unwrap_or_else(|| DEFAULT_FRONTEND_URL.to_string()),
            ],
        };

        Ok(Self {
            port,
            production,
            cors_allowed_origins,
        })
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            production: false,
            cors_allowed_origins: vec![DEFAULT_FRONTEND_URL.to_string()],
        }
    }
}

fn parse_origins(list: &str) -> Vec<String> {
    list.split(',')
        .map(|origin| origin.trim().trim_end_matches('/').to_string())
        .filter(|origin| !origin.is_empty())
        .collect()
}
