// Copyright (C) 2025 The Well Solutions
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Onboarding Server
//!
//! Serves the onboarding API, the provider webhooks and the payment push
//! channel on a single HTTP port.

use std::net::SocketAddr;

use anyhow::Result;
use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use onboarding_core::Config;
use onboarding_server::config::ServerConfig;
use onboarding_server::{AppState, router};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file (from crate directory or parent directories)
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("onboarding_server=info,onboarding_core=info")),
        )
        .init();

    info!("Starting Onboarding Server");

    let config = Config::from_env().map_err(|e| {
        error!("Configuration error: {}", e);
        e
    })?;
    let server_config = ServerConfig::from_env().map_err(|e| {
        error!("Configuration error: {}", e);
        e
    })?;

    info!(
        port = server_config.port,
        production = server_config.production,
        origins = ?server_config.cors_allowed_origins,
        auto_complete_signed = config.auto_complete_signed,
        "Configuration loaded"
    );

    let state = AppState::from_config(&config, server_config.production).await?;
    let app = router(state, &server_config);

    let addr = SocketAddr::from(([0, 0, 0, 0], server_config.port));
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "Listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for shutdown signal: {}", e);
            }
            info!("Shutting down...");
        })
        .await?;

    info!("Shutdown complete");
    Ok(())
}
