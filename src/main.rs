//! # Tinychat Gateway
//!
//! Entry point of the realtime gateway. Initializes:
//! - Tracing/logging subsystem
//! - Configuration loading
//! - Redis bus and gateway channel consumer
//! - HTTP/WebSocket server

use anyhow::Result;
use tracing::info;

use tinychat::config::Settings;
use tinychat::startup::Application;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber for structured logging
    tinychat::telemetry::init_tracing();

    info!("Starting Tinychat gateway...");

    // Load configuration from environment and config files
    let settings = Settings::load()?;
    info!(
        host = %settings.server.host,
        port = %settings.server.port,
        environment = %settings.environment,
        "Configuration loaded"
    );

    // Build and run the application
    let application = Application::build(settings).await?;

    info!("Gateway ready to accept connections");
    application.run_until_stopped().await?;

    Ok(())
}
