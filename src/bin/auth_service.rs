//! # Tinychat Auth Service
//!
//! Answers token verification requests published on the bus, looking users
//! up in PostgreSQL.

use std::sync::Arc;

use anyhow::Result;
use tracing::info;

use tinychat::application::services::VerificationService;
use tinychat::config::Settings;
use tinychat::infrastructure::bus::RedisBus;
use tinychat::infrastructure::database;
use tinychat::infrastructure::repositories::PgUserRepository;

#[tokio::main]
async fn main() -> Result<()> {
    tinychat::telemetry::init_tracing();

    info!("Starting Tinychat auth service...");

    let settings = Settings::load()?;
    info!(
        channel = %settings.auth.request_channel,
        environment = %settings.environment,
        "Configuration loaded"
    );

    let pool = database::create_pool(&settings.database).await?;
    info!("Database connection pool created");

    let bus = RedisBus::connect(&settings.redis).await?;
    info!("Redis bus connected");

    let users = Arc::new(PgUserRepository::new(pool));
    let service = VerificationService::new(Arc::new(bus), users, &settings.auth);

    tokio::select! {
        result = service.run() => result?,
        _ = tokio::signal::ctrl_c() => info!("Shutdown signal received"),
    }

    Ok(())
}
