//! Application Startup
//!
//! Gateway application building and server initialization.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use axum::Router;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;

use crate::application::services::{AuthClient, TokenVerifier};
use crate::config::Settings;
use crate::infrastructure::bus::{Bus, RedisBus};
use crate::presentation::http::{handlers::health, routes};
use crate::presentation::websocket::Gateway;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<Gateway>,
    pub settings: Arc<Settings>,
}

/// Gateway application instance
pub struct Application {
    listener: TcpListener,
    router: Router,
    gateway: Arc<Gateway>,
    consumer: JoinHandle<()>,
}

impl Application {
    /// Build the application from settings, connecting to Redis
    pub async fn build(settings: Settings) -> Result<Self> {
        let bus = RedisBus::connect(&settings.redis).await?;
        tracing::info!("Redis bus connected");

        Self::build_with_bus(settings, Arc::new(bus)).await
    }

    /// Build the application over an already connected bus
    pub async fn build_with_bus(settings: Settings, bus: Arc<dyn Bus>) -> Result<Self> {
        health::init_server_start();

        let verifier: Arc<dyn TokenVerifier> =
            Arc::new(AuthClient::new(bus.clone(), &settings.auth));
        let gateway = Arc::new(Gateway::new(verifier, settings.gateway.clone()));

        // Subscribe before serving so no event published after startup is missed
        let events = bus.subscribe(&settings.gateway.channel).await?;
        let consumer = tokio::spawn(gateway.clone().consume(bus.clone(), events));

        let state = AppState {
            gateway: gateway.clone(),
            settings: Arc::new(settings.clone()),
        };

        let router = routes::create_router(state).layer(TraceLayer::new_for_http());

        let listener = TcpListener::bind(settings.server_addr()).await?;
        tracing::info!("Listening on {}", listener.local_addr()?);

        Ok(Self {
            listener,
            router,
            gateway,
            consumer,
        })
    }

    /// Run the server until stopped
    pub async fn run_until_stopped(self) -> Result<()> {
        let result = axum::serve(self.listener, self.router)
            .with_graceful_shutdown(shutdown_signal())
            .await;

        self.consumer.abort();
        result?;
        Ok(())
    }

    /// Get the bound address
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn gateway(&self) -> Arc<Gateway> {
        self.gateway.clone()
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
