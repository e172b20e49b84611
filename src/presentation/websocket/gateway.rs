//! WebSocket Gateway
//!
//! Shared state of the gateway process: the listener registry, the token
//! verifier connections authenticate with, and the consumer routing bus
//! events from the gateway channel to live connections.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;

use super::registry::ListenerRegistry;
use crate::application::services::{GatewayEvent, TokenVerifier};
use crate::config::GatewaySettings;
use crate::infrastructure::bus::{reconnect_delay, Bus, BusEnvelope, Subscription};
use crate::infrastructure::metrics;

/// Gateway state shared by every connection
pub struct Gateway {
    registry: Arc<ListenerRegistry>,
    verifier: Arc<dyn TokenVerifier>,
    settings: GatewaySettings,
    open_connections: AtomicUsize,
}

impl Gateway {
    pub fn new(verifier: Arc<dyn TokenVerifier>, settings: GatewaySettings) -> Self {
        Self {
            registry: Arc::new(ListenerRegistry::new()),
            verifier,
            settings,
            open_connections: AtomicUsize::new(0),
        }
    }

    pub fn registry(&self) -> &Arc<ListenerRegistry> {
        &self.registry
    }

    pub fn verifier(&self) -> &dyn TokenVerifier {
        self.verifier.as_ref()
    }

    pub fn settings(&self) -> &GatewaySettings {
        &self.settings
    }

    pub fn init_timeout(&self) -> Duration {
        self.settings.init_timeout()
    }

    /// Number of authenticated connections
    pub fn listener_count(&self) -> usize {
        self.registry.len()
    }

    /// Number of sockets with a running connection, authenticated or not
    pub fn open_connections(&self) -> usize {
        self.open_connections.load(Ordering::Acquire)
    }

    pub(crate) fn connection_opened(&self) {
        self.open_connections.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn connection_closed(&self) {
        self.open_connections.fetch_sub(1, Ordering::AcqRel);
    }

    /// Route one event to its listener. Returns true if a live connection
    /// took it.
    pub fn route(&self, event: GatewayEvent) -> bool {
        match event {
            GatewayEvent::Dispatch { user_id, payload } => {
                let delivered = self.registry.dispatch(&user_id, payload);
                metrics::record_gateway_event("dispatch", delivered);
                tracing::trace!(user_id = %user_id, delivered, "Dispatch routed");
                delivered
            }
            GatewayEvent::Disconnect { user_id } => {
                let delivered = self.registry.disconnect(&user_id);
                metrics::record_gateway_event("disconnect", delivered);
                tracing::debug!(user_id = %user_id, delivered, "Disconnect routed");
                delivered
            }
            GatewayEvent::Ignored { kind } => {
                tracing::trace!(kind = %kind, "Ignoring gateway message");
                false
            }
        }
    }

    /// Decode and route one raw message from the gateway channel.
    pub fn route_payload(&self, payload: &str) -> bool {
        let envelope: BusEnvelope = match serde_json::from_str(payload) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::warn!(error = %e, "Dropping undecodable gateway message");
                return false;
            }
        };

        match GatewayEvent::try_from(envelope) {
            Ok(event) => self.route(event),
            Err(e) => {
                tracing::warn!(error = %e, "Dropping gateway message");
                false
            }
        }
    }

    /// Route every message of `subscription` in bus order. When the
    /// subscription ends, subscribe again on `bus` with backoff. Runs until
    /// the task is aborted.
    pub async fn consume(self: Arc<Self>, bus: Arc<dyn Bus>, mut subscription: Subscription) {
        let channel = subscription.channel().to_string();
        tracing::info!(channel = %channel, "Gateway consumer started");

        loop {
            while let Some(payload) = subscription.next().await {
                self.route_payload(&payload);
            }
            tracing::warn!(channel = %channel, "Gateway subscription ended");

            let mut attempt = 0;
            subscription = loop {
                attempt += 1;
                tokio::time::sleep(reconnect_delay(attempt)).await;

                match bus.subscribe(&channel).await {
                    Ok(subscription) => {
                        tracing::info!(channel = %channel, attempt, "Gateway resubscribed");
                        break subscription;
                    }
                    Err(e) => {
                        tracing::error!(channel = %channel, attempt, error = %e, "Gateway resubscribe failed");
                    }
                }
            };
        }
    }
}
