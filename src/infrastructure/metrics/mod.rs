//! Prometheus Metrics Module
//!
//! Provides process-wide metrics collection using Prometheus.
//!
//! # Metrics Collected
//! - Gateway connections by state
//! - Auth verification outcomes, client and service side
//! - Auth verification round-trip latency
//! - Gateway bus events routed to connections

use once_cell::sync::Lazy;
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounterVec, IntGaugeVec, Opts, Registry, TextEncoder,
};

/// Global metrics registry
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let registry = Registry::new();
    register_metrics(&registry);
    registry
});

/// Live gateway connections, by state ("awaiting_init", "authenticating", "ready")
pub static GATEWAY_CONNECTIONS: Lazy<IntGaugeVec> = Lazy::new(|| {
    IntGaugeVec::new(
        Opts::new("gateway_connections", "Number of live gateway connections")
            .namespace("tinychat"),
        &["state"],
    )
    .expect("Failed to create GATEWAY_CONNECTIONS metric")
});

/// Verification calls made through the correlation client, by outcome
pub static AUTH_CLIENT_VERIFICATIONS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "auth_client_verifications_total",
            "Token verifications requested over the bus",
        )
        .namespace("tinychat"),
        &["outcome"], // "valid", "invalid", "timeout", "error"
    )
    .expect("Failed to create AUTH_CLIENT_VERIFICATIONS_TOTAL metric")
});

/// Verification requests answered by the auth service, by outcome
pub static AUTH_SERVICE_REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "auth_service_requests_total",
            "Verification requests answered by the auth service",
        )
        .namespace("tinychat"),
        &["outcome"], // "valid", "invalid", "fault"
    )
    .expect("Failed to create AUTH_SERVICE_REQUESTS_TOTAL metric")
});

/// Round-trip latency of a correlated verification
pub static AUTH_VERIFY_DURATION_SECONDS: Lazy<Histogram> = Lazy::new(|| {
    let buckets = vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0];
    Histogram::with_opts(
        HistogramOpts::new(
            "auth_verify_duration_seconds",
            "Correlated token verification latency in seconds",
        )
        .namespace("tinychat")
        .buckets(buckets),
    )
    .expect("Failed to create AUTH_VERIFY_DURATION_SECONDS metric")
});

/// Gateway bus events, by kind and whether a live listener took them
pub static GATEWAY_EVENTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("gateway_events_total", "Gateway bus events routed to listeners")
            .namespace("tinychat"),
        &["kind", "result"], // kind: "dispatch" | "disconnect"; result: "delivered" | "dropped"
    )
    .expect("Failed to create GATEWAY_EVENTS_TOTAL metric")
});

/// Register all metrics with the registry
fn register_metrics(registry: &Registry) {
    registry
        .register(Box::new(GATEWAY_CONNECTIONS.clone()))
        .expect("Failed to register GATEWAY_CONNECTIONS");
    registry
        .register(Box::new(AUTH_CLIENT_VERIFICATIONS_TOTAL.clone()))
        .expect("Failed to register AUTH_CLIENT_VERIFICATIONS_TOTAL");
    registry
        .register(Box::new(AUTH_SERVICE_REQUESTS_TOTAL.clone()))
        .expect("Failed to register AUTH_SERVICE_REQUESTS_TOTAL");
    registry
        .register(Box::new(AUTH_VERIFY_DURATION_SECONDS.clone()))
        .expect("Failed to register AUTH_VERIFY_DURATION_SECONDS");
    registry
        .register(Box::new(GATEWAY_EVENTS_TOTAL.clone()))
        .expect("Failed to register GATEWAY_EVENTS_TOTAL");
}

/// Collect and encode all metrics as Prometheus text format
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!(error = %e, "Failed to encode metrics");
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}

/// Track a connection entering a state.
pub fn connection_entered(state: &str) {
    GATEWAY_CONNECTIONS.with_label_values(&[state]).inc();
}

/// Track a connection leaving a state.
pub fn connection_left(state: &str) {
    GATEWAY_CONNECTIONS.with_label_values(&[state]).dec();
}

/// Record the outcome and latency of a client-side verification.
pub fn record_client_verification(outcome: &str, duration_secs: f64) {
    AUTH_CLIENT_VERIFICATIONS_TOTAL
        .with_label_values(&[outcome])
        .inc();
    AUTH_VERIFY_DURATION_SECONDS.observe(duration_secs);
}

/// Record the outcome of a request answered by the auth service.
pub fn record_service_request(outcome: &str) {
    AUTH_SERVICE_REQUESTS_TOTAL.with_label_values(&[outcome]).inc();
}

/// Record a gateway event routed (or not) to a listener.
pub fn record_gateway_event(kind: &str, delivered: bool) {
    let result = if delivered { "delivered" } else { "dropped" };
    GATEWAY_EVENTS_TOTAL.with_label_values(&[kind, result]).inc();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_registration() {
        // Force lazy initialization
        let _ = &*REGISTRY;
        let _ = &*GATEWAY_CONNECTIONS;
        let _ = &*AUTH_VERIFY_DURATION_SECONDS;
    }

    #[test]
    fn test_record_gateway_event() {
        record_gateway_event("dispatch", false);
        let metrics = gather_metrics();
        assert!(metrics.contains("tinychat_gateway_events_total"));
    }

    #[test]
    fn test_record_client_verification() {
        record_client_verification("timeout", 5.0);
        let metrics = gather_metrics();
        assert!(metrics.contains("tinychat_auth_client_verifications_total"));
        assert!(metrics.contains("tinychat_auth_verify_duration_seconds"));
    }
}
