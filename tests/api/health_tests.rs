//! Health Check API Tests

use axum_test::TestServer;
use pretty_assertions::assert_eq;
use serde_json::Value;
use std::sync::Arc;

use tinychat::application::services::AuthClient;
use tinychat::infrastructure::bus::InMemoryBus;
use tinychat::presentation::http::routes::create_router;
use tinychat::presentation::websocket::Gateway;
use tinychat::startup::AppState;

use crate::common::test_settings;

fn server() -> (TestServer, Arc<Gateway>) {
    let settings = test_settings();
    let bus = Arc::new(InMemoryBus::new());
    let verifier = Arc::new(AuthClient::new(bus, &settings.auth));
    let gateway = Arc::new(Gateway::new(verifier, settings.gateway.clone()));

    let state = AppState {
        gateway: gateway.clone(),
        settings: Arc::new(settings),
    };
    (TestServer::new(create_router(state)).unwrap(), gateway)
}

/// Test basic health check endpoint returns gateway status
#[tokio::test]
async fn test_health_check_reports_listeners() {
    let (server, _gateway) = server();

    let response = server.get("/health").await;

    response.assert_status_ok();
    let json: Value = response.json();
    assert_eq!(json["status"], "ok");
    assert_eq!(json["gateway"]["active_listeners"], 0);
    assert_eq!(json["gateway"]["open_connections"], 0);
    assert_eq!(json["gateway"]["channel"], "gateway");
}

/// Test liveness probe endpoint
#[tokio::test]
async fn test_liveness_probe() {
    let (server, _gateway) = server();

    let response = server.get("/health/live").await;

    response.assert_status_ok();
    assert_eq!(response.json::<Value>()["status"], "alive");
}

/// Test metrics endpoint exposes gateway metrics
#[tokio::test]
async fn test_metrics_endpoint() {
    let (server, gateway) = server();
    gateway.route_payload(r#"{"type":"dispatch","data":{"id":"nobody"}}"#);

    let response = server.get("/metrics").await;

    response.assert_status_ok();
    assert!(response.text().contains("tinychat_gateway_events_total"));
}

/// Plain GET on the gateway endpoint is not an upgrade
#[tokio::test]
async fn test_gateway_requires_upgrade() {
    let (server, _gateway) = server();

    let response = server.get("/gateway").await;

    assert!(response.status_code().is_client_error());
}
