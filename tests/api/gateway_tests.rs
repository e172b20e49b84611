//! Gateway sessions over a real socket.

use pretty_assertions::assert_eq;
use serde_json::json;

use crate::common::{alice, token_for, TestApp, ALICE_SECRET};

#[tokio::test]
async fn test_good_token_session_receives_dispatch() {
    let app = TestApp::spawn_with_stub_auth().await;
    let mut client = app.connect().await;

    assert_eq!(client.recv_json().await, json!({ "op": "hello" }));

    client.init("good-token").await;
    assert_eq!(
        client.recv_json().await,
        json!({
            "op": "ready",
            "data": { "user": {
                "id": "42",
                "username": "alice",
                "discriminator": "0001",
                "email": "alice@example.com"
            } }
        })
    );

    app.publisher()
        .dispatch("42", json!({ "type": "guild_create" }))
        .await
        .unwrap();

    assert_eq!(
        client.recv_json().await,
        json!({
            "op": "dispatch",
            "data": { "id": "42", "dispatch": { "type": "guild_create" } }
        })
    );
}

#[tokio::test]
async fn test_signed_token_through_verification_service() {
    let app = TestApp::spawn().await;
    let mut client = app.connect().await;
    client.recv_json().await;

    client.init(&token_for("42", ALICE_SECRET)).await;

    let ready = client.recv_json().await;
    assert_eq!(ready["op"], "ready");
    assert_eq!(ready["data"]["user"], serde_json::to_value(alice().to_public()).unwrap());
    assert!(app.gateway.registry().is_online("42"));
}

#[tokio::test]
async fn test_invalid_token_is_fatal() {
    let app = TestApp::spawn().await;
    let mut client = app.connect().await;
    client.recv_json().await;

    client.init(&token_for("42", "stale-secret")).await;

    assert_eq!(
        client.recv_json().await,
        json!({ "op": "error", "data": { "fatal": true, "message": "Invalid token" } })
    );
    client.expect_closed().await;
    assert!(app.gateway.registry().is_empty());
}

#[tokio::test]
async fn test_wrong_op_before_init_keeps_connection() {
    let app = TestApp::spawn_with_stub_auth().await;
    let mut client = app.connect().await;
    client.recv_json().await;

    client.send_json(json!({ "op": "heartbeat" })).await;
    assert_eq!(
        client.recv_json().await,
        json!({ "op": "error", "data": { "fatal": false, "message": "Sent message before ready" } })
    );

    client.init("good-token").await;
    assert_eq!(client.recv_json().await["op"], "ready");
}

#[tokio::test]
async fn test_never_init_then_disconnect_leaves_registry_untouched() {
    let app = TestApp::spawn_with_stub_auth().await;
    let mut client = app.connect().await;
    client.recv_json().await;

    assert_eq!(app.gateway.open_connections(), 1);

    client.close().await;
    app.wait_connections_closed().await;

    assert_eq!(app.gateway.registry().registrations(), 0);
    assert!(app.gateway.registry().is_empty());
}

#[tokio::test]
async fn test_internal_disconnect_closes_socket() {
    let app = TestApp::spawn_with_stub_auth().await;
    let mut client = app.connect().await;
    client.recv_json().await;
    client.init("good-token").await;
    client.recv_json().await;

    app.publisher().disconnect("42").await.unwrap();

    client.expect_closed().await;
    app.wait_online("42", false).await;
}

#[tokio::test]
async fn test_new_session_supersedes_old_one() {
    let app = TestApp::spawn_with_stub_auth().await;

    let mut first = app.connect().await;
    first.recv_json().await;
    first.init("good-token").await;
    first.recv_json().await;

    let mut second = app.connect().await;
    second.recv_json().await;
    second.init("good-token").await;
    assert_eq!(second.recv_json().await["op"], "ready");

    first.expect_closed().await;

    app.publisher()
        .dispatch("42", json!({ "type": "message_create" }))
        .await
        .unwrap();
    assert_eq!(second.recv_json().await["op"], "dispatch");
    assert_eq!(app.gateway.listener_count(), 1);
}

#[tokio::test]
async fn test_client_close_after_ready_unregisters() {
    let app = TestApp::spawn_with_stub_auth().await;
    let mut client = app.connect().await;
    client.recv_json().await;
    client.init("good-token").await;
    client.recv_json().await;
    app.wait_online("42", true).await;

    client.close().await;

    app.wait_online("42", false).await;
}
