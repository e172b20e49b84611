//! Auth correlation over the bus: client and verification service together.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use pretty_assertions::assert_eq;

use tinychat::application::dto::{VerificationRequest, VerificationResponse};
use tinychat::application::services::{AuthClient, AuthClientError, TokenVerifier};
use tinychat::domain::PublicUser;
use tinychat::infrastructure::bus::{publish_json, Bus, InMemoryBus};

use crate::common::{
    alice, spawn_auth_service, test_settings, token_for, InMemoryUserRepository, ALICE_SECRET,
};

async fn setup() -> (InMemoryBus, AuthClient) {
    let bus = InMemoryBus::new();
    spawn_auth_service(&bus, InMemoryUserRepository::with([alice()])).await;
    let client = AuthClient::new(Arc::new(bus.clone()), &test_settings().auth);
    (bus, client)
}

#[tokio::test]
async fn test_valid_token_resolves_public_user() {
    let (_bus, client) = setup().await;

    let user = client.verify(&token_for("42", ALICE_SECRET)).await;

    assert_eq!(user, Some(alice().to_public()));
}

#[tokio::test]
async fn test_unknown_user_is_unauthenticated() {
    let (_bus, client) = setup().await;

    assert_eq!(client.verify(&token_for("7", ALICE_SECRET)).await, None);
}

#[tokio::test]
async fn test_tampered_signature_is_unauthenticated() {
    let (_bus, client) = setup().await;

    assert_eq!(client.verify(&token_for("42", "not-the-secret")).await, None);
    assert_eq!(client.verify("not-a-token").await, None);
}

#[tokio::test]
async fn test_reply_subscription_released_after_success() {
    let (bus, client) = setup().await;
    let token = token_for("42", ALICE_SECRET);

    let user = client.verify_correlated(&token, "c-1").await.unwrap();

    assert!(user.is_some());
    let request = VerificationRequest::new(token, "c-1");
    assert_eq!(bus.subscriber_count(&request.reply_channel()), 0);
}

#[tokio::test]
async fn test_no_auth_service_fails_fast() {
    let bus = InMemoryBus::new();
    let client = AuthClient::new(Arc::new(bus), &test_settings().auth);

    let result = client.try_verify("tok").await;

    assert!(matches!(result, Err(AuthClientError::NoListener)));
}

#[tokio::test]
async fn test_silent_auth_service_times_out() {
    let bus = InMemoryBus::new();
    let _silent = bus.subscribe("auth").await.unwrap();
    let client = AuthClient::with_timeout(Arc::new(bus.clone()), "auth", Duration::from_millis(50));

    assert_eq!(client.verify("tok").await, None);
    assert_eq!(bus.channel_count(), 1);
}

fn user(id: &str) -> PublicUser {
    PublicUser {
        id: id.into(),
        username: format!("user-{id}"),
        discriminator: "0001".into(),
        email: format!("{id}@example.com"),
    }
}

/// Two calls for the same token in flight at once, answered in reverse
/// order with different outcomes: each call gets its own answer.
#[tokio::test]
async fn test_concurrent_calls_for_same_token_are_not_crossed() {
    let bus = InMemoryBus::new();
    let mut requests = bus.subscribe("auth").await.unwrap();
    let client = AuthClient::with_timeout(Arc::new(bus.clone()), "auth", Duration::from_secs(5));

    let responder = tokio::spawn({
        let bus = bus.clone();
        async move {
            let mut pending = Vec::new();
            for _ in 0..2 {
                let raw = requests.next().await.unwrap();
                pending.push(serde_json::from_str::<VerificationRequest>(&raw).unwrap());
            }
            for request in pending.into_iter().rev() {
                let response = match request.correlation_id.as_deref() {
                    Some("c-1") => VerificationResponse::valid(user("1")),
                    _ => VerificationResponse::invalid(),
                };
                publish_json(&bus, &request.reply_channel(), &response)
                    .await
                    .unwrap();
            }
        }
    });

    let (first, second) = tokio::join!(
        client.verify_correlated("tok-A", "c-1"),
        client.verify_correlated("tok-A", "c-2"),
    );
    responder.await.unwrap();

    assert_eq!(first.unwrap(), Some(user("1")));
    assert_eq!(second.unwrap(), None);
}

/// Requests without a correlation id are answered on `auth-<token>`.
#[tokio::test]
async fn test_legacy_request_answered_on_token_channel() {
    let (bus, _client) = setup().await;
    let token = token_for("42", ALICE_SECRET);
    let mut replies = bus.subscribe(&format!("auth-{token}")).await.unwrap();

    let request = serde_json::json!({ "token": token });
    publish_json(&bus, "auth", &request).await.unwrap();

    let raw = tokio::time::timeout(Duration::from_secs(5), replies.next())
        .await
        .unwrap()
        .unwrap();
    let response: VerificationResponse = serde_json::from_str(&raw).unwrap();
    assert_eq!(response.into_user(), Some(alice().to_public()));
}
