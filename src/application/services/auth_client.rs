//! Auth Correlation Client
//!
//! Turns the bus into a request/response call. Each call:
//!
//! 1. generates a fresh correlation id,
//! 2. subscribes to `auth-<token>-<correlation id>`,
//! 3. publishes `{token, correlationId}` on the request channel,
//! 4. waits, bounded by a timeout, for exactly one reply.
//!
//! The reply subscription is owned by the call and dropped on every exit
//! path, including when the caller drops the pending future.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::StreamExt;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::application::dto::{VerificationRequest, VerificationResponse};
use crate::config::AuthSettings;
use crate::domain::PublicUser;
use crate::infrastructure::bus::{publish_json, Bus, BusError};
use crate::infrastructure::metrics;

/// Anything able to turn a bearer token into a user.
#[async_trait]
pub trait TokenVerifier: Send + Sync {
    /// Resolve the user a token belongs to, or `None` when the token cannot
    /// be authenticated for any reason.
    async fn verify(&self, token: &str) -> Option<PublicUser>;
}

/// Auth client errors
#[derive(Debug, thiserror::Error)]
pub enum AuthClientError {
    #[error("Bus error: {0}")]
    Bus(#[from] BusError),

    #[error("No verification service is listening")]
    NoListener,

    #[error("No reply within {0:?}")]
    Timeout(Duration),

    #[error("Reply channel closed before a reply arrived")]
    NoReply,

    #[error("Undecodable reply: {0}")]
    Decode(#[from] serde_json::Error),
}

impl AuthClientError {
    fn outcome(&self) -> &'static str {
        match self {
            AuthClientError::Timeout(_) => "timeout",
            _ => "error",
        }
    }
}

/// Request/response verification over the bus.
#[derive(Clone)]
pub struct AuthClient {
    bus: Arc<dyn Bus>,
    request_channel: String,
    timeout: Duration,
}

impl AuthClient {
    pub fn new(bus: Arc<dyn Bus>, settings: &AuthSettings) -> Self {
        Self::with_timeout(bus, &settings.request_channel, settings.reply_timeout())
    }

    pub fn with_timeout(bus: Arc<dyn Bus>, request_channel: &str, timeout: Duration) -> Self {
        Self {
            bus,
            request_channel: request_channel.to_string(),
            timeout,
        }
    }

    /// Verify a token, distinguishing "not authenticated" from transport
    /// failures.
    pub async fn try_verify(&self, token: &str) -> Result<Option<PublicUser>, AuthClientError> {
        let correlation_id = Uuid::new_v4().to_string();
        self.verify_correlated(token, &correlation_id).await
    }

    /// Verify a token using a caller-chosen correlation id.
    pub async fn verify_correlated(
        &self,
        token: &str,
        correlation_id: &str,
    ) -> Result<Option<PublicUser>, AuthClientError> {
        let request = VerificationRequest::new(token, correlation_id);
        let reply_channel = request.reply_channel();

        // Subscribe before publishing: the bus does not buffer for late
        // subscribers.
        let mut replies = self.bus.subscribe(&reply_channel).await?;

        let listeners = publish_json(self.bus.as_ref(), &self.request_channel, &request).await?;
        if listeners == 0 {
            return Err(AuthClientError::NoListener);
        }

        let payload = match tokio::time::timeout(self.timeout, replies.next()).await {
            Ok(Some(payload)) => payload,
            Ok(None) => return Err(AuthClientError::NoReply),
            Err(_) => return Err(AuthClientError::Timeout(self.timeout)),
        };

        let response: VerificationResponse = serde_json::from_str(&payload)?;
        Ok(response.into_user())
    }
}

#[async_trait]
impl TokenVerifier for AuthClient {
    async fn verify(&self, token: &str) -> Option<PublicUser> {
        let started = Instant::now();
        let result = self.try_verify(token).await;
        let elapsed = started.elapsed().as_secs_f64();

        match result {
            Ok(Some(user)) => {
                metrics::record_client_verification("valid", elapsed);
                debug!(user_id = %user.id, "Token verified");
                Some(user)
            }
            Ok(None) => {
                metrics::record_client_verification("invalid", elapsed);
                debug!("Token rejected");
                None
            }
            Err(e) => {
                metrics::record_client_verification(e.outcome(), elapsed);
                warn!(error = %e, "Token verification failed");
                None
            }
        }
    }
}
