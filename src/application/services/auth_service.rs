//! Auth Verification Service
//!
//! The answering side of the auth correlation. Consumes every request on the
//! request channel, one at a time, and publishes exactly one response per
//! request on the request's reply channel, whatever the outcome.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::{FutureExt, StreamExt};
use tracing::{debug, error, info, warn};

use super::token::TokenCodec;
use crate::application::dto::{VerificationRequest, VerificationResponse};
use crate::config::AuthSettings;
use crate::domain::{User, UserRepository};
use crate::infrastructure::bus::{publish_json, Bus, BusError};
use crate::infrastructure::metrics;
use crate::shared::error::AppError;

/// Verification service over a user repository.
pub struct VerificationService<U>
where
    U: UserRepository,
{
    bus: Arc<dyn Bus>,
    users: Arc<U>,
    codec: TokenCodec,
    request_channel: String,
}

impl<U> VerificationService<U>
where
    U: UserRepository + 'static,
{
    pub fn new(bus: Arc<dyn Bus>, users: Arc<U>, settings: &AuthSettings) -> Self {
        Self {
            bus,
            users,
            codec: TokenCodec::new(),
            request_channel: settings.request_channel.clone(),
        }
    }

    /// Resolve the user a token belongs to.
    ///
    /// `Ok(None)` covers every way a token can fail to authenticate;
    /// `Err` is reserved for faults in the lookup itself.
    pub async fn authenticate(&self, token: &str) -> Result<Option<User>, AppError> {
        let id = match self.codec.decode_identity(token) {
            Ok(id) => id,
            Err(e) => {
                debug!(error = %e, "Rejecting token without a readable identity");
                return Ok(None);
            }
        };

        let Some(user) = self.users.find_by_id(&id).await? else {
            debug!(user_id = %id, "Rejecting token for unknown user");
            return Ok(None);
        };

        match self.codec.verify(token, &user.hash) {
            Ok(_) => Ok(Some(user)),
            Err(e) => {
                debug!(user_id = %id, error = %e, "Rejecting token");
                Ok(None)
            }
        }
    }

    /// Decide the response for one request. Never fails: faults, including
    /// panics in the lookup, are logged and answered as invalid.
    pub async fn answer(&self, request: &VerificationRequest) -> VerificationResponse {
        let outcome = AssertUnwindSafe(self.authenticate(&request.token))
            .catch_unwind()
            .await;

        match outcome {
            Ok(Ok(Some(user))) => {
                metrics::record_service_request("valid");
                VerificationResponse::valid(user.to_public())
            }
            Ok(Ok(None)) => {
                metrics::record_service_request("invalid");
                VerificationResponse::invalid()
            }
            Ok(Err(e)) => {
                metrics::record_service_request("fault");
                error!(
                    correlation_id = ?request.correlation_id,
                    error = %e,
                    "Verification failed, answering invalid"
                );
                VerificationResponse::invalid()
            }
            Err(_) => {
                metrics::record_service_request("fault");
                error!(
                    correlation_id = ?request.correlation_id,
                    "Verification panicked, answering invalid"
                );
                VerificationResponse::invalid()
            }
        }
    }

    /// Handle one raw payload from the request channel.
    pub async fn handle_payload(&self, payload: &str) {
        let request: VerificationRequest = match serde_json::from_str(payload) {
            Ok(request) => request,
            Err(e) => {
                // Without a token there is no reply channel to answer on
                warn!(error = %e, "Dropping undecodable verification request");
                return;
            }
        };

        let response = self.answer(&request).await;
        let reply_channel = request.reply_channel();

        match publish_json(self.bus.as_ref(), &reply_channel, &response).await {
            Ok(0) => debug!(
                correlation_id = ?request.correlation_id,
                "Requester no longer listening"
            ),
            Ok(_) => debug!(
                correlation_id = ?request.correlation_id,
                valid = response.valid,
                "Verification answered"
            ),
            Err(e) => error!(
                correlation_id = ?request.correlation_id,
                error = %e,
                "Failed to publish verification response"
            ),
        }
    }

    /// Consume the request channel until the bus closes it.
    pub async fn run(&self) -> Result<(), BusError> {
        let mut requests = self.bus.subscribe(&self.request_channel).await?;
        info!(channel = %self.request_channel, "Auth service listening");

        while let Some(payload) = requests.next().await {
            self.handle_payload(&payload).await;
        }

        warn!(channel = %self.request_channel, "Request subscription ended");
        Err(BusError::Closed)
    }
}
