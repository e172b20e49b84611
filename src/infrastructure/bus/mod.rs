//! Bus Module
//!
//! Publish/subscribe transport connecting the gateway, the auth service and
//! any other service that pushes events to connected users.
//!
//! The bus has no request/response semantics of its own: delivery is
//! at-most-once to every subscriber present at publish time, and a message
//! published on a channel nobody listens to is simply lost. Correlation is
//! built on top of it in `application::services::auth_client`.
//!
//! # Architecture
//!
//! ```text
//! +-------------------+
//! |   Services        |
//! +-------------------+
//!          |
//!          v
//! +-------------------+
//! |   Bus Trait       |  <-- publish / subscribe
//! +-------------------+
//!      |         |
//!      v         v
//! +---------+ +-----------+
//! |RedisBus | |InMemoryBus|
//! +---------+ +-----------+
//! ```

mod memory;
mod redis_bus;
mod routes;

pub use memory::InMemoryBus;
pub use redis_bus::RedisBus;

use std::fmt;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{BoxStream, Stream};
use serde::{Deserialize, Serialize};

/// Bus errors
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Failed to encode bus message: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Subscription closed")]
    Closed,
}

/// Publish/subscribe transport.
#[async_trait]
pub trait Bus: Send + Sync {
    /// Publish a payload on a channel, returning how many subscribers
    /// received it.
    async fn publish(&self, channel: &str, payload: String) -> Result<usize, BusError>;

    /// Subscribe to a channel. The subscription is active once this returns
    /// and is released when the returned value is dropped.
    async fn subscribe(&self, channel: &str) -> Result<Subscription, BusError>;
}

const RECONNECT_BASE_MS: u64 = 100;
const RECONNECT_MAX_MS: u64 = 30_000;

/// Backoff before retry number `attempt` (1-based) of a lost subscription.
/// Doubles from 100ms and caps at 30s.
pub fn reconnect_delay(attempt: u32) -> Duration {
    let exp = attempt.saturating_sub(1).min(16);
    let ms = RECONNECT_BASE_MS.saturating_mul(1u64 << exp);
    Duration::from_millis(ms.min(RECONNECT_MAX_MS))
}

/// Serialize a value as JSON and publish it.
pub async fn publish_json<T: Serialize + ?Sized>(
    bus: &dyn Bus,
    channel: &str,
    value: &T,
) -> Result<usize, BusError> {
    let payload = serde_json::to_string(value)?;
    bus.publish(channel, payload).await
}

/// A live subscription to one channel.
///
/// Yields raw payloads in bus order. Dropping it unsubscribes.
pub struct Subscription {
    channel: String,
    messages: BoxStream<'static, String>,
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub(crate) fn new(channel: impl Into<String>, messages: BoxStream<'static, String>) -> Self {
        Self {
            channel: channel.into(),
            messages,
            release: None,
        }
    }

    /// Attach a hook that runs when the subscription is dropped.
    pub(crate) fn on_release(mut self, release: impl FnOnce() + Send + 'static) -> Self {
        self.release = Some(Box::new(release));
        self
    }

    /// Channel this subscription listens on.
    pub fn channel(&self) -> &str {
        &self.channel
    }
}

impl Stream for Subscription {
    type Item = String;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.messages.as_mut().poll_next(cx)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
        tracing::trace!(channel = %self.channel, "Subscription released");
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("channel", &self.channel)
            .finish_non_exhaustive()
    }
}

/// Wire shape of every typed message exchanged between services.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BusEnvelope {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

impl BusEnvelope {
    pub fn new(kind: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            kind: kind.into(),
            data,
        }
    }
}
