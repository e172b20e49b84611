//! In-process bus.
//!
//! Publishing delivers straight into the routing table. Each subscriber owns
//! an unbounded queue, so a slow consumer never blocks a publisher and
//! per-channel ordering is the order of `publish` calls.

use std::sync::Arc;

use async_trait::async_trait;

use super::routes::{queue_stream, ChannelRoutes};
use super::{Bus, BusError, Subscription};

/// Bus implementation living entirely inside the current process.
#[derive(Clone, Default)]
pub struct InMemoryBus {
    routes: Arc<ChannelRoutes>,
}

impl InMemoryBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live subscriptions on a channel.
    pub fn subscriber_count(&self, channel: &str) -> usize {
        self.routes.subscriber_count(channel)
    }

    /// Number of channels with at least one subscription.
    pub fn channel_count(&self) -> usize {
        self.routes.channel_count()
    }
}

#[async_trait]
impl Bus for InMemoryBus {
    async fn publish(&self, channel: &str, payload: String) -> Result<usize, BusError> {
        let delivered = self.routes.deliver(channel, &payload);
        if delivered == 0 {
            tracing::trace!(channel = %channel, "Published with no subscribers");
        }
        Ok(delivered)
    }

    async fn subscribe(&self, channel: &str) -> Result<Subscription, BusError> {
        let (id, rx) = self.routes.add(channel);

        let routes = Arc::clone(&self.routes);
        let key = channel.to_string();
        Ok(Subscription::new(channel, queue_stream(rx)).on_release(move || {
            routes.remove(&key, id);
        }))
    }
}
