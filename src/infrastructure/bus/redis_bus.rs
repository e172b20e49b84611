//! Redis pub/sub bus.
//!
//! Publishing goes through a shared `ConnectionManager`. All subscriptions
//! share one pub/sub connection: the first subscription to a channel sends
//! SUBSCRIBE, releasing the last one sends UNSUBSCRIBE, and a pump task fans
//! incoming messages out through the channel routing table. When the
//! connection drops, the pump reconnects with backoff and resubscribes every
//! channel that still has listeners.

use std::sync::{Arc, Weak};

use async_trait::async_trait;
use futures::StreamExt;
use redis::aio::{ConnectionManager, PubSubSink, PubSubStream};
use redis::{AsyncCommands, Client};
use tokio::sync::Mutex;
use tracing::{debug, error, info, instrument, warn};

use super::routes::{queue_stream, ChannelRoutes};
use super::{reconnect_delay, Bus, BusError, Subscription};
use crate::config::RedisSettings;

/// Bus backed by Redis PUBLISH/SUBSCRIBE.
#[derive(Clone)]
pub struct RedisBus {
    publisher: ConnectionManager,
    subscriber: Arc<SharedSubscriber>,
}

struct SharedSubscriber {
    client: Client,
    routes: ChannelRoutes,
    sink: Mutex<PubSubSink>,
}

impl RedisBus {
    /// Connect to Redis with automatic reconnection on both sides.
    #[instrument(skip(settings), fields(url = %settings.url))]
    pub async fn connect(settings: &RedisSettings) -> Result<Self, BusError> {
        info!("Connecting to Redis...");
        let client = Client::open(settings.url.as_str())?;
        let publisher = ConnectionManager::new(client.clone()).await?;
        let (sink, stream) = client.get_async_pubsub().await?.split();

        let subscriber = Arc::new(SharedSubscriber {
            client,
            routes: ChannelRoutes::default(),
            sink: Mutex::new(sink),
        });
        tokio::spawn(pump(Arc::downgrade(&subscriber), stream));

        info!("Redis connection established");
        Ok(Self {
            publisher,
            subscriber,
        })
    }
}

#[async_trait]
impl Bus for RedisBus {
    async fn publish(&self, channel: &str, payload: String) -> Result<usize, BusError> {
        let mut conn = self.publisher.clone();
        let receivers: usize = conn.publish(channel, payload).await?;
        Ok(receivers)
    }

    async fn subscribe(&self, channel: &str) -> Result<Subscription, BusError> {
        let shared = &self.subscriber;
        let (id, rx) = shared.routes.add(channel);

        // Idempotent; the channel is live on the server once this returns.
        if let Err(e) = shared.sink.lock().await.subscribe(channel).await {
            shared.routes.remove(channel, id);
            return Err(e.into());
        }

        let shared = Arc::clone(shared);
        let key = channel.to_string();
        Ok(Subscription::new(channel, queue_stream(rx)).on_release(move || {
            if shared.routes.remove(&key, id) {
                shared.unsubscribe_later(key);
            }
        }))
    }
}

impl SharedSubscriber {
    /// UNSUBSCRIBE from a channel that just lost its last listener. Runs
    /// detached because it is triggered from `Drop`.
    fn unsubscribe_later(self: Arc<Self>, channel: String) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return;
        };

        handle.spawn(async move {
            let mut sink = self.sink.lock().await;
            // A new subscription may have arrived while this task waited.
            if self.routes.contains(&channel) {
                return;
            }
            if let Err(e) = sink.unsubscribe(&channel).await {
                debug!(channel = %channel, error = %e, "UNSUBSCRIBE failed");
            }
        });
    }

    /// Open a fresh pub/sub connection and resubscribe every routed channel.
    async fn reconnect(&self) -> Result<PubSubStream, BusError> {
        let (mut sink, stream) = self.client.get_async_pubsub().await?.split();

        let mut current = self.sink.lock().await;
        for channel in self.routes.channels() {
            sink.subscribe(&channel).await?;
        }
        *current = sink;

        Ok(stream)
    }

    fn deliver(&self, msg: redis::Msg) {
        let channel = msg.get_channel_name();
        match msg.get_payload::<String>() {
            Ok(payload) => {
                self.routes.deliver(channel, &payload);
            }
            Err(e) => {
                warn!(channel = %channel, error = %e, "Dropping non-text bus payload");
            }
        }
    }
}

/// Route messages of the shared connection until the bus is dropped.
async fn pump(shared: Weak<SharedSubscriber>, mut stream: PubSubStream) {
    loop {
        while let Some(msg) = stream.next().await {
            match shared.upgrade() {
                Some(shared) => shared.deliver(msg),
                None => return,
            }
        }

        warn!("Redis subscriber connection lost");

        let mut attempt = 0;
        stream = loop {
            attempt += 1;
            tokio::time::sleep(reconnect_delay(attempt)).await;

            let Some(shared) = shared.upgrade() else {
                return;
            };
            match shared.reconnect().await {
                Ok(stream) => {
                    info!(attempt, "Redis subscriber reconnected");
                    break stream;
                }
                Err(e) => error!(attempt, error = %e, "Redis subscriber reconnect failed"),
            }
        };
    }
}
