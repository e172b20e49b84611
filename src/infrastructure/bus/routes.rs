//! Channel routing table.
//!
//! Maps channel names to the local subscriptions listening on them. Both bus
//! implementations fan messages out through it: the in-process bus on
//! `publish`, the Redis bus for every message arriving on its one shared
//! subscriber connection.

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use futures::stream::{BoxStream, StreamExt};
use tokio::sync::mpsc;

struct Subscriber {
    id: u64,
    tx: mpsc::UnboundedSender<String>,
}

#[derive(Default)]
pub(crate) struct ChannelRoutes {
    channels: DashMap<String, Vec<Subscriber>>,
    next_id: AtomicU64,
}

impl ChannelRoutes {
    /// Add a subscriber to `channel`, returning its id and message queue.
    pub(crate) fn add(&self, channel: &str) -> (u64, mpsc::UnboundedReceiver<String>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();

        self.channels
            .entry(channel.to_string())
            .or_default()
            .push(Subscriber { id, tx });

        (id, rx)
    }

    /// Remove subscriber `id`. Returns true if `channel` has no subscriber
    /// left.
    pub(crate) fn remove(&self, channel: &str, id: u64) -> bool {
        if let Some(mut subs) = self.channels.get_mut(channel) {
            subs.retain(|s| s.id != id);
        }
        self.channels.remove_if(channel, |_, subs| subs.is_empty());
        !self.channels.contains_key(channel)
    }

    /// Deliver `payload` to every live subscriber of `channel`.
    pub(crate) fn deliver(&self, channel: &str, payload: &str) -> usize {
        let Some(mut subs) = self.channels.get_mut(channel) else {
            return 0;
        };

        subs.retain(|s| !s.tx.is_closed());
        subs.iter()
            .filter(|s| s.tx.send(payload.to_string()).is_ok())
            .count()
    }

    pub(crate) fn contains(&self, channel: &str) -> bool {
        self.channels.contains_key(channel)
    }

    /// Channels with at least one subscriber.
    pub(crate) fn channels(&self) -> Vec<String> {
        self.channels.iter().map(|entry| entry.key().clone()).collect()
    }

    pub(crate) fn subscriber_count(&self, channel: &str) -> usize {
        self.channels
            .get(channel)
            .map(|subs| subs.iter().filter(|s| !s.tx.is_closed()).count())
            .unwrap_or(0)
    }

    pub(crate) fn channel_count(&self) -> usize {
        self.channels.len()
    }
}

/// Turn a subscriber queue into the message stream of a `Subscription`.
pub(crate) fn queue_stream(rx: mpsc::UnboundedReceiver<String>) -> BoxStream<'static, String> {
    futures::stream::unfold(rx, |mut rx| async move {
        rx.recv().await.map(|message| (message, rx))
    })
    .boxed()
}
