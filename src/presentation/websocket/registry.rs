//! Listener Registry
//!
//! Maps an authenticated identity to the sink of its one live connection.
//!
//! Entries live in a sharded map; every operation on an identity goes through
//! that identity's shard lock, so register/unregister/dispatch for the same
//! identity are linearized while different identities proceed independently.
//! Sinks only enqueue onto an unbounded channel, so nothing blocks while a
//! shard lock is held.

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Instruction delivered to a connection through its sink.
#[derive(Debug, Clone, PartialEq)]
pub enum SinkSignal {
    Dispatch(Value),
    Disconnect,
}

/// Handle pushing events to, or closing, one live connection.
#[derive(Debug, Clone)]
pub struct ListenerSink {
    connection_id: Uuid,
    tx: mpsc::UnboundedSender<SinkSignal>,
}

impl ListenerSink {
    /// Create a sink and the receiver its connection reads signals from.
    pub fn channel(connection_id: Uuid) -> (Self, mpsc::UnboundedReceiver<SinkSignal>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { connection_id, tx }, rx)
    }

    pub fn connection_id(&self) -> Uuid {
        self.connection_id
    }

    /// Returns false if the connection is already gone.
    pub fn dispatch(&self, event: Value) -> bool {
        self.tx.send(SinkSignal::Dispatch(event)).is_ok()
    }

    /// Returns false if the connection is already gone.
    pub fn disconnect(&self) -> bool {
        self.tx.send(SinkSignal::Disconnect).is_ok()
    }

    fn is_same(&self, other: &ListenerSink) -> bool {
        self.connection_id == other.connection_id && self.tx.same_channel(&other.tx)
    }
}

/// Identity to live-connection table, owned by the gateway process.
#[derive(Debug, Default)]
pub struct ListenerRegistry {
    listeners: DashMap<String, ListenerSink>,
    registrations: AtomicU64,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install `sink` as the only listener for `identity`.
    ///
    /// A previous sink for the identity is told to disconnect before being
    /// replaced. Returns true when a previous session was superseded.
    pub fn register(&self, identity: &str, sink: ListenerSink) -> bool {
        self.registrations.fetch_add(1, Ordering::Relaxed);
        match self.listeners.entry(identity.to_string()) {
            Entry::Occupied(mut entry) => {
                let previous = entry.insert(sink);
                if previous.is_same(entry.get()) {
                    return false;
                }
                previous.disconnect();
                tracing::info!(
                    user_id = %identity,
                    superseded = %previous.connection_id(),
                    connection_id = %entry.get().connection_id(),
                    "Superseded previous session"
                );
                true
            }
            Entry::Vacant(entry) => {
                tracing::debug!(
                    user_id = %identity,
                    connection_id = %sink.connection_id(),
                    "Listener registered"
                );
                entry.insert(sink);
                false
            }
        }
    }

    /// Remove the entry for `identity` only if `sink` is still the current
    /// one. Returns true if an entry was removed.
    pub fn unregister(&self, identity: &str, sink: &ListenerSink) -> bool {
        let removed = self
            .listeners
            .remove_if(identity, |_, current| current.is_same(sink))
            .is_some();

        if removed {
            tracing::debug!(
                user_id = %identity,
                connection_id = %sink.connection_id(),
                "Listener unregistered"
            );
        }
        removed
    }

    /// Deliver `event` to the current listener of `identity`. Events for
    /// identities without a listener are dropped. Returns true if delivered.
    pub fn dispatch(&self, identity: &str, event: Value) -> bool {
        self.listeners
            .get(identity)
            .map(|sink| sink.dispatch(event))
            .unwrap_or(false)
    }

    /// Ask the current listener of `identity` to close. The entry is removed
    /// by the connection itself as it shuts down.
    pub fn disconnect(&self, identity: &str) -> bool {
        self.listeners
            .get(identity)
            .map(|sink| sink.disconnect())
            .unwrap_or(false)
    }

    pub fn is_online(&self, identity: &str) -> bool {
        self.listeners.contains_key(identity)
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    /// Total `register` calls since startup.
    pub fn registrations(&self) -> u64 {
        self.registrations.load(Ordering::Relaxed)
    }
}
