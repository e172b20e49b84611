//! WebSocket Session State

use std::time::{Duration, Instant};

use uuid::Uuid;

use crate::infrastructure::metrics;

/// Lifecycle of one gateway connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    AwaitingInit,
    Authenticating,
    Ready { identity: String },
    Closed,
}

impl ConnectionState {
    /// Label used for the connection gauge; closed connections are not counted.
    fn label(&self) -> Option<&'static str> {
        match self {
            ConnectionState::AwaitingInit => Some("awaiting_init"),
            ConnectionState::Authenticating => Some("authenticating"),
            ConnectionState::Ready { .. } => Some("ready"),
            ConnectionState::Closed => None,
        }
    }
}

/// Per-connection session bookkeeping
#[derive(Debug)]
pub struct Session {
    connection_id: Uuid,
    state: ConnectionState,
    opened_at: Instant,
}

impl Session {
    pub fn new() -> Self {
        let state = ConnectionState::AwaitingInit;
        if let Some(label) = state.label() {
            metrics::connection_entered(label);
        }
        Self {
            connection_id: Uuid::new_v4(),
            state,
            opened_at: Instant::now(),
        }
    }

    pub fn connection_id(&self) -> Uuid {
        self.connection_id
    }

    pub fn state(&self) -> &ConnectionState {
        &self.state
    }

    /// Authenticated identity, once the session is ready.
    pub fn identity(&self) -> Option<&str> {
        match &self.state {
            ConnectionState::Ready { identity } => Some(identity),
            _ => None,
        }
    }

    pub fn age(&self) -> Duration {
        self.opened_at.elapsed()
    }

    /// Move to `next`. Closed is terminal.
    pub fn transition(&mut self, next: ConnectionState) {
        if self.state == ConnectionState::Closed {
            return;
        }
        if let Some(label) = self.state.label() {
            metrics::connection_left(label);
        }
        if let Some(label) = next.label() {
            metrics::connection_entered(label);
        }

        tracing::trace!(
            connection_id = %self.connection_id,
            from = ?self.state,
            to = ?next,
            "Session transition"
        );
        self.state = next;
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.transition(ConnectionState::Closed);
    }
}
