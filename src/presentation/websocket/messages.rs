//! WebSocket Message Types
//!
//! Every frame is a JSON object `{op, data}`.

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::domain::PublicUser;

/// Outgoing gateway message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", content = "data", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Sent once, as soon as the socket opens
    Hello,
    /// Handshake complete
    Ready { user: PublicUser },
    /// Event pushed by another service
    Dispatch(serde_json::Value),
    /// Fatal errors are followed by the server closing the socket
    Error { fatal: bool, message: String },
}

impl ServerMessage {
    pub fn error(message: impl Into<String>) -> Self {
        ServerMessage::Error {
            fatal: false,
            message: message.into(),
        }
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        ServerMessage::Error {
            fatal: true,
            message: message.into(),
        }
    }
}

/// Incoming gateway message, before the op is interpreted
#[derive(Debug, Deserialize)]
pub struct ClientMessage {
    #[serde(default)]
    pub op: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

/// Init payload (op `init`)
#[derive(Debug, Deserialize, Validate)]
pub struct InitPayload {
    #[validate(length(min = 1))]
    pub token: String,
}

/// Peer-facing error texts
pub mod errors {
    pub const UNDECODABLE: &str = "Sent undecodable message";
    pub const BEFORE_READY: &str = "Sent message before ready";
    pub const INVALID_INIT: &str = "Sent invalid init payload";
    pub const INVALID_TOKEN: &str = "Invalid token";
    pub const AFTER_READY: &str = "Sent message after ready";
    pub const INIT_TIMEOUT: &str = "Init timeout";
}
