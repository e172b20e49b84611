//! Gateway Events
//!
//! Messages other services publish on the gateway channel, and the
//! publisher they use to do it.
//!
//! ```text
//! {"type":"dispatch","data":{"id":"42","dispatch":{...}}}
//! {"type":"internal","data":{"cause":"disconnect","id":"42"}}
//! ```

use std::sync::Arc;

use serde::Deserialize;
use serde_json::{json, Value};

use crate::config::GatewaySettings;
use crate::infrastructure::bus::{publish_json, Bus, BusEnvelope, BusError};

/// Decoded gateway channel message.
#[derive(Debug, Clone, PartialEq)]
pub enum GatewayEvent {
    /// Push `payload` to the connection of `user_id`.
    Dispatch { user_id: String, payload: Value },
    /// Close the connection of `user_id`.
    Disconnect { user_id: String },
    /// A well-formed message the gateway has nothing to do with.
    Ignored { kind: String },
}

/// Gateway event decoding errors
#[derive(Debug, thiserror::Error)]
pub enum GatewayEventError {
    #[error("Unknown gateway message type: {0}")]
    UnknownType(String),

    #[error("Invalid {kind} payload: {source}")]
    InvalidPayload {
        kind: String,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Deserialize)]
struct Target {
    id: String,
}

#[derive(Debug, Deserialize)]
struct Internal {
    cause: Option<String>,
    // Older REST builds publish the reason under `type`
    #[serde(rename = "type")]
    legacy_cause: Option<String>,
    id: String,
}

impl Internal {
    /// `cause` wins when both keys are present.
    fn into_parts(self) -> Result<(String, String), serde_json::Error> {
        match self.cause.or(self.legacy_cause) {
            Some(cause) => Ok((cause, self.id)),
            None => Err(<serde_json::Error as serde::de::Error>::missing_field("cause")),
        }
    }
}

impl TryFrom<BusEnvelope> for GatewayEvent {
    type Error = GatewayEventError;

    fn try_from(envelope: BusEnvelope) -> Result<Self, Self::Error> {
        let invalid = |kind: &str, source| GatewayEventError::InvalidPayload {
            kind: kind.to_string(),
            source,
        };

        match envelope.kind.as_str() {
            "dispatch" => {
                let target = Target::deserialize(&envelope.data)
                    .map_err(|e| invalid("dispatch", e))?;
                Ok(GatewayEvent::Dispatch {
                    user_id: target.id,
                    payload: envelope.data,
                })
            }
            "internal" => {
                let (cause, user_id) = Internal::deserialize(&envelope.data)
                    .and_then(Internal::into_parts)
                    .map_err(|e| invalid("internal", e))?;
                if cause == "disconnect" {
                    Ok(GatewayEvent::Disconnect { user_id })
                } else {
                    Ok(GatewayEvent::Ignored {
                        kind: format!("internal:{}", cause),
                    })
                }
            }
            // Replies to the REST service's own auth checks share the channel
            "confirm_auth" => Ok(GatewayEvent::Ignored {
                kind: envelope.kind,
            }),
            _ => Err(GatewayEventError::UnknownType(envelope.kind)),
        }
    }
}

/// Publishing side of the gateway channel.
#[derive(Clone)]
pub struct GatewayPublisher {
    bus: Arc<dyn Bus>,
    channel: String,
}

impl GatewayPublisher {
    pub fn new(bus: Arc<dyn Bus>, settings: &GatewaySettings) -> Self {
        Self {
            bus,
            channel: settings.channel.clone(),
        }
    }

    /// Push an event to the live connection of `user_id`, if any.
    pub async fn dispatch(&self, user_id: &str, event: Value) -> Result<usize, BusError> {
        let envelope = BusEnvelope::new("dispatch", json!({ "id": user_id, "dispatch": event }));
        publish_json(self.bus.as_ref(), &self.channel, &envelope).await
    }

    /// Force-close the live connection of `user_id`, e.g. after a password
    /// change invalidated its token.
    pub async fn disconnect(&self, user_id: &str) -> Result<usize, BusError> {
        let envelope = BusEnvelope::new("internal", json!({ "cause": "disconnect", "id": user_id }));
        publish_json(self.bus.as_ref(), &self.channel, &envelope).await
    }
}
