//! Auth correlation wire types.
//!
//! These travel as plain JSON on the bus (no `{type, data}` envelope):
//! requests on the well-known request channel, responses on the per-call
//! reply channel.

use serde::{Deserialize, Serialize};

use crate::domain::PublicUser;

/// Prefix every reply channel starts with.
pub const REPLY_CHANNEL_PREFIX: &str = "auth-";

/// Name of the channel a verification reply is published on.
///
/// With a correlation id the name is unique per call even when the same token
/// is verified concurrently. Without one (legacy requesters) it falls back to
/// the token alone.
pub fn reply_channel(token: &str, correlation_id: Option<&str>) -> String {
    match correlation_id {
        Some(id) => format!("{REPLY_CHANNEL_PREFIX}{token}-{id}"),
        None => format!("{REPLY_CHANNEL_PREFIX}{token}"),
    }
}

/// Request to verify a bearer token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationRequest {
    pub token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
}

impl VerificationRequest {
    pub fn new(token: impl Into<String>, correlation_id: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            correlation_id: Some(correlation_id.into()),
        }
    }

    /// Channel the answer to this request must be published on.
    pub fn reply_channel(&self) -> String {
        reply_channel(&self.token, self.correlation_id.as_deref())
    }
}

/// Answer to a `VerificationRequest`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationResponse {
    pub valid: bool,
    #[serde(default)]
    pub user: Option<PublicUser>,
}

impl VerificationResponse {
    pub fn valid(user: PublicUser) -> Self {
        Self {
            valid: true,
            user: Some(user),
        }
    }

    pub fn invalid() -> Self {
        Self {
            valid: false,
            user: None,
        }
    }

    /// The verified user, if any. A reply claiming `valid` without a user is
    /// treated as unauthenticated.
    pub fn into_user(self) -> Option<PublicUser> {
        if self.valid {
            self.user
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_reply_channel_includes_correlation_id() {
        let request = VerificationRequest::new("tok-A", "c-1");
        assert_eq!(request.reply_channel(), "auth-tok-A-c-1");
    }

    #[test]
    fn test_legacy_request_replies_on_token_channel() {
        let request: VerificationRequest = serde_json::from_str(r#"{"token":"tok-A"}"#).unwrap();
        assert_eq!(request.correlation_id, None);
        assert_eq!(request.reply_channel(), "auth-tok-A");
    }

    #[test]
    fn test_request_wire_shape() {
        let value = serde_json::to_value(VerificationRequest::new("t", "c")).unwrap();
        assert_eq!(value, json!({ "token": "t", "correlationId": "c" }));
    }

    #[test]
    fn test_invalid_response_serializes_null_user() {
        let value = serde_json::to_value(VerificationResponse::invalid()).unwrap();
        assert_eq!(value, json!({ "valid": false, "user": null }));
    }

    #[test]
    fn test_valid_without_user_is_unauthenticated() {
        let response: VerificationResponse =
            serde_json::from_value(json!({ "valid": true, "user": null })).unwrap();
        assert_eq!(response.into_user(), None);
    }
}
