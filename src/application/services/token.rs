//! Token Codec
//!
//! Tokens are HS256 JWTs carrying the user id in an `id` claim. Each token is
//! signed with the owning user's stored secret, so the identity claim has to
//! be read before the signature can be checked.

use std::collections::HashSet;

use chrono::{Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

/// JWT claims structure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// User id
    pub id: String,
    /// Issued at time (Unix timestamp)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,
    /// Expiration time (Unix timestamp)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
}

/// Token errors
#[derive(Debug, thiserror::Error)]
pub enum TokenError {
    #[error("Malformed token")]
    Malformed,

    #[error("Token expired")]
    Expired,

    #[error("Invalid token signature")]
    InvalidSignature,

    #[error("Failed to sign token: {0}")]
    Signing(String),
}

/// Decodes and verifies bearer tokens.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokenCodec;

impl TokenCodec {
    pub fn new() -> Self {
        Self
    }

    /// Read the claimed identity without checking the signature.
    pub fn decode_identity(&self, token: &str) -> Result<String, TokenError> {
        let data = jsonwebtoken::dangerous::insecure_decode::<Claims>(token)
            .map_err(|_| TokenError::Malformed)?;

        if data.claims.id.is_empty() {
            return Err(TokenError::Malformed);
        }
        Ok(data.claims.id)
    }

    /// Check the signature against `secret` and the expiry, if any.
    pub fn verify(&self, token: &str, secret: &str) -> Result<Claims, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.required_spec_claims = HashSet::new();

        decode::<Claims>(
            token,
            &DecodingKey::from_secret(secret.as_bytes()),
            &validation,
        )
        .map(|data| data.claims)
        .map_err(|e| match e.kind() {
            ErrorKind::ExpiredSignature => TokenError::Expired,
            _ => TokenError::InvalidSignature,
        })
    }

    /// Sign a token for `id` with `secret`. Login lives in the REST API; this
    /// is its counterpart for tooling and tests.
    pub fn issue(&self, id: &str, secret: &str, ttl: Option<Duration>) -> Result<String, TokenError> {
        let now = Utc::now();
        let claims = Claims {
            id: id.to_string(),
            iat: Some(now.timestamp()),
            exp: ttl.map(|ttl| (now + ttl).timestamp()),
        };

        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .map_err(|e| TokenError::Signing(e.to_string()))
    }
}
