//! User entity and repository trait.
//!
//! Users are created and edited by the REST API; this crate only reads them,
//! to check a token's signature against the user's stored secret and to hand
//! back a public projection.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::shared::error::AppError;

/// A user account as stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Snowflake ID, kept in its string form
    pub id: String,

    pub username: String,

    /// Four-digit tag disambiguating equal usernames
    pub discriminator: String,

    pub email: String,

    /// Per-user secret tokens are signed with. Rotated on password change,
    /// which invalidates every token issued before.
    #[serde(skip_serializing)]
    pub hash: String,
}

impl User {
    /// Read-only snapshot safe to hand to clients.
    pub fn to_public(&self) -> PublicUser {
        PublicUser {
            id: self.id.clone(),
            username: self.username.clone(),
            discriminator: self.discriminator.clone(),
            email: self.email.clone(),
        }
    }
}

/// Public projection of a user, as sent in verification replies and in the
/// gateway `ready` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicUser {
    pub id: String,
    pub username: String,
    pub discriminator: String,
    pub email: String,
}

impl From<User> for PublicUser {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            discriminator: user.discriminator,
            email: user.email,
        }
    }
}

/// Repository trait for user lookups.
///
/// Implementations of this trait handle the actual storage access.
/// The trait is defined in the domain layer to maintain dependency inversion.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Find a user by id.
    async fn find_by_id(&self, id: &str) -> Result<Option<User>, AppError>;
}
