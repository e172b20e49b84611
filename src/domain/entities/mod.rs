//! # Domain Entities
//!
//! - **User**: stored account with its signing secret
//! - **PublicUser**: the projection shared with clients and other services
//!
//! ## Repository Traits
//!
//! Repository traits are implemented in the infrastructure layer, following
//! the dependency inversion principle.

mod user;

pub use user::{PublicUser, User, UserRepository};

#[cfg(test)]
pub use user::MockUserRepository;
