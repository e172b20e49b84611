//! Data Transfer Objects
//!
//! Wire types exchanged between services over the bus.

pub mod auth;

pub use auth::{reply_channel, VerificationRequest, VerificationResponse, REPLY_CHANNEL_PREFIX};
