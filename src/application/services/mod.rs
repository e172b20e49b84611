//! Application Services
//!
//! ## Available Services
//!
//! - **TokenCodec**: JWT identity decoding and signature checks
//! - **AuthClient**: request/response token verification over the bus
//! - **VerificationService**: the auth service answering those requests
//! - **GatewayPublisher**: pushes dispatch/disconnect events to the gateway

pub mod auth_client;
pub mod auth_service;
pub mod gateway_events;
pub mod token;

pub use auth_client::{AuthClient, AuthClientError, TokenVerifier};
pub use auth_service::VerificationService;
pub use gateway_events::{GatewayEvent, GatewayEventError, GatewayPublisher};
pub use token::{Claims, TokenCodec, TokenError};
