//! Application Layer
//!
//! Services built on the bus: the auth correlation (both ends) and the
//! gateway event contract, plus the wire DTOs they exchange.

pub mod dto;
pub mod services;
