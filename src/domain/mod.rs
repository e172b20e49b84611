//! # Domain Layer
//!
//! Core types of the chat backend that the gateway and auth service share.
//! It is independent of any external frameworks or infrastructure concerns.
//!
//! ## Design Principles
//!
//! - No dependencies on infrastructure or presentation layers
//! - Repository traits define data access contracts

pub mod entities;

pub use entities::*;
