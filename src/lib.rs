//! # Tinychat
//!
//! Realtime side of a Discord-like chat backend:
//! - WebSocket gateway holding one live connection per authenticated user
//! - Token verification over a publish/subscribe bus, correlated per call
//! - Auth service answering verification requests from PostgreSQL
//! - Redis pub/sub as the bus between services
//!
//! ## Architecture
//!
//! The crate follows Clean Architecture principles:
//!
//! - **Domain Layer**: Core entities and repository traits
//! - **Application Layer**: Auth correlation, verification and gateway event services
//! - **Infrastructure Layer**: Bus, database, repositories and metrics
//! - **Presentation Layer**: HTTP handlers and WebSocket gateway
//!
//! ## Module Structure
//!
//! ```text
//! tinychat/
//! +-- config/         Configuration management
//! +-- domain/         Domain entities and traits
//! +-- application/    Application services and DTOs
//! +-- infrastructure/ Bus, database and metrics implementations
//! +-- presentation/   HTTP routes and WebSocket gateway
//! +-- shared/         Common utilities (errors)
//! ```

// Configuration module
pub mod config;

// Domain layer - Core business logic
pub mod domain;

// Application layer - Business services
pub mod application;

// Infrastructure layer - External implementations
pub mod infrastructure;

// Presentation layer - HTTP and WebSocket handlers
pub mod presentation;

// Shared utilities
pub mod shared;

// Application startup and state management
pub mod startup;

// Telemetry and observability
pub mod telemetry;
