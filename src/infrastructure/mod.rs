//! Infrastructure Layer
//!
//! Contains implementations for external services including:
//! - The pub/sub bus (Redis, in-process)
//! - PostgreSQL user lookups
//! - Prometheus metrics

pub mod bus;
pub mod database;
pub mod metrics;
pub mod repositories;
