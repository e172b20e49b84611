//! End-to-end tests against a bound gateway on the in-process bus.

mod auth_correlation_tests;
mod gateway_tests;
mod health_tests;
