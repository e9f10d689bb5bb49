//! HTTP server for passgate.
//!
//! Wires [`passgate::AuthManager`] to an axum router with request ids,
//! rate limiting, structured logging, SMTP delivery and Prometheus metrics. The binary in
//! `main.rs` only reads configuration and picks backends.

pub mod api;
pub mod config;
pub mod logging;
pub mod mailer;
pub mod metrics;
