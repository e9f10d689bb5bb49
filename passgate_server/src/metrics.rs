//! Prometheus metrics for the authentication server.
//!
//! Recording is always on; the values only leave the process when
//! [`init_metrics`] installed an exporter. Without one the `metrics` macros
//! are no-ops.
//!
//! # Example Usage
//!
//! ```rust,no_run
//! use passgate_server::metrics;
//! use std::net::SocketAddr;
//!
//! let addr: SocketAddr = "127.0.0.1:9090".parse().unwrap();
//! metrics::init_metrics(addr).unwrap();
//!
//! metrics::http_requests_total("POST", "/api/v1/auth/login", 200);
//! ```

use metrics_exporter_prometheus::PrometheusBuilder;
use passgate::token::TokenKind;
use std::net::SocketAddr;

/// Initialize Prometheus metrics exporter.
///
/// Metrics will be available at `http://<addr>/metrics`.
pub fn init_metrics(addr: SocketAddr) -> Result<(), String> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| format!("Failed to install Prometheus exporter: {}", e))
}

// ============================================================================
// HTTP Metrics
// ============================================================================

/// Record HTTP request.
pub fn http_requests_total(method: &str, path: &str, status: u16) {
    metrics::counter!("http_requests_total",
        "method" => method.to_string(),
        "path" => path.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

// ============================================================================
// Token Metrics
// ============================================================================

/// Record the outcome of a code or link check (`ok` or an error code).
pub fn verification_attempts_total(outcome: &str) {
    metrics::counter!("verification_attempts_total",
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

/// Increment tokens issued counter.
pub fn tokens_issued_total(kind: TokenKind) {
    metrics::counter!("tokens_issued_total",
        "kind" => kind.as_str()
    )
    .increment(1);
}

/// Increment the counter of undeliverable mails.
pub fn mail_failures_total() {
    metrics::counter!("mail_failures_total").increment(1);
}

// ============================================================================
// Credential Metrics
// ============================================================================

/// Increment access/refresh pairs issued counter.
pub fn credentials_issued_total(via: &'static str) {
    metrics::counter!("credentials_issued_total", "via" => via).increment(1);
}

// ============================================================================
// Rate Limiting Metrics
// ============================================================================

/// Increment rate limit hits counter.
pub fn rate_limit_hits_total(endpoint: &str) {
    metrics::counter!("rate_limit_hits_total",
        "endpoint" => endpoint.to_string()
    )
    .increment(1);
}
