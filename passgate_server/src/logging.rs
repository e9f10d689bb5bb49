//! Structured logging configuration.
//!
//! The core library logs through the `log` facade; the subscriber installed
//! here also receives those records, so one filter governs both.

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize structured logging
///
/// Log levels are configurable via the `RUST_LOG` env var.
///
/// # Example
///
/// ```no_run
/// use passgate_server::logging;
///
/// #[tokio::main]
/// async fn main() {
///     logging::init();
///     tracing::info!("Server starting");
/// }
/// ```
pub fn init() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,sqlx=warn,hyper=warn"));

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();

    tracing::info!("Structured logging initialized");
}

/// Log security event with structured data
///
/// Never pass secrets, validation ids or passwords in `message`.
///
/// # Arguments
///
/// * `event_type` - Type of security event
/// * `subject` - Optional account identifier (user id or normalized email)
/// * `ip_address` - Optional IP address
/// * `message` - Event message
///
/// # Example
///
/// ```
/// use passgate_server::logging::log_security_event;
///
/// log_security_event(
///     "failed_login",
///     Some("ada@example.com"),
///     Some("192.168.1.1"),
///     "Invalid credentials",
/// );
/// ```
pub fn log_security_event(
    event_type: &str,
    subject: Option<&str>,
    ip_address: Option<&str>,
    message: &str,
) {
    tracing::warn!(
        event_type = event_type,
        subject = subject,
        ip_address = ip_address,
        "SECURITY: {}",
        message
    );
}
