//! HTTP API for the authentication server.
//!
//! A thin surface over [`passgate::AuthManager`]: handlers translate JSON to
//! manager calls and [`passgate::AuthError`] to status codes.
//!
//! # Modules
//!
//! - [`auth`]: Registration, verification, login, refresh and password reset
//! - [`middleware`]: Access-credential check for protected endpoints
//! - [`rate_limiter`]: Per-client sliding windows on abuse-prone endpoints
//! - [`request_id`]: `x-request-id` propagation and request logging
//! - [`context`]: Client address and context, trusting only configured proxies
//!
//! # Example Usage
//!
//! ```rust,no_run
//! use passgate_server::api::{create_router, AppState};
//! use passgate_server::api::context::TrustedProxies;
//! use passgate_server::api::rate_limiter::KeyedRateLimiter;
//! use std::net::SocketAddr;
//! use std::sync::Arc;
//! # use passgate::AuthManager;
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! # let auth_manager: AuthManager = unimplemented!();
//!
//! let state = AppState {
//!     auth: Arc::new(auth_manager),
//!     limiter: Arc::new(KeyedRateLimiter::per_minute(10)),
//!     trusted_proxies: TrustedProxies::default(),
//!     cookie_secure: true,
//! };
//!
//! let app = create_router(state);
//!
//! // Rate limiting keys on the peer address
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:8080").await?;
//! axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;
//! # Ok(())
//! # }
//! ```
//!
//! # CORS
//!
//! CORS is configured permissively for development. In production, configure
//! appropriate origins, methods, and headers.

pub mod auth;
pub mod context;
pub mod middleware;
pub mod rate_limiter;
pub mod request_id;

use axum::{
    Router,
    extract::{FromRef, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::{get, post},
};
use context::TrustedProxies;
use passgate::AuthManager;
use rate_limiter::KeyedRateLimiter;
use serde_json::json;
use std::sync::Arc;
use tower_http::cors::CorsLayer;

/// Application state shared across all HTTP handlers.
///
/// Cloned for each request (cheap due to Arc wrappers).
#[derive(Clone)]
pub struct AppState {
    pub auth: Arc<AuthManager>,
    pub limiter: Arc<KeyedRateLimiter>,
    /// Proxies allowed to report the client address
    pub trusted_proxies: TrustedProxies,
    /// Mark the refresh cookie `Secure`
    pub cookie_secure: bool,
}

impl FromRef<AppState> for TrustedProxies {
    fn from_ref(state: &AppState) -> Self {
        state.trusted_proxies.clone()
    }
}

/// Create the complete API router with all endpoints and middleware.
///
/// # Endpoint Summary
///
/// ```text
/// GET  /health                                  - Health check
/// POST /api/v1/auth/register                    - Register, mail verification link + code
/// GET  /api/v1/auth/links/{validation_id}       - Describe a link without consuming it
/// POST /api/v1/auth/verify                      - Submit a code (rate limited)
/// POST /api/v1/auth/resend                      - Regenerate an expired token (rate limited)
/// POST /api/v1/auth/login                       - Check password, mail login link (rate limited)
/// POST /api/v1/auth/login/{validation_id}       - Complete login, issue credentials
/// POST /api/v1/auth/refresh                     - Rotate the refresh credential
/// POST /api/v1/auth/forgot-password             - Mail a reset link (rate limited)
/// GET  /api/v1/auth/reset-password/{id}         - Check a reset link
/// POST /api/v1/auth/reset-password              - Set a new password
/// GET  /api/v1/auth/me                          - Caller identity (auth required)
/// ```
pub fn create_router(state: AppState) -> Router {
    let v1_routes = create_v1_router(state.clone());

    Router::new()
        .route("/health", get(health_check))
        .nest("/api/v1", v1_routes)
        .layer(axum::middleware::from_fn(request_id::request_id_middleware))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Create API v1 router with all versioned endpoints.
fn create_v1_router(state: AppState) -> Router<AppState> {
    let public_routes = Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/links/{validation_id}", get(auth::link_status))
        .route("/auth/login/{validation_id}", post(auth::resolve_login))
        .route("/auth/refresh", post(auth::refresh))
        .route(
            "/auth/reset-password/{validation_id}",
            get(auth::reset_password_status),
        )
        .route("/auth/reset-password", post(auth::reset_password));

    // Guessable or mail-triggering endpoints
    let limited_routes = Router::new()
        .route("/auth/verify", post(auth::verify))
        .route("/auth/resend", post(auth::resend))
        .route("/auth/login", post(auth::login))
        .route("/auth/forgot-password", post(auth::forgot_password))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            rate_limiter::rate_limit_middleware,
        ));

    let protected_routes = Router::new()
        .route("/auth/me", get(auth::me))
        .layer(axum::middleware::from_fn_with_state(
            state,
            middleware::auth_middleware,
        ));

    Router::new()
        .merge(public_routes)
        .merge(limited_routes)
        .merge(protected_routes)
}

/// Health check endpoint for monitoring and load balancers.
///
/// Returns `200 OK` when token storage answers, `503 Service Unavailable`
/// otherwise.
///
/// ```bash
/// curl http://localhost:8080/health
/// # {"status":"healthy","version":"0.1.0","storage":true,"timestamp":"2026-10-19T10:30:00Z"}
/// ```
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let storage_healthy = match state.auth.health_check().await {
        Ok(()) => true,
        Err(e) => {
            tracing::warn!("Health check failed: {}", e);
            false
        }
    };

    let status_code = if storage_healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let response = json!({
        "status": if storage_healthy { "healthy" } else { "unhealthy" },
        "version": env!("CARGO_PKG_VERSION"),
        "storage": storage_healthy,
        "timestamp": chrono::Utc::now().to_rfc3339(),
    });

    (status_code, Json(response))
}
