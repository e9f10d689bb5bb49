//! Per-client rate limiting for the abuse-prone authentication endpoints.
//!
//! Login, code submission, resend and forgot-password each get a sliding
//! window per client IP. A request over the limit is answered with
//! `429 RATE_LIMITED` before it reaches the handler.

use axum::{
    Json,
    extract::{Request, State},
    http::{HeaderValue, StatusCode, header::RETRY_AFTER},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use super::AppState;
use super::auth::ErrorResponse;
use super::context::peer_ip;
use crate::logging::log_security_event;
use crate::metrics;

/// Tracked clients before idle windows are swept out
const SWEEP_THRESHOLD: usize = 10_000;

/// Rate limiter using a sliding window algorithm
#[derive(Debug)]
pub struct RateLimiter {
    /// Timestamps of recent requests
    timestamps: VecDeque<Instant>,
    /// Maximum number of requests allowed in the window
    max_requests: usize,
    /// Time window for rate limiting
    window: Duration,
}

impl RateLimiter {
    /// Create a new rate limiter
    ///
    /// # Arguments
    ///
    /// * `max_requests` - Maximum number of requests allowed in the time window
    /// * `window` - Time window duration
    ///
    /// # Example
    ///
    /// ```
    /// use passgate_server::api::rate_limiter::RateLimiter;
    /// use std::time::Duration;
    ///
    /// // Allow 10 requests per minute
    /// let limiter = RateLimiter::new(10, Duration::from_secs(60));
    /// ```
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            timestamps: VecDeque::with_capacity(max_requests),
            max_requests,
            window,
        }
    }

    /// Check if a request should be allowed
    ///
    /// Returns `true` if the request is allowed, `false` if rate limit exceeded.
    ///
    /// # Example
    ///
    /// ```
    /// # use passgate_server::api::rate_limiter::RateLimiter;
    /// # use std::time::Duration;
    /// let mut limiter = RateLimiter::new(5, Duration::from_secs(1));
    ///
    /// for _ in 0..5 {
    ///     assert!(limiter.check());
    /// }
    ///
    /// assert!(!limiter.check());
    /// ```
    pub fn check(&mut self) -> bool {
        let now = Instant::now();
        self.evict(now);

        if self.timestamps.len() >= self.max_requests {
            return false;
        }

        self.timestamps.push_back(now);
        true
    }

    /// Get the number of remaining requests allowed in the current window
    pub fn remaining(&self) -> usize {
        self.max_requests.saturating_sub(self.timestamps.len())
    }

    /// Get the time until the window resets (when the oldest request expires)
    ///
    /// Returns `None` if there are no requests in the current window.
    pub fn reset_in(&self) -> Option<Duration> {
        self.timestamps.front().map(|oldest| {
            let elapsed = Instant::now().duration_since(*oldest);
            self.window.saturating_sub(elapsed)
        })
    }

    fn evict(&mut self, now: Instant) {
        while let Some(ts) = self.timestamps.front() {
            if now.duration_since(*ts) > self.window {
                self.timestamps.pop_front();
            } else {
                break;
            }
        }
    }

    fn is_idle(&mut self, now: Instant) -> bool {
        self.evict(now);
        self.timestamps.is_empty()
    }
}

/// One sliding window per key, typically `<client ip> <path>`
#[derive(Debug)]
pub struct KeyedRateLimiter {
    windows: Mutex<HashMap<String, RateLimiter>>,
    max_requests: usize,
    window: Duration,
}

impl KeyedRateLimiter {
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            windows: Mutex::new(HashMap::new()),
            max_requests,
            window,
        }
    }

    /// `max_requests` per minute for every key
    pub fn per_minute(max_requests: usize) -> Self {
        Self::new(max_requests, Duration::from_secs(60))
    }

    /// Record a request for `key`
    ///
    /// # Errors
    ///
    /// Returns how long the caller should wait when the key is over its limit.
    pub fn check(&self, key: &str) -> Result<(), Duration> {
        let mut windows = self.windows.lock().unwrap_or_else(PoisonError::into_inner);

        if windows.len() >= SWEEP_THRESHOLD {
            let now = Instant::now();
            windows.retain(|_, limiter| !limiter.is_idle(now));
        }

        let limiter = windows
            .entry(key.to_string())
            .or_insert_with(|| RateLimiter::new(self.max_requests, self.window));

        if limiter.check() {
            Ok(())
        } else {
            Err(limiter.reset_in().unwrap_or(self.window))
        }
    }

    /// Requests left for `key` in its current window
    pub fn remaining(&self, key: &str) -> usize {
        let windows = self.windows.lock().unwrap_or_else(PoisonError::into_inner);
        windows
            .get(key)
            .map_or(self.max_requests, RateLimiter::remaining)
    }
}

/// Middleware that rejects a client exceeding its per-endpoint budget
pub async fn rate_limit_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let ip = state
        .trusted_proxies
        .client_ip(peer_ip(request.extensions()), request.headers())
        .map(|ip| ip.to_string());
    let path = request.uri().path().to_string();
    let key = format!("{} {}", ip.as_deref().unwrap_or("unknown"), path);

    match state.limiter.check(&key) {
        Ok(()) => next.run(request).await,
        Err(retry_after) => {
            metrics::rate_limit_hits_total(&path);
            log_security_event("rate_limited", None, ip.as_deref(), "Rate limit exceeded");

            let body = ErrorResponse {
                error: "RATE_LIMITED".to_string(),
                message: "Too many requests, slow down".to_string(),
                attempts_remaining: None,
                validation_id: None,
            };
            let mut response = (StatusCode::TOO_MANY_REQUESTS, Json(body)).into_response();
            // Round up so a client never retries a moment too early.
            let secs = retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0);
            if let Ok(value) = HeaderValue::from_str(&secs.to_string()) {
                response.headers_mut().insert(RETRY_AFTER, value);
            }
            response
        }
    }
}
