//! Authentication API handlers.
//!
//! Every flow is two steps: a request that mails a validation link (and,
//! for email verification, a code), and a follow-up that presents the
//! validation id from that mail.
//!
//! Errors share one JSON shape:
//!
//! ```json
//! {
//!   "error": "INVALID_TOKEN",
//!   "message": "Invalid token, 2 attempt(s) remaining",
//!   "attempts_remaining": 2
//! }
//! ```
//!
//! # Examples
//!
//! Start a login:
//! ```bash
//! curl -X POST http://localhost:8080/api/v1/auth/login \
//!   -H "Content-Type: application/json" \
//!   -d '{"email": "ada@example.com", "password": "SecurePass123"}'
//! ```
//!
//! Complete it from the mailed link:
//! ```bash
//! curl -X POST http://localhost:8080/api/v1/auth/login/<validation_id> -c cookies.txt
//! ```

use axum::{
    Json,
    body::Bytes,
    extract::{Path, State},
    http::{
        HeaderMap, HeaderValue, StatusCode,
        header::{COOKIE, SET_COOKIE},
    },
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use passgate::auth::{
    AuthError, ForgotPasswordAck, IssuedToken, LinkStatus, LoginRequest, PasswordResetSubmit,
    RegisterRequest, ResendTarget, ResetAuthorization, VerifiedToken,
};
use passgate::credentials::CredentialPair;
use passgate::users::UserId;
use serde::{Deserialize, Serialize};

use super::AppState;
use super::context::RequestContext;
use super::middleware::AuthenticatedUser;
use super::request_id::RequestId;
use crate::logging::log_security_event;
use crate::metrics;

/// Name of the cookie holding the refresh credential
pub const REFRESH_COOKIE_NAME: &str = "refresh_token";

/// Path the refresh cookie is scoped to
const REFRESH_COOKIE_PATH: &str = "/api/v1/auth";

#[derive(Debug, Deserialize)]
pub struct VerifyPayload {
    pub validation_id: String,
    pub secret: String,
}

#[derive(Debug, Deserialize)]
pub struct ForgotPasswordPayload {
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct RefreshPayload {
    pub refresh_token: Option<String>,
}

/// A freshly signed-in session.
///
/// The refresh credential travels in an `HttpOnly` cookie; it is only echoed
/// in the body when the client presented it in the body.
#[derive(Debug, Serialize)]
pub struct SessionResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<UserId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    pub access_token: String,
    pub access_expires_at: DateTime<Utc>,
    pub refresh_expires_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
}

impl SessionResponse {
    fn from_pair(pair: &CredentialPair) -> Self {
        Self {
            user_id: None,
            email: None,
            display_name: None,
            access_token: pair.access_token.clone(),
            access_expires_at: pair.access_expires_at,
            refresh_expires_at: pair.refresh_expires_at,
            refresh_token: None,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attempts_remaining: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validation_id: Option<String>,
}

type ApiResult<T> = Result<T, (StatusCode, Json<ErrorResponse>)>;

/// HTTP status for an authentication error
pub fn status_for(err: &AuthError) -> StatusCode {
    if err.is_internal() {
        return StatusCode::INTERNAL_SERVER_ERROR;
    }
    match err {
        AuthError::NotFound | AuthError::UserNotFound => StatusCode::NOT_FOUND,
        AuthError::Expired => StatusCode::GONE,
        AuthError::AlreadyUsed | AuthError::EmailTaken | AuthError::StillActive => {
            StatusCode::CONFLICT
        }
        AuthError::MaxAttemptsExceeded => StatusCode::FORBIDDEN,
        AuthError::InvalidCredentials | AuthError::Credential(_) => StatusCode::UNAUTHORIZED,
        AuthError::InvalidToken { .. }
        | AuthError::InvalidType
        | AuthError::InvalidEmail
        | AuthError::WeakPassword(_) => StatusCode::BAD_REQUEST,
        AuthError::MailDelivery { .. } => StatusCode::BAD_GATEWAY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Map an [`AuthError`] to a status code and a client-safe body
fn error_response(err: AuthError, request_id: &RequestId) -> (StatusCode, Json<ErrorResponse>) {
    let status = status_for(&err);

    if err.is_internal() {
        tracing::error!(request_id = %request_id.as_str(), "Authentication backend failure: {}", err);
    } else if let AuthError::MailDelivery { reason, .. } = &err {
        metrics::mail_failures_total();
        tracing::error!(request_id = %request_id.as_str(), "Mail delivery failed: {}", reason);
    }

    let attempts_remaining = match &err {
        AuthError::InvalidToken { attempts_remaining } => Some(*attempts_remaining),
        _ => None,
    };
    let validation_id = match &err {
        AuthError::MailDelivery { validation_id, .. } => Some(validation_id.clone()),
        _ => None,
    };

    let body = ErrorResponse {
        error: err.code().to_string(),
        message: err.client_message(),
        attempts_remaining,
        validation_id,
    };
    (status, Json(body))
}

/// Build the `HttpOnly` cookie carrying the refresh credential
fn refresh_cookie(state: &AppState, pair: &CredentialPair) -> Option<HeaderValue> {
    let max_age = state.auth.refresh_ttl().num_seconds();
    let mut cookie = format!(
        "{REFRESH_COOKIE_NAME}={}; Path={REFRESH_COOKIE_PATH}; HttpOnly; SameSite=Strict; Max-Age={max_age}",
        pair.refresh_token
    );
    if state.cookie_secure {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie).ok()
}

fn refresh_token_from_cookie(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(COOKIE)?.to_str().ok()?;
    value.split(';').find_map(|pair| {
        let (key, val) = pair.trim().split_once('=')?;
        (key.trim() == REFRESH_COOKIE_NAME && !val.trim().is_empty())
            .then(|| val.trim().to_string())
    })
}

/// JSON body plus the refresh cookie
fn with_refresh_cookie<T: Serialize>(
    state: &AppState,
    pair: &CredentialPair,
    body: T,
) -> Response {
    let mut response = Json(body).into_response();
    match refresh_cookie(state, pair) {
        Some(cookie) => {
            response.headers_mut().insert(SET_COOKIE, cookie);
        }
        None => tracing::error!("Refresh credential is not a valid header value"),
    }
    response
}

/// Register a new account.
///
/// # Request Body
///
/// ```json
/// {
///   "email": "ada@example.com",
///   "password": "SecurePass123",
///   "display_name": "Ada"
/// }
/// ```
///
/// # Response
///
/// `201 Created` with the pending verification token:
/// ```json
/// {
///   "validation_id": "9f2c…",
///   "kind": "email_verification",
///   "expires_at": "2026-10-20T10:30:00Z"
/// }
/// ```
///
/// # Errors
///
/// - `400 Bad Request`: Invalid email or weak password
/// - `409 Conflict`: Email already registered
/// - `502 Bad Gateway`: Account created, mail not sent (`validation_id` included for resend)
pub async fn register(
    request_id: RequestId,
    State(state): State<AppState>,
    RequestContext(context): RequestContext,
    Json(payload): Json<RegisterRequest>,
) -> ApiResult<(StatusCode, Json<IssuedToken>)> {
    let issued = state
        .auth
        .register(payload, context)
        .await
        .map_err(|e| error_response(e, &request_id))?;

    metrics::tokens_issued_total(issued.kind);
    Ok((StatusCode::CREATED, Json(issued)))
}

/// Describe a validation link without consuming it.
///
/// # Errors
///
/// - `404 Not Found`: Unknown validation id
/// - `410 Gone`: Link expired
/// - `409 Conflict`: Link already used
pub async fn link_status(
    request_id: RequestId,
    State(state): State<AppState>,
    Path(validation_id): Path<String>,
) -> ApiResult<Json<LinkStatus>> {
    state
        .auth
        .link_status(&validation_id)
        .await
        .map(Json)
        .map_err(|e| error_response(e, &request_id))
}

/// Submit a mailed code.
///
/// # Request Body
///
/// ```json
/// { "validation_id": "9f2c…", "secret": "482913" }
/// ```
///
/// # Errors
///
/// - `400 Bad Request`: Wrong code (`attempts_remaining` included), or a token whose mail carries no code
/// - `403 Forbidden`: Attempt budget exhausted
/// - `410 Gone`: Token expired
/// - `409 Conflict`: Token already used
pub async fn verify(
    request_id: RequestId,
    State(state): State<AppState>,
    Json(payload): Json<VerifyPayload>,
) -> ApiResult<Json<VerifiedToken>> {
    match state
        .auth
        .submit_code(&payload.validation_id, &payload.secret)
        .await
    {
        Ok(verified) => {
            metrics::verification_attempts_total("ok");
            Ok(Json(verified))
        }
        Err(e) => {
            metrics::verification_attempts_total(e.code());
            if matches!(e, AuthError::MaxAttemptsExceeded) {
                log_security_event("token_locked", None, None, "Code attempt on a locked token");
            }
            Err(error_response(e, &request_id))
        }
    }
}

/// Regenerate an expired token.
///
/// # Request Body
///
/// Either `{ "validation_id": "9f2c…" }` or
/// `{ "email": "ada@example.com", "kind": "email_verification" }`.
///
/// # Response
///
/// By validation id: the replacement token's `{validation_id, kind, expires_at}`.
/// By email: always `200 OK` with the same acknowledgement; the new link
/// only travels in the mail.
///
/// # Errors (by validation id)
///
/// - `409 Conflict`: `TOKEN_STILL_ACTIVE` or `ALREADY_USED`
/// - `403 Forbidden`: Token locked
/// - `404 Not Found`: No such token
pub async fn resend(
    request_id: RequestId,
    State(state): State<AppState>,
    RequestContext(context): RequestContext,
    Json(target): Json<ResendTarget>,
) -> ApiResult<Response> {
    match target {
        ResendTarget::ValidationId { validation_id } => {
            let issued = state
                .auth
                .resend(&validation_id, context)
                .await
                .map_err(|e| error_response(e, &request_id))?;
            metrics::tokens_issued_total(issued.kind);
            Ok(Json(issued).into_response())
        }
        ResendTarget::Email { email, kind } => state
            .auth
            .resend_to_email(&email, kind, context)
            .await
            .map(|ack| Json(ack).into_response())
            .map_err(|e| error_response(e, &request_id)),
    }
}

/// Check a password and mail a login link.
///
/// # Request Body
///
/// ```json
/// { "email": "ada@example.com", "password": "SecurePass123" }
/// ```
///
/// # Errors
///
/// - `401 Unauthorized`: `INVALID_CREDENTIALS`, whatever the cause
///
/// # Security
///
/// - Unknown accounts cost the same as a wrong password
/// - Any earlier pending login link for the account stops working
pub async fn login(
    request_id: RequestId,
    State(state): State<AppState>,
    RequestContext(context): RequestContext,
    Json(payload): Json<LoginRequest>,
) -> ApiResult<Json<IssuedToken>> {
    let email = payload.email.trim().to_lowercase();
    let ip = context.ip.clone();

    match state.auth.login(payload, context).await {
        Ok(issued) => {
            metrics::tokens_issued_total(issued.kind);
            Ok(Json(issued))
        }
        Err(e) => {
            if matches!(e, AuthError::InvalidCredentials) {
                log_security_event(
                    "failed_login",
                    Some(email.as_str()),
                    ip.as_deref(),
                    "Invalid credentials",
                );
            }
            Err(error_response(e, &request_id))
        }
    }
}

/// Complete a login from its mailed link.
///
/// # Response
///
/// `200 OK` with the access credential; the refresh credential is set as
/// an `HttpOnly`, `SameSite=Strict` cookie scoped to `/api/v1/auth`.
/// ```json
/// {
///   "user_id": "0b6e…",
///   "email": "ada@example.com",
///   "display_name": "Ada",
///   "access_token": "eyJhbGciOiJIUzI1NiIs...",
///   "access_expires_at": "2026-10-19T10:45:00Z",
///   "refresh_expires_at": "2026-10-26T10:30:00Z"
/// }
/// ```
///
/// # Errors
///
/// - `400 Bad Request`: Not a login link
/// - `410 Gone`: Link expired
/// - `409 Conflict`: Link already used
pub async fn resolve_login(
    request_id: RequestId,
    State(state): State<AppState>,
    Path(validation_id): Path<String>,
) -> ApiResult<Response> {
    let session = match state.auth.resolve_login(&validation_id).await {
        Ok(session) => session,
        Err(e) => {
            metrics::verification_attempts_total(e.code());
            return Err(error_response(e, &request_id));
        }
    };
    metrics::verification_attempts_total("ok");
    metrics::credentials_issued_total("login");

    let body = SessionResponse {
        user_id: Some(session.user_id),
        email: Some(session.email.clone()),
        display_name: Some(session.display_name.clone()),
        ..SessionResponse::from_pair(&session.credentials)
    };
    Ok(with_refresh_cookie(&state, &session.credentials, body))
}

/// Rotate a refresh credential into a new pair.
///
/// The credential is read from the JSON body `{ "refresh_token": "…" }`
/// or, when the body is empty or omits it, from the refresh cookie.
///
/// # Errors
///
/// - `401 Unauthorized`: `REFRESH_TOKEN_ERROR` (expired, malformed, or an access credential)
/// - `404 Not Found`: The account no longer exists
pub async fn refresh(
    request_id: RequestId,
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Response> {
    let from_body = if body.is_empty() {
        None
    } else {
        let payload: RefreshPayload = serde_json::from_slice(&body).map_err(|e| {
            let body = ErrorResponse {
                error: "BAD_REQUEST".to_string(),
                message: format!("Malformed refresh request: {e}"),
                attempts_remaining: None,
                validation_id: None,
            };
            (StatusCode::BAD_REQUEST, Json(body))
        })?;
        payload.refresh_token
    };
    let echo_in_body = from_body.is_some();

    let Some(presented) = from_body.or_else(|| refresh_token_from_cookie(&headers)) else {
        let body = ErrorResponse {
            error: "REFRESH_TOKEN_ERROR".to_string(),
            message: "No refresh credential presented".to_string(),
            attempts_remaining: None,
            validation_id: None,
        };
        return Err((StatusCode::UNAUTHORIZED, Json(body)));
    };

    let pair = state
        .auth
        .refresh(&presented)
        .await
        .map_err(|e| error_response(e, &request_id))?;
    metrics::credentials_issued_total("refresh");

    let mut body = SessionResponse::from_pair(&pair);
    if echo_in_body {
        body.refresh_token = Some(pair.refresh_token.clone());
    }
    Ok(with_refresh_cookie(&state, &pair, body))
}

/// Request a password-reset link.
///
/// Always answers `200 OK` with the same body, whether or not the address
/// belongs to an account.
pub async fn forgot_password(
    request_id: RequestId,
    State(state): State<AppState>,
    RequestContext(context): RequestContext,
    Json(payload): Json<ForgotPasswordPayload>,
) -> ApiResult<Json<ForgotPasswordAck>> {
    state
        .auth
        .forgot_password(&payload.email, context)
        .await
        .map(Json)
        .map_err(|e| error_response(e, &request_id))
}

/// Check a password-reset link before showing the new-password form.
pub async fn reset_password_status(
    request_id: RequestId,
    State(state): State<AppState>,
    Path(validation_id): Path<String>,
) -> ApiResult<Json<ResetAuthorization>> {
    state
        .auth
        .resolve_password_reset(&validation_id)
        .await
        .map(Json)
        .map_err(|e| error_response(e, &request_id))
}

/// Set a new password through a reset link.
///
/// # Request Body
///
/// ```json
/// { "validation_id": "9f2c…", "new_password": "EvenBetter456" }
/// ```
///
/// # Response
///
/// `204 No Content`. The link is consumed.
pub async fn reset_password(
    request_id: RequestId,
    State(state): State<AppState>,
    Json(payload): Json<PasswordResetSubmit>,
) -> ApiResult<StatusCode> {
    match state.auth.reset_password(payload).await {
        Ok(()) => {
            metrics::verification_attempts_total("ok");
            Ok(StatusCode::NO_CONTENT)
        }
        Err(e) => {
            metrics::verification_attempts_total(e.code());
            Err(error_response(e, &request_id))
        }
    }
}

/// Identity of the caller, from their access credential.
pub async fn me(user: AuthenticatedUser) -> Json<AuthenticatedUser> {
    Json(user)
}

#[cfg(test)]
mod tests {
    use super::*;
    use passgate::credentials::CredentialError;

    #[test]
    fn test_status_mapping() {
        assert_eq!(status_for(&AuthError::NotFound), StatusCode::NOT_FOUND);
        assert_eq!(status_for(&AuthError::Expired), StatusCode::GONE);
        assert_eq!(status_for(&AuthError::AlreadyUsed), StatusCode::CONFLICT);
        assert_eq!(status_for(&AuthError::StillActive), StatusCode::CONFLICT);
        assert_eq!(status_for(&AuthError::MaxAttemptsExceeded), StatusCode::FORBIDDEN);
        assert_eq!(
            status_for(&AuthError::InvalidToken {
                attempts_remaining: 1
            }),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(status_for(&AuthError::InvalidCredentials), StatusCode::UNAUTHORIZED);
        assert_eq!(
            status_for(&AuthError::Credential(CredentialError::WrongKind)),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            status_for(&AuthError::Store("bad row".to_string())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_error_body_carries_attempts_and_validation_id() {
        let request_id = RequestId("req".to_string());

        let (_, Json(body)) = error_response(
            AuthError::InvalidToken {
                attempts_remaining: 3,
            },
            &request_id,
        );
        assert_eq!(body.error, "INVALID_TOKEN");
        assert_eq!(body.attempts_remaining, Some(3));

        let (status, Json(body)) = error_response(
            AuthError::MailDelivery {
                validation_id: "abc".to_string(),
                reason: "connection refused".to_string(),
            },
            &request_id,
        );
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body.validation_id.as_deref(), Some("abc"));
        assert!(!body.message.contains("refused"));
    }

    #[test]
    fn test_refresh_cookie_parsing() {
        let mut headers = HeaderMap::new();
        headers.insert(
            COOKIE,
            HeaderValue::from_static("theme=dark; refresh_token=abc.def.ghi; other=1"),
        );
        assert_eq!(refresh_token_from_cookie(&headers).as_deref(), Some("abc.def.ghi"));

        headers.insert(COOKIE, HeaderValue::from_static("refresh_token="));
        assert_eq!(refresh_token_from_cookie(&headers), None);
    }
}
