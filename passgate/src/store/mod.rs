//! Persistence for validation tokens.
//!
//! Every mutation is a single atomic compare-and-update. Callers never read
//! a token, decide, and write it back: the condition travels with the
//! write, so concurrent requests cannot push a token past its attempt
//! ceiling or consume it twice.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use crate::auth::AuthResult;
use crate::token::{NewToken, TokenKind, ValidationToken};
use crate::users::UserId;

pub mod memory;
pub mod postgres;

pub use memory::InMemoryTokenStore;
pub use postgres::PgTokenStore;

/// How long a used token is kept after it expires
pub const USED_TOKEN_RETENTION_DAYS: i64 = 30;

/// Expiry before which used tokens are purged, relative to `now`
pub fn used_token_cutoff(now: DateTime<Utc>) -> DateTime<Utc> {
    now - Duration::days(USED_TOKEN_RETENTION_DAYS)
}

/// Trait for validation token repository operations
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Insert a token; `AuthError::TokenCollision` when its validation id or
    /// secret is already taken
    async fn insert(&self, token: NewToken) -> AuthResult<ValidationToken>;

    /// Find a token by its public validation id
    async fn find_by_validation_id(&self, validation_id: &str)
    -> AuthResult<Option<ValidationToken>>;

    /// Most recently created token of `kind` owned by `user_id`
    async fn find_latest_for_user(
        &self,
        user_id: UserId,
        kind: TokenKind,
    ) -> AuthResult<Option<ValidationToken>>;

    /// Consume one attempt if the token is unused, unexpired and under its
    /// ceiling. Returns the updated token, or `None` when the condition did
    /// not hold (or the token does not exist).
    async fn try_record_attempt(
        &self,
        validation_id: &str,
        now: DateTime<Utc>,
    ) -> AuthResult<Option<ValidationToken>>;

    /// Set `used_at` if the token is unused and unexpired. Returns the
    /// updated token, or `None` when someone else got there first.
    async fn try_mark_used(
        &self,
        validation_id: &str,
        now: DateTime<Utc>,
    ) -> AuthResult<Option<ValidationToken>>;

    /// Undo a `try_mark_used` whose follow-up write failed. Only clears
    /// `used_at` if it still holds the claim's timestamp.
    async fn release_claim(&self, validation_id: &str, used_at: DateTime<Utc>) -> AuthResult<bool>;

    /// Delete one token; `false` if it did not exist
    async fn delete(&self, validation_id: &str) -> AuthResult<bool>;

    /// Delete every unused token of `kind` owned by `user_id`
    async fn delete_unused_for_user(&self, user_id: UserId, kind: TokenKind) -> AuthResult<u64>;

    /// Delete expired tokens that were never used, and used tokens that
    /// expired more than [`USED_TOKEN_RETENTION_DAYS`] ago
    async fn purge_expired(&self, now: DateTime<Utc>) -> AuthResult<u64>;

    /// Check that the backing storage is reachable
    async fn health_check(&self) -> AuthResult<()> {
        Ok(())
    }
}
