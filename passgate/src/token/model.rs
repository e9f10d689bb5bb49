//! Validation token value types.

use super::kind::TokenKind;
use super::secret::{generate_secret, generate_validation_id};
use crate::context::ClientContext;
use crate::users::UserId;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;

/// Snapshot of a persisted validation token.
///
/// This is a plain value: reading it never touches storage, and every
/// mutation goes through [`TokenStore`](crate::store::TokenStore).
#[derive(Clone, PartialEq, Eq)]
pub struct ValidationToken {
    pub id: i64,
    pub validation_id: String,
    pub secret: String,
    pub kind: TokenKind,
    pub user_id: UserId,
    pub email: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub used_at: Option<DateTime<Utc>>,
    pub attempts: i32,
    pub max_attempts: i32,
    pub context: ClientContext,
}

/// Observable state of a token at a given instant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenState {
    Active,
    Locked,
    Expired,
    Used,
}

impl TokenState {
    /// Locked, expired and used tokens can never succeed again
    pub fn is_terminal(self) -> bool {
        self != TokenState::Active
    }
}

impl ValidationToken {
    /// `now` is past the expiry instant
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    pub fn is_used(&self) -> bool {
        self.used_at.is_some()
    }

    /// The attempt budget is exhausted
    pub fn is_locked(&self) -> bool {
        self.attempts >= self.max_attempts
    }

    /// Another secret may be checked against this token
    pub fn can_attempt(&self, now: DateTime<Utc>) -> bool {
        !self.is_locked() && !self.is_expired(now) && !self.is_used()
    }

    /// State as seen by a caller, with expiry taking precedence
    pub fn state(&self, now: DateTime<Utc>) -> TokenState {
        if self.is_expired(now) {
            TokenState::Expired
        } else if self.is_used() {
            TokenState::Used
        } else if self.is_locked() {
            TokenState::Locked
        } else {
            TokenState::Active
        }
    }
}

impl fmt::Debug for ValidationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValidationToken")
            .field("id", &self.id)
            .field("validation_id", &"<redacted>")
            .field("secret", &"<redacted>")
            .field("kind", &self.kind)
            .field("user_id", &self.user_id)
            .field("created_at", &self.created_at)
            .field("expires_at", &self.expires_at)
            .field("used_at", &self.used_at)
            .field("attempts", &self.attempts)
            .field("max_attempts", &self.max_attempts)
            .finish_non_exhaustive()
    }
}

/// A token about to be inserted
#[derive(Clone)]
pub struct NewToken {
    pub validation_id: String,
    pub secret: String,
    pub kind: TokenKind,
    pub user_id: UserId,
    pub email: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub max_attempts: i32,
    pub context: ClientContext,
}

impl NewToken {
    /// Mint a fresh token, applying the kind's policy
    ///
    /// # Arguments
    ///
    /// * `user_id` - Owner of the token
    /// * `email` - Address the token is delivered to
    /// * `kind` - Purpose of the token
    /// * `context` - Client metadata of the creating request
    /// * `now` - Creation instant
    pub fn generate(
        user_id: UserId,
        email: &str,
        kind: TokenKind,
        context: ClientContext,
        now: DateTime<Utc>,
    ) -> Self {
        let policy = kind.policy();
        Self {
            validation_id: generate_validation_id(),
            secret: generate_secret(policy.secret),
            kind,
            user_id,
            email: email.to_string(),
            created_at: now,
            expires_at: now + policy.ttl,
            max_attempts: policy.max_attempts,
            context,
        }
    }

    /// The row as it looks once stored under `id`
    pub fn into_token(self, id: i64) -> ValidationToken {
        ValidationToken {
            id,
            validation_id: self.validation_id,
            secret: self.secret,
            kind: self.kind,
            user_id: self.user_id,
            email: self.email,
            created_at: self.created_at,
            expires_at: self.expires_at,
            used_at: None,
            attempts: 0,
            max_attempts: self.max_attempts,
            context: self.context,
        }
    }
}

impl fmt::Debug for NewToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NewToken")
            .field("kind", &self.kind)
            .field("user_id", &self.user_id)
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use uuid::Uuid;

    fn token(kind: TokenKind, now: DateTime<Utc>) -> ValidationToken {
        NewToken::generate(Uuid::new_v4(), "a@example.com", kind, ClientContext::default(), now)
            .into_token(1)
    }

    #[test]
    fn test_generate_applies_policy() {
        let now = Utc::now();
        let t = token(TokenKind::PasswordReset, now);
        assert_eq!(t.expires_at, now + Duration::hours(1));
        assert_eq!(t.max_attempts, 3);
        assert_eq!(t.attempts, 0);
        assert_eq!(t.secret.len(), 64);
        assert_eq!(t.state(now), TokenState::Active);
    }

    #[test]
    fn test_state_precedence() {
        let now = Utc::now();
        let mut t = token(TokenKind::LoginVerification, now);

        t.attempts = t.max_attempts;
        assert_eq!(t.state(now), TokenState::Locked);
        assert!(!t.can_attempt(now));

        t.used_at = Some(now);
        assert_eq!(t.state(now), TokenState::Used);

        let later = now + Duration::minutes(16);
        assert_eq!(t.state(later), TokenState::Expired);
        assert!(t.state(later).is_terminal());
    }

    #[test]
    fn test_expiry_boundary_is_exclusive() {
        let now = Utc::now();
        let t = token(TokenKind::TwoFactor, now);
        assert!(!t.is_expired(t.expires_at));
        assert!(t.is_expired(t.expires_at + Duration::milliseconds(1)));
    }

    #[test]
    fn test_debug_redacts_secret() {
        let t = token(TokenKind::AccountRecovery, Utc::now());
        let rendered = format!("{t:?}");
        assert!(!rendered.contains(&t.secret));
        assert!(!rendered.contains(&t.validation_id));
    }
}
