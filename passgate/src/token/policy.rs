//! Stateless decisions over token snapshots.
//!
//! Nothing here touches storage. The orchestrator loads a snapshot, asks
//! these functions what is allowed, and performs the corresponding atomic
//! store operation itself.

use super::kind::TokenKind;
use super::model::{TokenState, ValidationToken};
use super::secret::secrets_match;
use crate::auth::{AuthError, AuthResult};
use chrono::{DateTime, Utc};

/// Reject tokens minted for a different purpose
pub fn require_kind(token: &ValidationToken, expected: TokenKind) -> AuthResult<()> {
    if token.kind == expected {
        Ok(())
    } else {
        Err(AuthError::InvalidType)
    }
}

/// Gate for a code submission, checked before any attempt is recorded.
///
/// Expiry comes first so guesses against a dead token cost nothing.
pub fn check_attempt(token: &ValidationToken, now: DateTime<Utc>) -> AuthResult<()> {
    if token.is_expired(now) {
        return Err(AuthError::Expired);
    }
    if token.is_used() {
        return Err(AuthError::AlreadyUsed);
    }
    if !token.can_attempt(now) {
        return Err(AuthError::MaxAttemptsExceeded);
    }
    Ok(())
}

/// Gate for a magic link. Links carry no guessable secret, so the attempt
/// counter is not consulted.
pub fn check_link(token: &ValidationToken, now: DateTime<Utc>) -> AuthResult<()> {
    if token.is_expired(now) {
        return Err(AuthError::Expired);
    }
    if token.is_used() {
        return Err(AuthError::AlreadyUsed);
    }
    Ok(())
}

/// Judge a presented secret against a token whose attempt was just recorded.
///
/// On mismatch, `attempts_remaining` counts the wrong guesses the token
/// still tolerates before it locks; the guess that reaches the ceiling
/// reports [`AuthError::MaxAttemptsExceeded`].
pub fn judge_attempt(attempted: &ValidationToken, presented: &str) -> AuthResult<()> {
    if secrets_match(presented, &attempted.secret) {
        return Ok(());
    }
    if attempted.is_locked() {
        return Err(AuthError::MaxAttemptsExceeded);
    }
    Err(AuthError::InvalidToken {
        attempts_remaining: attempted.max_attempts - attempted.attempts - 1,
    })
}

/// Explain why an atomic store update refused to touch a token
pub fn rejection(token: &ValidationToken, now: DateTime<Utc>) -> AuthError {
    match token.state(now) {
        TokenState::Expired => AuthError::Expired,
        TokenState::Used => AuthError::AlreadyUsed,
        TokenState::Locked | TokenState::Active => AuthError::MaxAttemptsExceeded,
    }
}

/// Decide whether a token may be regenerated.
///
/// Only an expired, unused token is replaced. Regenerating a locked token
/// before it expires would hand out a fresh attempt budget, and an active
/// one is still in the user's mailbox.
pub fn check_regeneration(token: &ValidationToken, now: DateTime<Utc>) -> AuthResult<()> {
    if token.is_used() {
        return Err(AuthError::AlreadyUsed);
    }
    if token.is_expired(now) {
        return Ok(());
    }
    if token.is_locked() {
        return Err(AuthError::MaxAttemptsExceeded);
    }
    Err(AuthError::StillActive)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ClientContext;
    use crate::token::NewToken;
    use chrono::Duration;
    use uuid::Uuid;

    fn token(kind: TokenKind, now: DateTime<Utc>) -> ValidationToken {
        NewToken::generate(Uuid::new_v4(), "a@example.com", kind, ClientContext::default(), now)
            .into_token(1)
    }

    #[test]
    fn test_check_attempt_order() {
        let now = Utc::now();
        let mut t = token(TokenKind::LoginVerification, now);
        assert!(check_attempt(&t, now).is_ok());

        t.attempts = t.max_attempts;
        assert!(matches!(check_attempt(&t, now), Err(AuthError::MaxAttemptsExceeded)));

        t.used_at = Some(now);
        assert!(matches!(check_attempt(&t, now), Err(AuthError::AlreadyUsed)));

        let later = now + Duration::minutes(20);
        assert!(matches!(check_attempt(&t, later), Err(AuthError::Expired)));
    }

    #[test]
    fn test_check_link_ignores_attempts() {
        let now = Utc::now();
        let mut t = token(TokenKind::LoginVerification, now);
        t.attempts = t.max_attempts;
        assert!(check_link(&t, now).is_ok());
    }

    #[test]
    fn test_judge_attempt_counts_down_then_locks() {
        let now = Utc::now();
        let mut t = token(TokenKind::LoginVerification, now);
        let mut remaining = Vec::new();

        for attempt in 1..=5 {
            t.attempts = attempt;
            match judge_attempt(&t, "not-the-code") {
                Err(AuthError::InvalidToken { attempts_remaining }) => {
                    remaining.push(attempts_remaining)
                }
                Err(AuthError::MaxAttemptsExceeded) => assert_eq!(attempt, 5),
                other => panic!("unexpected verdict {other:?}"),
            }
        }

        assert_eq!(remaining, vec![3, 2, 1, 0]);
    }

    #[test]
    fn test_judge_attempt_accepts_match() {
        let now = Utc::now();
        let mut t = token(TokenKind::TwoFactor, now);
        t.attempts = 1;
        let secret = t.secret.clone();
        assert!(judge_attempt(&t, &secret).is_ok());
    }

    #[test]
    fn test_require_kind() {
        let t = token(TokenKind::PasswordReset, Utc::now());
        assert!(require_kind(&t, TokenKind::PasswordReset).is_ok());
        assert!(matches!(
            require_kind(&t, TokenKind::LoginVerification),
            Err(AuthError::InvalidType)
        ));
    }

    #[test]
    fn test_regeneration_rules() {
        let now = Utc::now();
        let mut t = token(TokenKind::EmailVerification, now);
        assert!(matches!(check_regeneration(&t, now), Err(AuthError::StillActive)));

        let expired = now + Duration::hours(25);
        assert!(check_regeneration(&t, expired).is_ok());

        t.attempts = t.max_attempts;
        assert!(matches!(
            check_regeneration(&t, now),
            Err(AuthError::MaxAttemptsExceeded)
        ));
        assert!(check_regeneration(&t, expired).is_ok());

        t.used_at = Some(now);
        assert!(matches!(check_regeneration(&t, expired), Err(AuthError::AlreadyUsed)));
    }

    #[test]
    fn test_rejection_reason() {
        let now = Utc::now();
        let mut t = token(TokenKind::TwoFactor, now);
        t.attempts = t.max_attempts;
        assert!(matches!(rejection(&t, now), AuthError::MaxAttemptsExceeded));
        t.used_at = Some(now);
        assert!(matches!(rejection(&t, now), AuthError::AlreadyUsed));
        assert!(matches!(rejection(&t, now + Duration::hours(1)), AuthError::Expired));
    }
}
