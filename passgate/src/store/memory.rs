//! In-process [`TokenStore`] for development servers and tests.
//!
//! Each operation holds the map lock for its whole check-and-update, which
//! gives the same atomicity the SQL implementation gets from single-statement
//! updates.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::{TokenStore, used_token_cutoff};
use crate::auth::{AuthError, AuthResult};
use crate::token::{NewToken, TokenKind, ValidationToken};
use crate::users::UserId;

#[derive(Default)]
struct Tokens {
    by_validation_id: HashMap<String, ValidationToken>,
    next_id: i64,
}

/// Token store backed by a mutex-guarded map
#[derive(Default)]
pub struct InMemoryTokenStore {
    tokens: Mutex<Tokens>,
}

impl InMemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored tokens, used or not
    pub fn len(&self) -> usize {
        self.lock().by_validation_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, Tokens> {
        self.tokens.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl TokenStore for InMemoryTokenStore {
    async fn insert(&self, token: NewToken) -> AuthResult<ValidationToken> {
        let mut tokens = self.lock();
        let taken = tokens.by_validation_id.contains_key(&token.validation_id)
            || tokens
                .by_validation_id
                .values()
                .any(|t| !t.is_used() && t.secret == token.secret);
        if taken {
            return Err(AuthError::TokenCollision);
        }

        tokens.next_id += 1;
        let stored = token.into_token(tokens.next_id);
        tokens
            .by_validation_id
            .insert(stored.validation_id.clone(), stored.clone());
        Ok(stored)
    }

    async fn find_by_validation_id(
        &self,
        validation_id: &str,
    ) -> AuthResult<Option<ValidationToken>> {
        Ok(self.lock().by_validation_id.get(validation_id).cloned())
    }

    async fn find_latest_for_user(
        &self,
        user_id: UserId,
        kind: TokenKind,
    ) -> AuthResult<Option<ValidationToken>> {
        Ok(self
            .lock()
            .by_validation_id
            .values()
            .filter(|t| t.user_id == user_id && t.kind == kind)
            .max_by_key(|t| (t.created_at, t.id))
            .cloned())
    }

    async fn try_record_attempt(
        &self,
        validation_id: &str,
        now: DateTime<Utc>,
    ) -> AuthResult<Option<ValidationToken>> {
        let mut tokens = self.lock();
        Ok(match tokens.by_validation_id.get_mut(validation_id) {
            Some(token) if token.can_attempt(now) => {
                token.attempts += 1;
                Some(token.clone())
            }
            _ => None,
        })
    }

    async fn try_mark_used(
        &self,
        validation_id: &str,
        now: DateTime<Utc>,
    ) -> AuthResult<Option<ValidationToken>> {
        let mut tokens = self.lock();
        Ok(match tokens.by_validation_id.get_mut(validation_id) {
            Some(token) if !token.is_used() && !token.is_expired(now) => {
                token.used_at = Some(now);
                Some(token.clone())
            }
            _ => None,
        })
    }

    async fn release_claim(&self, validation_id: &str, used_at: DateTime<Utc>) -> AuthResult<bool> {
        let mut tokens = self.lock();
        Ok(match tokens.by_validation_id.get_mut(validation_id) {
            Some(token) if token.used_at == Some(used_at) => {
                token.used_at = None;
                true
            }
            _ => false,
        })
    }

    async fn delete(&self, validation_id: &str) -> AuthResult<bool> {
        Ok(self.lock().by_validation_id.remove(validation_id).is_some())
    }

    async fn delete_unused_for_user(&self, user_id: UserId, kind: TokenKind) -> AuthResult<u64> {
        let mut tokens = self.lock();
        let before = tokens.by_validation_id.len();
        tokens
            .by_validation_id
            .retain(|_, t| !(t.user_id == user_id && t.kind == kind && !t.is_used()));
        Ok((before - tokens.by_validation_id.len()) as u64)
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> AuthResult<u64> {
        let cutoff = used_token_cutoff(now);
        let mut tokens = self.lock();
        let before = tokens.by_validation_id.len();
        tokens.by_validation_id.retain(|_, t| {
            if t.is_used() {
                !t.is_expired(cutoff)
            } else {
                !t.is_expired(now)
            }
        });
        Ok((before - tokens.by_validation_id.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ClientContext;
    use crate::store::USED_TOKEN_RETENTION_DAYS;
    use chrono::Duration;
    use std::sync::Arc;
    use uuid::Uuid;

    fn new_token(user_id: UserId, kind: TokenKind, now: DateTime<Utc>) -> NewToken {
        NewToken::generate(user_id, "a@example.com", kind, ClientContext::default(), now)
    }

    #[tokio::test]
    async fn test_insert_rejects_duplicate_secret() {
        let store = InMemoryTokenStore::new();
        let now = Utc::now();
        let first = new_token(Uuid::new_v4(), TokenKind::TwoFactor, now);
        let mut second = new_token(Uuid::new_v4(), TokenKind::TwoFactor, now);
        second.secret = first.secret.clone();

        store.insert(first).await.unwrap();
        assert!(matches!(store.insert(second).await, Err(AuthError::TokenCollision)));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_record_attempt_stops_at_ceiling() {
        let store = InMemoryTokenStore::new();
        let now = Utc::now();
        let token = store
            .insert(new_token(Uuid::new_v4(), TokenKind::LoginVerification, now))
            .await
            .unwrap();

        for expected in 1..=5 {
            let updated = store
                .try_record_attempt(&token.validation_id, now)
                .await
                .unwrap()
                .expect("attempt within budget");
            assert_eq!(updated.attempts, expected);
        }

        assert!(store
            .try_record_attempt(&token.validation_id, now)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_mark_used_only_once() {
        let store = InMemoryTokenStore::new();
        let now = Utc::now();
        let token = store
            .insert(new_token(Uuid::new_v4(), TokenKind::PasswordReset, now))
            .await
            .unwrap();

        assert!(store.try_mark_used(&token.validation_id, now).await.unwrap().is_some());
        assert!(store.try_mark_used(&token.validation_id, now).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_mark_used_refuses_expired() {
        let store = InMemoryTokenStore::new();
        let now = Utc::now();
        let token = store
            .insert(new_token(Uuid::new_v4(), TokenKind::TwoFactor, now))
            .await
            .unwrap();

        let later = now + Duration::minutes(6);
        assert!(store.try_mark_used(&token.validation_id, later).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_concurrent_attempts_never_exceed_ceiling() {
        let store = Arc::new(InMemoryTokenStore::new());
        let now = Utc::now();
        let token = store
            .insert(new_token(Uuid::new_v4(), TokenKind::PasswordReset, now))
            .await
            .unwrap();

        let mut handles = Vec::new();
        for _ in 0..32 {
            let store = store.clone();
            let id = token.validation_id.clone();
            handles.push(tokio::spawn(async move {
                store.try_record_attempt(&id, now).await.unwrap().is_some()
            }));
        }

        let mut accepted = 0;
        for handle in handles {
            if handle.await.unwrap() {
                accepted += 1;
            }
        }

        assert_eq!(accepted, 3);
        let stored = store
            .find_by_validation_id(&token.validation_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.attempts, 3);
    }

    #[tokio::test]
    async fn test_latest_and_cleanup_for_user() {
        let store = InMemoryTokenStore::new();
        let user = Uuid::new_v4();
        let now = Utc::now();

        store
            .insert(new_token(user, TokenKind::LoginVerification, now))
            .await
            .unwrap();
        let newer = store
            .insert(new_token(user, TokenKind::LoginVerification, now + Duration::seconds(1)))
            .await
            .unwrap();
        store
            .insert(new_token(user, TokenKind::PasswordReset, now))
            .await
            .unwrap();

        let latest = store
            .find_latest_for_user(user, TokenKind::LoginVerification)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(latest.validation_id, newer.validation_id);

        let removed = store
            .delete_unused_for_user(user, TokenKind::LoginVerification)
            .await
            .unwrap();
        assert_eq!(removed, 2);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_purge_keeps_used_tokens_for_retention_window() {
        let store = InMemoryTokenStore::new();
        let now = Utc::now();
        let used = store
            .insert(new_token(Uuid::new_v4(), TokenKind::TwoFactor, now))
            .await
            .unwrap();
        store.try_mark_used(&used.validation_id, now).await.unwrap();
        store
            .insert(new_token(Uuid::new_v4(), TokenKind::TwoFactor, now))
            .await
            .unwrap();

        let purged = store.purge_expired(now + Duration::minutes(10)).await.unwrap();
        assert_eq!(purged, 1);
        assert_eq!(store.len(), 1);

        let after_retention = now + Duration::days(USED_TOKEN_RETENTION_DAYS + 1);
        assert_eq!(store.purge_expired(after_retention).await.unwrap(), 1);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_used_secret_can_be_reissued() {
        let store = InMemoryTokenStore::new();
        let now = Utc::now();
        let used = store
            .insert(new_token(Uuid::new_v4(), TokenKind::TwoFactor, now))
            .await
            .unwrap();
        store.try_mark_used(&used.validation_id, now).await.unwrap();

        let mut reuse = new_token(Uuid::new_v4(), TokenKind::TwoFactor, now);
        reuse.secret = used.secret.clone();
        assert!(store.insert(reuse).await.is_ok());
    }

    #[tokio::test]
    async fn test_release_claim_only_undoes_matching_claim() {
        let store = InMemoryTokenStore::new();
        let now = Utc::now();
        let token = store
            .insert(new_token(Uuid::new_v4(), TokenKind::PasswordReset, now))
            .await
            .unwrap();
        let claimed = store
            .try_mark_used(&token.validation_id, now)
            .await
            .unwrap()
            .expect("first claim wins");

        let other_instant = now + Duration::seconds(1);
        assert!(!store.release_claim(&token.validation_id, other_instant).await.unwrap());

        let used_at = claimed.used_at.expect("claim sets used_at");
        assert!(store.release_claim(&token.validation_id, used_at).await.unwrap());
        assert!(store.try_mark_used(&token.validation_id, now).await.unwrap().is_some());
    }
}
