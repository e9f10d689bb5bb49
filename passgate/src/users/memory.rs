//! In-process [`UserStore`] for development servers and tests.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use uuid::Uuid;

use super::{NewUser, User, UserId, UserStore};
use crate::auth::{AuthError, AuthResult};

/// User store backed by a mutex-guarded map
#[derive(Default)]
pub struct InMemoryUserStore {
    users: Mutex<HashMap<UserId, User>>,
}

impl InMemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop a user, simulating an account deleted mid-flow
    pub fn remove(&self, user_id: UserId) -> Option<User> {
        self.lock().remove(&user_id)
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<UserId, User>> {
        self.users.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl UserStore for InMemoryUserStore {
    async fn create_user(&self, user: NewUser) -> AuthResult<User> {
        let mut users = self.lock();
        if users.values().any(|u| u.email == user.email) {
            return Err(AuthError::EmailTaken);
        }

        let created = User {
            id: Uuid::new_v4(),
            email: user.email,
            display_name: user.display_name,
            password_hash: user.password_hash,
            email_verified: false,
            created_at: Utc::now(),
        };
        users.insert(created.id, created.clone());
        Ok(created)
    }

    async fn find_by_email(&self, email: &str) -> AuthResult<Option<User>> {
        Ok(self.lock().values().find(|u| u.email == email).cloned())
    }

    async fn find_by_id(&self, user_id: UserId) -> AuthResult<Option<User>> {
        Ok(self.lock().get(&user_id).cloned())
    }

    async fn update_password_hash(&self, user_id: UserId, hash: &str) -> AuthResult<bool> {
        Ok(match self.lock().get_mut(&user_id) {
            Some(user) => {
                user.password_hash = hash.to_string();
                true
            }
            None => false,
        })
    }

    async fn set_email_verified(&self, user_id: UserId) -> AuthResult<bool> {
        Ok(match self.lock().get_mut(&user_id) {
            Some(user) => {
                user.email_verified = true;
                true
            }
            None => false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_user(email: &str) -> NewUser {
        NewUser {
            email: email.to_string(),
            display_name: "Test User".to_string(),
            password_hash: "hash".to_string(),
        }
    }

    #[tokio::test]
    async fn test_create_and_find_user() {
        let store = InMemoryUserStore::new();
        let user = store.create_user(new_user("a@example.com")).await.unwrap();

        let by_email = store.find_by_email("a@example.com").await.unwrap().unwrap();
        assert_eq!(by_email.id, user.id);
        assert!(!by_email.email_verified);

        let by_id = store.find_by_id(user.id).await.unwrap();
        assert!(by_id.is_some());
        assert!(store.find_by_id(Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_email_rejected() {
        let store = InMemoryUserStore::new();
        store.create_user(new_user("a@example.com")).await.unwrap();
        let result = store.create_user(new_user("a@example.com")).await;
        assert!(matches!(result, Err(AuthError::EmailTaken)));
    }

    #[tokio::test]
    async fn test_updates_report_missing_user() {
        let store = InMemoryUserStore::new();
        let user = store.create_user(new_user("a@example.com")).await.unwrap();

        assert!(store.set_email_verified(user.id).await.unwrap());
        assert!(store.update_password_hash(user.id, "new").await.unwrap());
        let reloaded = store.find_by_id(user.id).await.unwrap().unwrap();
        assert!(reloaded.email_verified);
        assert_eq!(reloaded.password_hash, "new");

        store.remove(user.id);
        assert!(!store.set_email_verified(user.id).await.unwrap());
        assert!(!store.update_password_hash(user.id, "x").await.unwrap());
    }
}
