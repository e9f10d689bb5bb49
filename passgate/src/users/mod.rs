//! User collaborator: the account records the token flows act on.
//!
//! The core only ever creates an account at registration, replaces its
//! password hash, and flips the email-verified flag.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::auth::AuthResult;

pub mod memory;
pub mod postgres;

pub use memory::InMemoryUserStore;
pub use postgres::PgUserStore;

/// User ID type
pub type UserId = uuid::Uuid;

/// User model
#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: UserId,
    pub email: String,
    pub display_name: String,
    #[serde(skip)]
    pub password_hash: String,
    pub email_verified: bool,
    pub created_at: DateTime<Utc>,
}

/// Account about to be created
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub display_name: String,
    pub password_hash: String,
}

/// Trait for user repository operations
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Create a new user; `AuthError::EmailTaken` if the address exists
    async fn create_user(&self, user: NewUser) -> AuthResult<User>;

    /// Find user by (normalized) email
    async fn find_by_email(&self, email: &str) -> AuthResult<Option<User>>;

    /// Find user by ID
    async fn find_by_id(&self, user_id: UserId) -> AuthResult<Option<User>>;

    /// Replace the password hash; `false` when the user does not exist
    async fn update_password_hash(&self, user_id: UserId, hash: &str) -> AuthResult<bool>;

    /// Mark the email as verified; `false` when the user does not exist
    async fn set_email_verified(&self, user_id: UserId) -> AuthResult<bool>;
}
