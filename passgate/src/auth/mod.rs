//! Registration, login and password-reset flows built on validation tokens.
//!
//! - Argon2id password hashing with a server-side pepper
//! - Magic-link login: a password check mails a one-time link, the link
//!   yields an access / refresh credential pair
//! - Email verification by link or code
//! - Password reset that consumes its link only once the new password is stored
//!
//! ## Example
//!
//! ```no_run
//! use passgate::auth::{AuthBackends, AuthManager, AuthSettings, LoginRequest, PasswordHasher};
//! use passgate::clock::SystemClock;
//! use passgate::context::ClientContext;
//! use passgate::credentials::{CredentialConfig, CredentialIssuer};
//! use passgate::mail::LogMailer;
//! use passgate::store::InMemoryTokenStore;
//! use passgate::users::InMemoryUserStore;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let clock = Arc::new(SystemClock);
//!     let backends = AuthBackends {
//!         tokens: Arc::new(InMemoryTokenStore::new()),
//!         users: Arc::new(InMemoryUserStore::new()),
//!         mailer: Arc::new(LogMailer),
//!         clock: clock.clone(),
//!     };
//!     let issuer = CredentialIssuer::new(
//!         CredentialConfig::new("a".repeat(32), "b".repeat(32)),
//!         clock,
//!     );
//!     let auth = AuthManager::new(
//!         backends,
//!         issuer,
//!         PasswordHasher::new("server-side-pepper".to_string())?,
//!         AuthSettings::new("https://auth.example.com"),
//!     );
//!
//!     let pending = auth
//!         .login(
//!             LoginRequest {
//!                 email: "ada@example.com".to_string(),
//!                 password: "SecurePass123".to_string(),
//!             },
//!             ClientContext::default(),
//!         )
//!         .await?;
//!     println!("Login link expires at {}", pending.expires_at);
//!     Ok(())
//! }
//! ```

pub mod errors;
pub mod manager;
pub mod models;
pub mod password;

pub use errors::{AuthError, AuthResult};
pub use manager::{AuthBackends, AuthManager, AuthSettings, DEFAULT_MAIL_TIMEOUT};
pub use models::{
    ForgotPasswordAck, IssuedToken, LinkStatus, LoginRequest, LoginSession, PasswordResetSubmit,
    RegisterRequest, ResendAck, ResendTarget, ResetAuthorization, VerifiedToken,
};
pub use password::PasswordHasher;
