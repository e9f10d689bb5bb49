//! Shared fixtures: an [`AuthManager`] over in-memory stores, a manual
//! clock and a recording mailer.

#![allow(dead_code)]

use argon2::Params;
use async_trait::async_trait;
use passgate::auth::{
    AuthBackends, AuthError, AuthManager, AuthResult, AuthSettings, LoginRequest,
    PasswordHasher, RegisterRequest,
};
use passgate::clock::ManualClock;
use passgate::context::ClientContext;
use passgate::credentials::{CredentialConfig, CredentialIssuer};
use passgate::mail::RecordingMailer;
use passgate::store::{InMemoryTokenStore, TokenStore};
use passgate::token::ValidationToken;
use passgate::users::{InMemoryUserStore, NewUser, User, UserId, UserStore};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

pub const PASSWORD: &str = "SecurePass123";
pub const BASE_URL: &str = "https://auth.example.com";

pub struct Harness {
    pub auth: AuthManager,
    pub clock: ManualClock,
    pub tokens: Arc<InMemoryTokenStore>,
    pub users: Arc<InMemoryUserStore>,
    pub writes: Arc<ControlledUserStore>,
    pub mailer: RecordingMailer,
    pub issuer: CredentialIssuer,
}

impl Harness {
    pub fn new() -> Self {
        let clock = ManualClock::starting_now();
        let tokens = Arc::new(InMemoryTokenStore::new());
        let users = Arc::new(InMemoryUserStore::new());
        let writes = Arc::new(ControlledUserStore::new(users.clone()));
        let mailer = RecordingMailer::new();

        let issuer = CredentialIssuer::new(
            CredentialConfig::new("access-secret-".repeat(3), "refresh-secret-".repeat(3)),
            Arc::new(clock.clone()),
        );
        // Cheap parameters keep the suite fast; production uses the defaults.
        let hasher = PasswordHasher::with_params(
            "test-pepper-value".to_string(),
            Params::new(8, 1, 1, None).expect("valid argon2 params"),
        )
        .expect("hasher");

        let auth = AuthManager::new(
            AuthBackends {
                tokens: tokens.clone(),
                users: writes.clone(),
                mailer: Arc::new(mailer.clone()),
                clock: Arc::new(clock.clone()),
            },
            issuer.clone(),
            hasher,
            AuthSettings {
                public_base_url: BASE_URL.to_string(),
                mail_timeout: Duration::from_secs(2),
            },
        );

        Self {
            auth,
            clock,
            tokens,
            users,
            writes,
            mailer,
            issuer,
        }
    }

    /// Register `email` and return the user id together with the pending
    /// verification token
    pub async fn register(&self, email: &str) -> (UserId, ValidationToken) {
        let issued = self
            .auth
            .register(
                RegisterRequest {
                    email: email.to_string(),
                    password: PASSWORD.to_string(),
                    display_name: "Ada Lovelace".to_string(),
                },
                ClientContext::default(),
            )
            .await
            .expect("registration succeeds");
        let token = self.token(&issued.validation_id).await;
        (token.user_id, token)
    }

    /// Start a login for `email` with the fixture password
    pub async fn login(&self, email: &str, context: ClientContext) -> ValidationToken {
        let issued = self
            .auth
            .login(
                LoginRequest {
                    email: email.to_string(),
                    password: PASSWORD.to_string(),
                },
                context,
            )
            .await
            .expect("login succeeds");
        self.token(&issued.validation_id).await
    }

    pub async fn token(&self, validation_id: &str) -> ValidationToken {
        self.tokens
            .find_by_validation_id(validation_id)
            .await
            .expect("store read")
            .expect("token exists")
    }
}

/// User store whose password writes can be slowed down or refused
pub struct ControlledUserStore {
    inner: Arc<InMemoryUserStore>,
    write_delay_ms: AtomicU64,
    refuse_writes: AtomicBool,
}

impl ControlledUserStore {
    pub fn new(inner: Arc<InMemoryUserStore>) -> Self {
        Self {
            inner,
            write_delay_ms: AtomicU64::new(0),
            refuse_writes: AtomicBool::new(false),
        }
    }

    /// Hold every password write for `delay` before applying it
    pub fn delay_password_writes(&self, delay: Duration) {
        self.write_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn refuse_password_writes(&self, refuse: bool) {
        self.refuse_writes.store(refuse, Ordering::SeqCst);
    }
}

#[async_trait]
impl UserStore for ControlledUserStore {
    async fn create_user(&self, user: NewUser) -> AuthResult<User> {
        self.inner.create_user(user).await
    }

    async fn find_by_email(&self, email: &str) -> AuthResult<Option<User>> {
        self.inner.find_by_email(email).await
    }

    async fn find_by_id(&self, user_id: UserId) -> AuthResult<Option<User>> {
        self.inner.find_by_id(user_id).await
    }

    async fn update_password_hash(&self, user_id: UserId, hash: &str) -> AuthResult<bool> {
        if self.refuse_writes.load(Ordering::SeqCst) {
            return Err(AuthError::Store("password write refused".to_string()));
        }
        let delay = self.write_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        self.inner.update_password_hash(user_id, hash).await
    }

    async fn set_email_verified(&self, user_id: UserId) -> AuthResult<bool> {
        self.inner.set_email_verified(user_id).await
    }
}

/// Context with recognisable values that must never show up in mail
pub fn revealing_context() -> ClientContext {
    ClientContext {
        ip: Some("198.51.100.23".to_string()),
        country: Some("PT".to_string()),
        browser: Some("Firefox".to_string()),
        os: Some("Linux".to_string()),
        device: Some("Desktop".to_string()),
    }
}
