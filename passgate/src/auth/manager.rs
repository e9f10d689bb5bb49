//! Authentication manager implementation.

use super::{
    errors::{AuthError, AuthResult},
    models::{
        ForgotPasswordAck, IssuedToken, LinkStatus, LoginRequest, LoginSession,
        PasswordResetSubmit, RegisterRequest, ResendAck, ResetAuthorization, VerifiedToken,
    },
    password::{PasswordHasher, normalize_email, validate_email, validate_password},
};
use crate::clock::Clock;
use crate::context::ClientContext;
use crate::credentials::{AccessClaims, CredentialIssuer, CredentialPair, CredentialSubject};
use crate::mail::{MailComposer, Mailer};
use crate::store::TokenStore;
use crate::token::{NewToken, TokenKind, TokenState, ValidationToken, policy};
use crate::users::{NewUser, User, UserId, UserStore};
use std::sync::Arc;
use std::time::Duration;

/// Insert attempts before giving up on a unique validation id / secret
const MAX_MINT_ATTEMPTS: usize = 5;

/// Default bound on a single mail dispatch
pub const DEFAULT_MAIL_TIMEOUT: Duration = Duration::from_secs(10);

/// Collaborators the manager drives
#[derive(Clone)]
pub struct AuthBackends {
    pub tokens: Arc<dyn TokenStore>,
    pub users: Arc<dyn UserStore>,
    pub mailer: Arc<dyn Mailer>,
    pub clock: Arc<dyn Clock>,
}

/// Tunables that are not secrets
#[derive(Debug, Clone)]
pub struct AuthSettings {
    /// Prefix for links in outgoing mail, e.g. `https://auth.example.com`
    pub public_base_url: String,
    /// Upper bound on one `Mailer::send`
    pub mail_timeout: Duration,
}

impl AuthSettings {
    pub fn new(public_base_url: impl Into<String>) -> Self {
        Self {
            public_base_url: public_base_url.into(),
            mail_timeout: DEFAULT_MAIL_TIMEOUT,
        }
    }
}

/// Authentication manager
///
/// Owns no state of its own; every decision is made over a token snapshot
/// and every mutation is an atomic store call.
#[derive(Clone)]
pub struct AuthManager {
    tokens: Arc<dyn TokenStore>,
    users: Arc<dyn UserStore>,
    mailer: Arc<dyn Mailer>,
    clock: Arc<dyn Clock>,
    issuer: CredentialIssuer,
    hasher: Arc<PasswordHasher>,
    composer: MailComposer,
    mail_timeout: Duration,
}

impl AuthManager {
    /// Create a new authentication manager
    ///
    /// # Arguments
    ///
    /// * `backends` - Token store, user store, mailer and clock
    /// * `issuer` - Access / refresh credential issuer
    /// * `hasher` - Password hasher holding the pepper
    /// * `settings` - Link base URL and mail timeout
    pub fn new(
        backends: AuthBackends,
        issuer: CredentialIssuer,
        hasher: PasswordHasher,
        settings: AuthSettings,
    ) -> Self {
        Self {
            tokens: backends.tokens,
            users: backends.users,
            mailer: backends.mailer,
            clock: backends.clock,
            issuer,
            hasher: Arc::new(hasher),
            composer: MailComposer::new(settings.public_base_url),
            mail_timeout: settings.mail_timeout,
        }
    }

    /// Register a new user and mail an email-verification link and code
    ///
    /// # Errors
    ///
    /// * `AuthError::InvalidEmail` - Email format invalid
    /// * `AuthError::WeakPassword` - Password too weak
    /// * `AuthError::EmailTaken` - Email already registered
    /// * `AuthError::MailDelivery` - Account and token exist, mail did not go out
    pub async fn register(
        &self,
        request: RegisterRequest,
        context: ClientContext,
    ) -> AuthResult<IssuedToken> {
        let email = normalize_email(&request.email);
        validate_email(&email)?;
        validate_password(&request.password)?;

        if self.users.find_by_email(&email).await?.is_some() {
            return Err(AuthError::EmailTaken);
        }

        let display_name = match request.display_name.trim() {
            "" => email.split('@').next().unwrap_or_default().to_string(),
            name => name.to_string(),
        };

        let password_hash = self.hasher.hash(&request.password)?;
        let user = self
            .users
            .create_user(NewUser {
                email,
                display_name,
                password_hash,
            })
            .await?;
        log::info!("Registered user {}", user.id);

        let token = self
            .mint(user.id, &user.email, TokenKind::EmailVerification, context)
            .await?;
        self.dispatch(&token).await?;

        Ok(IssuedToken::from(&token))
    }

    /// Describe a link without consuming it
    pub async fn link_status(&self, validation_id: &str) -> AuthResult<LinkStatus> {
        let token = self.load(validation_id).await?;
        policy::check_link(&token, self.clock.now())?;

        Ok(LinkStatus {
            email: token.email,
            kind: token.kind,
            expires_at: token.expires_at,
        })
    }

    /// Check a typed code against a token and consume the token on a match.
    ///
    /// Every guess, right or wrong, is recorded before the comparison.
    ///
    /// # Errors
    ///
    /// * `AuthError::NotFound` - No token with this validation id
    /// * `AuthError::InvalidType` - The token is link-only
    /// * `AuthError::Expired` / `AlreadyUsed` / `MaxAttemptsExceeded` - Terminal token
    /// * `AuthError::InvalidToken` - Wrong code, attempts remain
    pub async fn verify(&self, validation_id: &str, secret: &str) -> AuthResult<VerifiedToken> {
        let now = self.clock.now();
        let token = self.load(validation_id).await?;
        if !token.kind.accepts_code() {
            return Err(AuthError::InvalidType);
        }
        policy::check_attempt(&token, now)?;

        let attempted = match self.tokens.try_record_attempt(validation_id, now).await? {
            Some(attempted) => attempted,
            None => return Err(self.explain_refusal(validation_id).await),
        };

        if let Err(err) = policy::judge_attempt(&attempted, secret) {
            if matches!(err, AuthError::MaxAttemptsExceeded) {
                log::warn!(
                    "{} token of user {} locked after {} attempts",
                    attempted.kind,
                    attempted.user_id,
                    attempted.attempts
                );
            }
            return Err(err);
        }

        let used = self.consume(validation_id).await?;
        log::info!("{} token of user {} verified", used.kind, used.user_id);

        Ok(VerifiedToken {
            user_id: used.user_id,
            email: used.email,
            kind: used.kind,
        })
    }

    /// Submit a mailed code and apply its effect.
    ///
    /// Email verification flips the account flag; other kinds are only
    /// consumed. Kinds whose mail never carries the code are refused before
    /// any attempt is recorded, so a login token can only be completed
    /// through its link.
    pub async fn submit_code(
        &self,
        validation_id: &str,
        secret: &str,
    ) -> AuthResult<VerifiedToken> {
        let token = self.load(validation_id).await?;
        if !token.kind.mail_includes_code() {
            return Err(AuthError::InvalidType);
        }

        let verified = self.verify(validation_id, secret).await?;
        if verified.kind == TokenKind::EmailVerification
            && !self.users.set_email_verified(verified.user_id).await?
        {
            return Err(AuthError::UserNotFound);
        }

        Ok(verified)
    }

    /// Regenerate a token the caller already holds the validation id of.
    ///
    /// Only an expired, unused token is replaced; the new token is mailed
    /// and its id returned.
    ///
    /// # Errors
    ///
    /// * `AuthError::NotFound` - No token with this validation id
    /// * `AuthError::StillActive` - The token can still be used
    /// * `AuthError::MaxAttemptsExceeded` - Locked and not yet expired
    /// * `AuthError::AlreadyUsed` - Token was consumed
    pub async fn resend(
        &self,
        validation_id: &str,
        context: ClientContext,
    ) -> AuthResult<IssuedToken> {
        let prior = self.load(validation_id).await?;
        policy::check_regeneration(&prior, self.clock.now())?;

        let token = self.replace(&prior, context).await?;
        self.dispatch(&token).await?;
        Ok(IssuedToken::from(&token))
    }

    /// Regenerate the latest token of `kind` for an address.
    ///
    /// Answers the same acknowledgement whatever happened: unknown address,
    /// no token, a token that may not be regenerated, or a failed mail. The
    /// new validation id only ever travels in the mail. Login links are
    /// never renewed this way; a new one needs the password.
    pub async fn resend_to_email(
        &self,
        email: &str,
        kind: TokenKind,
        context: ClientContext,
    ) -> AuthResult<ResendAck> {
        if kind == TokenKind::LoginVerification {
            log::debug!("Resend by address refused for login tokens");
            return Ok(ResendAck::default());
        }

        let email = normalize_email(email);
        let Some(user) = self.users.find_by_email(&email).await? else {
            log::debug!("Resend requested for unknown address");
            return Ok(ResendAck::default());
        };
        let Some(prior) = self.tokens.find_latest_for_user(user.id, kind).await? else {
            log::debug!("Resend requested for user {} without a {} token", user.id, kind);
            return Ok(ResendAck::default());
        };
        if let Err(err) = policy::check_regeneration(&prior, self.clock.now()) {
            log::debug!("Resend of {} token for user {} refused: {}", kind, user.id, err);
            return Ok(ResendAck::default());
        }

        let token = self.replace(&prior, context).await?;
        if let Err(err) = self.dispatch(&token).await {
            log::warn!("Resent {} mail for user {} not sent: {}", kind, user.id, err);
        }
        Ok(ResendAck::default())
    }

    /// Start a login: check the password and mail a one-time sign-in link
    ///
    /// # Errors
    ///
    /// * `AuthError::InvalidCredentials` - Unknown email or wrong password
    /// * `AuthError::MailDelivery` - Token exists, mail did not go out
    pub async fn login(
        &self,
        request: LoginRequest,
        context: ClientContext,
    ) -> AuthResult<IssuedToken> {
        let email = normalize_email(&request.email);

        let user = match self.users.find_by_email(&email).await? {
            Some(user) => {
                self.hasher.verify(&request.password, &user.password_hash)?;
                user
            }
            None => {
                self.hasher.verify_dummy(&request.password)?;
                return Err(AuthError::InvalidCredentials);
            }
        };

        let replaced = self
            .tokens
            .delete_unused_for_user(user.id, TokenKind::LoginVerification)
            .await?;
        if replaced > 0 {
            log::debug!("Replaced {} pending login token(s) of user {}", replaced, user.id);
        }

        let token = self
            .mint(user.id, &user.email, TokenKind::LoginVerification, context)
            .await?;
        self.dispatch(&token).await?;

        Ok(IssuedToken::from(&token))
    }

    /// Exchange a login link for a credential pair.
    ///
    /// The pair is handed out only if this call is the one that marked the
    /// token used.
    pub async fn resolve_login(&self, validation_id: &str) -> AuthResult<LoginSession> {
        let token = self.load(validation_id).await?;
        policy::require_kind(&token, TokenKind::LoginVerification)?;
        policy::check_link(&token, self.clock.now())?;

        let user = self.user(token.user_id).await?;
        let credentials = self.issuer.issue_pair(&CredentialSubject::from(&user))?;
        self.consume(validation_id).await?;
        log::info!("User {} signed in", user.id);

        Ok(LoginSession {
            user_id: user.id,
            email: user.email,
            display_name: user.display_name,
            credentials,
        })
    }

    /// Rotate a refresh credential into a brand-new pair.
    ///
    /// The subject is re-read so display claims follow the current account.
    pub async fn refresh(&self, refresh_token: &str) -> AuthResult<CredentialPair> {
        let claims = self.issuer.verify_refresh(refresh_token)?;
        let user = self.user(claims.sub).await?;
        Ok(self
            .issuer
            .rotate(refresh_token, &CredentialSubject::from(&user))?)
    }

    /// Start a password reset.
    ///
    /// Always answers with the same acknowledgement. Only storage failures
    /// escape; a failed mail is logged.
    pub async fn forgot_password(
        &self,
        email: &str,
        context: ClientContext,
    ) -> AuthResult<ForgotPasswordAck> {
        let email = normalize_email(email);
        if validate_email(&email).is_err() {
            return Ok(ForgotPasswordAck::default());
        }

        let Some(user) = self.users.find_by_email(&email).await? else {
            log::debug!("Password reset requested for unknown address");
            return Ok(ForgotPasswordAck::default());
        };

        let now = self.clock.now();
        let reusable = self
            .tokens
            .find_latest_for_user(user.id, TokenKind::PasswordReset)
            .await?
            .filter(|token| token.state(now) == TokenState::Active);

        let token = match reusable {
            Some(token) => token,
            None => {
                self.tokens
                    .delete_unused_for_user(user.id, TokenKind::PasswordReset)
                    .await?;
                self.mint(user.id, &user.email, TokenKind::PasswordReset, context)
                    .await?
            }
        };

        if let Err(err) = self.dispatch(&token).await {
            log::warn!("Password reset mail for user {} not sent: {}", user.id, err);
        }

        Ok(ForgotPasswordAck::default())
    }

    /// Check a reset link without consuming it
    pub async fn resolve_password_reset(&self, validation_id: &str) -> AuthResult<ResetAuthorization> {
        let token = self.load(validation_id).await?;
        policy::require_kind(&token, TokenKind::PasswordReset)?;
        policy::check_link(&token, self.clock.now())?;

        Ok(ResetAuthorization {
            email: token.email,
            expires_at: token.expires_at,
        })
    }

    /// Set a new password through a reset link.
    ///
    /// The link is claimed before the new hash is stored, so of two
    /// concurrent submissions only the one reported as successful writes.
    /// A failed write releases the claim and the link stays usable.
    pub async fn reset_password(&self, submit: PasswordResetSubmit) -> AuthResult<()> {
        let token = self.load(&submit.validation_id).await?;
        policy::require_kind(&token, TokenKind::PasswordReset)?;
        policy::check_link(&token, self.clock.now())?;
        validate_password(&submit.new_password)?;

        let hash = self.hasher.hash(&submit.new_password)?;
        let claimed = self.consume(&submit.validation_id).await?;

        let stored = match self.users.update_password_hash(token.user_id, &hash).await {
            Ok(true) => Ok(()),
            Ok(false) => Err(AuthError::UserNotFound),
            Err(err) => Err(err),
        };
        if let Err(err) = stored {
            self.release(&claimed).await;
            return Err(err);
        }

        log::info!("Password reset for user {}", token.user_id);
        Ok(())
    }

    /// Delete tokens that expired without being used, and used tokens past
    /// their retention window
    pub async fn purge_expired(&self) -> AuthResult<u64> {
        let purged = self.tokens.purge_expired(self.clock.now()).await?;
        if purged > 0 {
            log::info!("Purged {} expired token(s)", purged);
        }
        Ok(purged)
    }

    /// Verify an access credential
    pub fn verify_access_token(&self, token: &str) -> AuthResult<AccessClaims> {
        Ok(self.issuer.verify_access(token)?)
    }

    /// Lifetime of refresh credentials, for cookie max-age
    pub fn refresh_ttl(&self) -> chrono::Duration {
        self.issuer.refresh_ttl()
    }

    /// Check that token storage is reachable
    pub async fn health_check(&self) -> AuthResult<()> {
        self.tokens.health_check().await
    }

    async fn load(&self, validation_id: &str) -> AuthResult<ValidationToken> {
        self.tokens
            .find_by_validation_id(validation_id)
            .await?
            .ok_or(AuthError::NotFound)
    }

    async fn user(&self, user_id: UserId) -> AuthResult<User> {
        self.users
            .find_by_id(user_id)
            .await?
            .ok_or(AuthError::UserNotFound)
    }

    /// Mark a token used; a lost race is reported with the token's new state
    async fn consume(&self, validation_id: &str) -> AuthResult<ValidationToken> {
        match self
            .tokens
            .try_mark_used(validation_id, self.clock.now())
            .await?
        {
            Some(used) => Ok(used),
            None => Err(self.explain_refusal(validation_id).await),
        }
    }

    /// Undo a claim whose follow-up write failed
    async fn release(&self, claimed: &ValidationToken) {
        let Some(used_at) = claimed.used_at else {
            return;
        };
        match self
            .tokens
            .release_claim(&claimed.validation_id, used_at)
            .await
        {
            Ok(true) => log::debug!(
                "Released claim on {} token of user {}",
                claimed.kind,
                claimed.user_id
            ),
            Ok(false) => log::warn!(
                "Claim on {} token of user {} already gone",
                claimed.kind,
                claimed.user_id
            ),
            Err(err) => log::error!("Could not release claim on {} token: {}", claimed.kind, err),
        }
    }

    /// Delete `prior` and every other unused token of its kind, then mint
    /// a successor
    async fn replace(
        &self,
        prior: &ValidationToken,
        context: ClientContext,
    ) -> AuthResult<ValidationToken> {
        let user = self.user(prior.user_id).await?;
        self.tokens.delete(&prior.validation_id).await?;
        self.tokens.delete_unused_for_user(user.id, prior.kind).await?;
        self.mint(user.id, &user.email, prior.kind, context).await
    }

    /// Reload a token whose conditional update was refused and say why
    async fn explain_refusal(&self, validation_id: &str) -> AuthError {
        match self.load(validation_id).await {
            Ok(token) => policy::rejection(&token, self.clock.now()),
            Err(err) => err,
        }
    }

    async fn mint(
        &self,
        user_id: UserId,
        email: &str,
        kind: TokenKind,
        context: ClientContext,
    ) -> AuthResult<ValidationToken> {
        for _ in 0..MAX_MINT_ATTEMPTS {
            let candidate =
                NewToken::generate(user_id, email, kind, context.clone(), self.clock.now());
            match self.tokens.insert(candidate).await {
                Ok(token) => {
                    log::info!("Issued {} token for user {}", kind, user_id);
                    return Ok(token);
                }
                Err(AuthError::TokenCollision) => continue,
                Err(err) => return Err(err),
            }
        }
        log::error!("Could not allocate a unique {} token", kind);
        Err(AuthError::TokenCollision)
    }

    /// Render and send mail for `token`, bounded by the mail timeout
    async fn dispatch(&self, token: &ValidationToken) -> AuthResult<()> {
        let mail = self.composer.compose(token);

        let reason = match tokio::time::timeout(self.mail_timeout, self.mailer.send(&mail)).await {
            Ok(Ok(())) => return Ok(()),
            Ok(Err(err)) => err.to_string(),
            Err(_) => format!("timed out after {:?}", self.mail_timeout),
        };

        log::warn!(
            "{} mail for user {} not delivered: {}",
            token.kind,
            token.user_id,
            reason
        );
        Err(AuthError::MailDelivery {
            validation_id: token.validation_id.clone(),
            reason,
        })
    }
}
