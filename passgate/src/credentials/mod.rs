//! Signed access / refresh credentials.
//!
//! Both credentials are HS256 JWTs signed with different secrets, so a
//! leaked refresh key cannot mint access tokens and vice versa. Nothing is
//! persisted: rotation mints a new pair and the client drops the old one.
//!
//! `iat` is a fractional NumericDate with microsecond resolution, and one
//! issuer never hands out the same `iat` twice.

use chrono::{DateTime, Duration, TimeZone, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use thiserror::Error;
use uuid::Uuid;

use crate::clock::Clock;
use crate::users::{User, UserId};

/// Access credential lifetime
pub const ACCESS_TOKEN_TTL_MINUTES: i64 = 15;

/// Default refresh credential lifetime
pub const DEFAULT_REFRESH_TOKEN_TTL_DAYS: i64 = 7;

/// Which of the two credentials a JWT claims to be
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialKind {
    Access,
    Refresh,
}

/// JWT claims for access token
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessClaims {
    pub sub: UserId,
    pub kind: CredentialKind,
    pub jti: Uuid,
    pub iat: f64,
    pub exp: i64,
    pub email: String,
    pub name: String,
}

/// JWT claims for refresh token; subject only
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefreshClaims {
    pub sub: UserId,
    pub kind: CredentialKind,
    pub jti: Uuid,
    pub iat: f64,
    pub exp: i64,
}

#[derive(Deserialize)]
struct KindOnly {
    kind: CredentialKind,
}

/// Identity a credential pair is issued for
#[derive(Debug, Clone)]
pub struct CredentialSubject {
    pub user_id: UserId,
    pub email: String,
    pub display_name: String,
}

impl From<&User> for CredentialSubject {
    fn from(user: &User) -> Self {
        Self {
            user_id: user.id,
            email: user.email.clone(),
            display_name: user.display_name.clone(),
        }
    }
}

/// Freshly minted credentials
#[derive(Debug, Clone, Serialize)]
pub struct CredentialPair {
    pub access_token: String,
    pub refresh_token: String,
    pub access_expires_at: DateTime<Utc>,
    pub refresh_expires_at: DateTime<Utc>,
}

/// Credential verification errors
#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("Credential expired")]
    Expired,

    #[error("Credential malformed or signature invalid")]
    Malformed,

    #[error("Credential of the wrong kind")]
    WrongKind,

    #[error("Credential signing failed: {0}")]
    Signing(jsonwebtoken::errors::Error),
}

/// Secrets and lifetimes for a [`CredentialIssuer`]
#[derive(Clone)]
pub struct CredentialConfig {
    pub access_secret: String,
    pub refresh_secret: String,
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
}

impl CredentialConfig {
    /// Standard lifetimes: 15 minutes access, 7 days refresh
    pub fn new(access_secret: String, refresh_secret: String) -> Self {
        Self {
            access_secret,
            refresh_secret,
            access_ttl: Duration::minutes(ACCESS_TOKEN_TTL_MINUTES),
            refresh_ttl: Duration::days(DEFAULT_REFRESH_TOKEN_TTL_DAYS),
        }
    }

    pub fn with_refresh_ttl(mut self, refresh_ttl: Duration) -> Self {
        self.refresh_ttl = refresh_ttl;
        self
    }
}

struct KeyPair {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl KeyPair {
    fn from_secret(secret: &str) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
        }
    }
}

/// Mints and verifies access / refresh credential pairs
#[derive(Clone)]
pub struct CredentialIssuer {
    access: Arc<KeyPair>,
    refresh: Arc<KeyPair>,
    access_ttl: Duration,
    refresh_ttl: Duration,
    clock: Arc<dyn Clock>,
    /// Microsecond timestamp of the latest pair
    last_issued: Arc<AtomicI64>,
}

impl CredentialIssuer {
    /// Create a new issuer
    ///
    /// # Arguments
    ///
    /// * `config` - Signing secrets and lifetimes
    /// * `clock` - Time source for `iat` / `exp`
    pub fn new(config: CredentialConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            access: Arc::new(KeyPair::from_secret(&config.access_secret)),
            refresh: Arc::new(KeyPair::from_secret(&config.refresh_secret)),
            access_ttl: config.access_ttl,
            refresh_ttl: config.refresh_ttl,
            clock,
            last_issued: Arc::new(AtomicI64::new(i64::MIN)),
        }
    }

    pub fn refresh_ttl(&self) -> Duration {
        self.refresh_ttl
    }

    /// Mint a new access + refresh pair, each with its own `jti`
    pub fn issue_pair(&self, subject: &CredentialSubject) -> Result<CredentialPair, CredentialError> {
        let issued_at = self.next_issued_at();
        let now = DateTime::from_timestamp_micros(issued_at).unwrap_or_else(|| self.clock.now());
        let iat = issued_at as f64 / 1_000_000.0;
        let access_expires_at = now + self.access_ttl;
        let refresh_expires_at = now + self.refresh_ttl;

        let access = AccessClaims {
            sub: subject.user_id,
            kind: CredentialKind::Access,
            jti: Uuid::new_v4(),
            iat,
            exp: access_expires_at.timestamp(),
            email: subject.email.clone(),
            name: subject.display_name.clone(),
        };
        let refresh = RefreshClaims {
            sub: subject.user_id,
            kind: CredentialKind::Refresh,
            jti: Uuid::new_v4(),
            iat,
            exp: refresh_expires_at.timestamp(),
        };

        let header = Header::new(Algorithm::HS256);
        Ok(CredentialPair {
            access_token: encode(&header, &access, &self.access.encoding)
                .map_err(CredentialError::Signing)?,
            refresh_token: encode(&header, &refresh, &self.refresh.encoding)
                .map_err(CredentialError::Signing)?,
            access_expires_at,
            refresh_expires_at,
        })
    }

    /// Verify an access credential
    pub fn verify_access(&self, token: &str) -> Result<AccessClaims, CredentialError> {
        let claims: AccessClaims = self.verify(token, &self.access, &self.refresh)?;
        self.check(claims.kind, CredentialKind::Access, claims.exp)?;
        Ok(claims)
    }

    /// Verify a refresh credential
    pub fn verify_refresh(&self, token: &str) -> Result<RefreshClaims, CredentialError> {
        let claims: RefreshClaims = self.verify(token, &self.refresh, &self.access)?;
        self.check(claims.kind, CredentialKind::Refresh, claims.exp)?;
        Ok(claims)
    }

    /// Verify a refresh credential and mint a brand-new pair for `subject`.
    ///
    /// The subject is supplied by the caller because refresh credentials do
    /// not carry display claims.
    pub fn rotate(
        &self,
        refresh_token: &str,
        subject: &CredentialSubject,
    ) -> Result<CredentialPair, CredentialError> {
        let claims = self.verify_refresh(refresh_token)?;
        if claims.sub != subject.user_id {
            return Err(CredentialError::Malformed);
        }
        self.issue_pair(subject)
    }

    /// Issue instant in microseconds: the clock, or one past the previous
    /// pair when the clock has not moved
    fn next_issued_at(&self) -> i64 {
        let now = self.clock.now().timestamp_micros();
        let previous = match self
            .last_issued
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |last| {
                Some(now.max(last.saturating_add(1)))
            }) {
            Ok(previous) | Err(previous) => previous,
        };
        now.max(previous.saturating_add(1))
    }

    /// Expiry of a verified credential as a timestamp
    pub fn expires_at(exp: i64) -> Option<DateTime<Utc>> {
        Utc.timestamp_opt(exp, 0).single()
    }

    fn verify<T: DeserializeOwned>(
        &self,
        token: &str,
        expected: &KeyPair,
        other: &KeyPair,
    ) -> Result<T, CredentialError> {
        match decode::<T>(token, &expected.decoding, &Self::validation()) {
            Ok(data) => Ok(data.claims),
            Err(_) => {
                // A credential that verifies under the other key is
                // well-formed but presented at the wrong door.
                if decode::<KindOnly>(token, &other.decoding, &Self::validation()).is_ok() {
                    Err(CredentialError::WrongKind)
                } else {
                    Err(CredentialError::Malformed)
                }
            }
        }
    }

    fn check(&self, kind: CredentialKind, expected: CredentialKind, exp: i64) -> Result<(), CredentialError> {
        if kind != expected {
            return Err(CredentialError::WrongKind);
        }
        if self.clock.now().timestamp() >= exp {
            return Err(CredentialError::Expired);
        }
        Ok(())
    }

    fn validation() -> Validation {
        // Expiry is checked against the injected clock, not the system time.
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation
    }
}
