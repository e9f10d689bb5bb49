//! Token kinds and their creation-time policy.

use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Purpose a validation token was minted for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    EmailVerification,
    LoginVerification,
    PasswordReset,
    EmailChange,
    PhoneVerification,
    TwoFactor,
    AccountRecovery,
}

/// Shape of the secret a user has to present
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecretFormat {
    /// Zero-padded decimal code typed by a human
    NumericCode { digits: u32 },
    /// Random bytes, hex encoded, only ever carried inside a link
    Opaque { bytes: usize },
}

/// Expiry, attempt ceiling and secret format for one kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KindPolicy {
    pub ttl: Duration,
    pub max_attempts: i32,
    pub secret: SecretFormat,
}

const CODE: SecretFormat = SecretFormat::NumericCode { digits: 6 };
const OPAQUE: SecretFormat = SecretFormat::Opaque { bytes: 32 };

impl TokenKind {
    /// Every kind, in declaration order
    pub const ALL: [TokenKind; 7] = [
        TokenKind::EmailVerification,
        TokenKind::LoginVerification,
        TokenKind::PasswordReset,
        TokenKind::EmailChange,
        TokenKind::PhoneVerification,
        TokenKind::TwoFactor,
        TokenKind::AccountRecovery,
    ];

    /// Policy applied once, when a token of this kind is created
    pub fn policy(self) -> KindPolicy {
        match self {
            TokenKind::EmailVerification => KindPolicy {
                ttl: Duration::hours(24),
                max_attempts: 1,
                secret: CODE,
            },
            TokenKind::LoginVerification => KindPolicy {
                ttl: Duration::minutes(15),
                max_attempts: 5,
                secret: CODE,
            },
            TokenKind::PasswordReset => KindPolicy {
                ttl: Duration::hours(1),
                max_attempts: 3,
                secret: OPAQUE,
            },
            TokenKind::EmailChange => KindPolicy {
                ttl: Duration::hours(2),
                max_attempts: 1,
                secret: CODE,
            },
            TokenKind::PhoneVerification => KindPolicy {
                ttl: Duration::minutes(10),
                max_attempts: 5,
                secret: CODE,
            },
            TokenKind::TwoFactor => KindPolicy {
                ttl: Duration::minutes(5),
                max_attempts: 5,
                secret: CODE,
            },
            TokenKind::AccountRecovery => KindPolicy {
                ttl: Duration::hours(48),
                max_attempts: 1,
                secret: OPAQUE,
            },
        }
    }

    /// Whether the secret of this kind can be submitted as a typed code
    pub fn accepts_code(self) -> bool {
        matches!(self.policy().secret, SecretFormat::NumericCode { .. })
    }

    /// Whether outgoing mail for this kind may carry the secret.
    ///
    /// Login mail never does: the link alone completes the login.
    pub fn mail_includes_code(self) -> bool {
        self.accepts_code() && self != TokenKind::LoginVerification
    }

    /// Stable storage / wire name
    pub fn as_str(self) -> &'static str {
        match self {
            TokenKind::EmailVerification => "email_verification",
            TokenKind::LoginVerification => "login_verification",
            TokenKind::PasswordReset => "password_reset",
            TokenKind::EmailChange => "email_change",
            TokenKind::PhoneVerification => "phone_verification",
            TokenKind::TwoFactor => "two_factor",
            TokenKind::AccountRecovery => "account_recovery",
        }
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a stored kind name is not recognised
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown token kind: {0}")]
pub struct UnknownTokenKind(pub String);

impl FromStr for TokenKind {
    type Err = UnknownTokenKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TokenKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| UnknownTokenKind(s.to_string()))
    }
}
