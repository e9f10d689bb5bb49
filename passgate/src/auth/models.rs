//! Authentication data models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::credentials::CredentialPair;
use crate::token::{TokenKind, ValidationToken};
use crate::users::UserId;

/// User registration request
#[derive(Debug, Clone, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub display_name: String,
}

/// User login request
#[derive(Debug, Clone, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Public view of a token that was just created or re-delivered
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IssuedToken {
    pub validation_id: String,
    pub kind: TokenKind,
    pub expires_at: DateTime<Utc>,
}

impl From<&ValidationToken> for IssuedToken {
    fn from(token: &ValidationToken) -> Self {
        Self {
            validation_id: token.validation_id.clone(),
            kind: token.kind,
            expires_at: token.expires_at,
        }
    }
}

/// What a link points at, without consuming it
#[derive(Debug, Clone, Serialize)]
pub struct LinkStatus {
    pub email: String,
    pub kind: TokenKind,
    pub expires_at: DateTime<Utc>,
}

/// A token whose secret matched and which is now used
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerifiedToken {
    pub user_id: UserId,
    pub email: String,
    pub kind: TokenKind,
}

/// A signed-in user and their fresh credentials
#[derive(Debug, Clone)]
pub struct LoginSession {
    pub user_id: UserId,
    pub email: String,
    pub display_name: String,
    pub credentials: CredentialPair,
}

/// Which token a resend refers to
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ResendTarget {
    ValidationId { validation_id: String },
    Email { email: String, kind: TokenKind },
}

/// Acknowledgement for a resend addressed by email.
///
/// Carries no validation id and is identical whatever happened behind it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResendAck {
    pub message: &'static str,
}

impl Default for ResendAck {
    fn default() -> Self {
        Self {
            message: "If a token can be renewed for this address, a new one is on its way",
        }
    }
}

/// Acknowledgement for forgot-password.
///
/// Identical whether or not the address belongs to an account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ForgotPasswordAck {
    pub message: &'static str,
}

impl Default for ForgotPasswordAck {
    fn default() -> Self {
        Self {
            message: "If an account exists for this address, a reset link is on its way",
        }
    }
}

/// A valid reset link, not yet consumed
#[derive(Debug, Clone, Serialize)]
pub struct ResetAuthorization {
    pub email: String,
    pub expires_at: DateTime<Utc>,
}

/// Password reset submission
#[derive(Debug, Clone, Deserialize)]
pub struct PasswordResetSubmit {
    pub validation_id: String,
    pub new_password: String,
}
