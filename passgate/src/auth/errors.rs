//! Authentication error types.

use crate::credentials::CredentialError;
use thiserror::Error;

/// Authentication errors
///
/// Everything except the infrastructure variants (`Database`, `Store`,
/// `HashingFailed`, `TokenCollision`, credential signing) is an expected
/// outcome the caller can act on.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A stored record could not be decoded
    #[error("Storage error: {0}")]
    Store(String),

    /// Password hashing failed
    #[error("Password hashing failed")]
    HashingFailed,

    /// Could not generate a token whose identifiers are unique
    #[error("Could not allocate a unique token")]
    TokenCollision,

    /// No token for the presented identifier
    #[error("Token not found")]
    NotFound,

    /// Token is past its expiry
    #[error("Token expired")]
    Expired,

    /// Token was already consumed
    #[error("Token already used")]
    AlreadyUsed,

    /// Token exhausted its attempt budget
    #[error("Maximum attempts exceeded")]
    MaxAttemptsExceeded,

    /// A resend was asked for a token that can still be used
    #[error("Token still active")]
    StillActive,

    /// Presented secret did not match
    #[error("Invalid token, {attempts_remaining} attempt(s) remaining")]
    InvalidToken { attempts_remaining: i32 },

    /// Login failed; deliberately says nothing about why
    #[error("Invalid credentials")]
    InvalidCredentials,

    /// Token exists but was minted for another purpose
    #[error("Token type not accepted here")]
    InvalidType,

    /// The token's owner no longer exists
    #[error("User not found")]
    UserNotFound,

    /// Signed credential rejected
    #[error("Credential rejected: {0}")]
    Credential(#[from] CredentialError),

    /// Email already registered
    #[error("Email already exists")]
    EmailTaken,

    /// Email address is malformed
    #[error("Invalid email address")]
    InvalidEmail,

    /// Password too weak
    #[error("Password too weak: {0}")]
    WeakPassword(String),

    /// The token was stored but its mail could not be dispatched
    #[error("Mail delivery failed: {reason}")]
    MailDelivery {
        validation_id: String,
        reason: String,
    },
}

impl AuthError {
    /// Stable machine-readable code for API responses
    pub fn code(&self) -> &'static str {
        if self.is_internal() {
            return "INTERNAL_ERROR";
        }
        match self {
            AuthError::Database(_)
            | AuthError::Store(_)
            | AuthError::HashingFailed
            | AuthError::TokenCollision => "INTERNAL_ERROR",
            AuthError::NotFound => "NOT_FOUND",
            AuthError::Expired => "EXPIRED",
            AuthError::AlreadyUsed => "ALREADY_USED",
            AuthError::MaxAttemptsExceeded => "MAX_ATTEMPTS_EXCEEDED",
            AuthError::StillActive => "TOKEN_STILL_ACTIVE",
            AuthError::InvalidToken { .. } => "INVALID_TOKEN",
            AuthError::InvalidCredentials => "INVALID_CREDENTIALS",
            AuthError::InvalidType => "INVALID_TYPE",
            AuthError::UserNotFound => "USER_NOT_FOUND",
            AuthError::Credential(_) => "REFRESH_TOKEN_ERROR",
            AuthError::EmailTaken => "EMAIL_TAKEN",
            AuthError::InvalidEmail => "INVALID_EMAIL",
            AuthError::WeakPassword(_) => "WEAK_PASSWORD",
            AuthError::MailDelivery { .. } => "MAIL_DELIVERY_FAILED",
        }
    }

    /// Infrastructure failure rather than an expected outcome
    pub fn is_internal(&self) -> bool {
        matches!(
            self,
            AuthError::Database(_)
                | AuthError::Store(_)
                | AuthError::HashingFailed
                | AuthError::TokenCollision
                | AuthError::Credential(CredentialError::Signing(_))
        )
    }

    /// Get a client-safe error message that doesn't leak sensitive information
    ///
    /// Infrastructure errors collapse into a generic message, and mail
    /// transport details are dropped.
    pub fn client_message(&self) -> String {
        match self {
            _ if self.is_internal() => "Internal server error".to_string(),
            AuthError::Credential(_) => "Invalid or expired credential".to_string(),
            AuthError::MailDelivery { .. } => {
                "Mail could not be delivered, try again later".to_string()
            }
            _ => self.to_string(),
        }
    }
}

/// Result type for authentication operations
pub type AuthResult<T> = Result<T, AuthError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_internal_errors_are_sanitized() {
        let err = AuthError::Store("row 17 has kind 'bogus'".to_string());
        assert_eq!(err.code(), "INTERNAL_ERROR");
        assert_eq!(err.client_message(), "Internal server error");
    }

    #[test]
    fn test_invalid_token_message_carries_remaining() {
        let err = AuthError::InvalidToken {
            attempts_remaining: 2,
        };
        assert_eq!(err.code(), "INVALID_TOKEN");
        assert!(err.client_message().contains('2'));
    }

    #[test]
    fn test_rejected_credentials_are_not_internal() {
        let err = AuthError::from(CredentialError::Expired);
        assert_eq!(err.code(), "REFRESH_TOKEN_ERROR");
        assert!(!err.is_internal());
    }

    #[test]
    fn test_mail_delivery_hides_transport_detail() {
        let err = AuthError::MailDelivery {
            validation_id: "abc".to_string(),
            reason: "smtp.internal:25 refused".to_string(),
        };
        assert!(!err.client_message().contains("smtp"));
    }
}
