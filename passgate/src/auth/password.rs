//! Password hashing and input validation.

use super::errors::{AuthError, AuthResult};
use argon2::{
    Algorithm, Argon2, Params, Version,
    password_hash::{PasswordHash, PasswordHasher as _, PasswordVerifier, SaltString, rand_core::OsRng},
};

/// Verified against when the account does not exist, so an unknown email
/// costs the same as a wrong password.
const DUMMY_PASSWORD: &str = "passgate-dummy-password";

/// Argon2id hasher with a server-side pepper
#[derive(Clone)]
pub struct PasswordHasher {
    pepper: String,
    params: Params,
    dummy_hash: String,
}

impl PasswordHasher {
    /// Create a hasher using the argon2 default cost parameters
    pub fn new(pepper: String) -> AuthResult<Self> {
        Self::with_params(pepper, Params::default())
    }

    /// Create a hasher with explicit cost parameters
    pub fn with_params(pepper: String, params: Params) -> AuthResult<Self> {
        let mut hasher = Self {
            pepper,
            params,
            dummy_hash: String::new(),
        };
        hasher.dummy_hash = hasher.hash(DUMMY_PASSWORD)?;
        Ok(hasher)
    }

    fn argon2(&self) -> Argon2<'static> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone())
    }

    /// Hash password with Argon2id + pepper
    pub fn hash(&self, password: &str) -> AuthResult<String> {
        let peppered = format!("{}{}", password, self.pepper);
        let salt = SaltString::generate(&mut OsRng);

        Ok(self
            .argon2()
            .hash_password(peppered.as_bytes(), &salt)
            .map_err(|_| AuthError::HashingFailed)?
            .to_string())
    }

    /// Verify password against hash
    pub fn verify(&self, password: &str, hash: &str) -> AuthResult<()> {
        let peppered = format!("{}{}", password, self.pepper);
        let parsed_hash = PasswordHash::new(hash).map_err(|_| AuthError::InvalidCredentials)?;

        self.argon2()
            .verify_password(peppered.as_bytes(), &parsed_hash)
            .map_err(|_| AuthError::InvalidCredentials)
    }

    /// Burn one verification against the dummy hash. Always fails.
    pub fn verify_dummy(&self, password: &str) -> AuthResult<()> {
        let _ = self.verify(password, &self.dummy_hash);
        Err(AuthError::InvalidCredentials)
    }
}

/// Validate password strength
pub fn validate_password(password: &str) -> AuthResult<()> {
    if password.len() < 8 {
        return Err(AuthError::WeakPassword(
            "Password must be at least 8 characters".to_string(),
        ));
    }

    let has_digit = password.chars().any(|c| c.is_ascii_digit());
    let has_uppercase = password.chars().any(|c| c.is_ascii_uppercase());
    let has_lowercase = password.chars().any(|c| c.is_ascii_lowercase());

    if !has_digit || !has_uppercase || !has_lowercase {
        return Err(AuthError::WeakPassword(
            "Password must contain at least one number, one uppercase and one lowercase letter"
                .to_string(),
        ));
    }

    Ok(())
}

/// Trim and lowercase an email address
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Shape check for an already normalized email address
pub fn validate_email(email: &str) -> AuthResult<()> {
    if email.len() > 254 || email.chars().any(char::is_whitespace) {
        return Err(AuthError::InvalidEmail);
    }

    let Some((local, domain)) = email.split_once('@') else {
        return Err(AuthError::InvalidEmail);
    };

    let domain_ok = domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !domain.contains('@');

    if local.is_empty() || !domain_ok {
        return Err(AuthError::InvalidEmail);
    }

    Ok(())
}
