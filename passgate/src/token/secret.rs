//! Secret and identifier generation.
//!
//! Randomness comes from [`rand::rng`], a ChaCha-based CSPRNG reseeded from
//! the operating system.

use super::kind::SecretFormat;
use rand::{Rng, RngCore};
use subtle::ConstantTimeEq;

/// Random bytes behind every public validation id
const VALIDATION_ID_BYTES: usize = 32;

/// Generate a secret in the requested format
pub fn generate_secret(format: SecretFormat) -> String {
    let mut rng = rand::rng();
    match format {
        SecretFormat::NumericCode { digits } => {
            let upper = 10u64.pow(digits);
            let code = rng.random_range(0..upper);
            format!("{:0width$}", code, width = digits as usize)
        }
        SecretFormat::Opaque { bytes } => {
            let mut buf = vec![0u8; bytes];
            rng.fill_bytes(&mut buf);
            hex::encode(buf)
        }
    }
}

/// Generate a public validation id for links
pub fn generate_validation_id() -> String {
    let mut buf = [0u8; VALIDATION_ID_BYTES];
    rand::rng().fill_bytes(&mut buf);
    hex::encode(buf)
}

/// Compare a presented secret against the stored one in constant time
pub fn secrets_match(presented: &str, stored: &str) -> bool {
    presented.as_bytes().ct_eq(stored.as_bytes()).into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_numeric_code_shape() {
        for _ in 0..200 {
            let code = generate_secret(SecretFormat::NumericCode { digits: 6 });
            assert_eq!(code.len(), 6);
            assert!(code.chars().all(|c| c.is_ascii_digit()));
        }
    }

    #[test]
    fn test_opaque_secret_shape() {
        let secret = generate_secret(SecretFormat::Opaque { bytes: 32 });
        assert_eq!(secret.len(), 64);
        assert!(hex::decode(&secret).is_ok());
    }

    #[test]
    fn test_validation_ids_are_distinct() {
        let ids: HashSet<String> = (0..100).map(|_| generate_validation_id()).collect();
        assert_eq!(ids.len(), 100);
    }

    #[test]
    fn test_secrets_match() {
        assert!(secrets_match("123456", "123456"));
        assert!(!secrets_match("123457", "123456"));
        assert!(!secrets_match("12345", "123456"));
        assert!(!secrets_match("", "123456"));
    }
}
