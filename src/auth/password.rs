//! Password hashing and verification using Argon2
//!
//! Tenant users log in with email and password; only the PHC string is stored.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};

use crate::types::CheckpointError;

/// Hash a password using Argon2id, returning the PHC-formatted string
pub fn hash_password(password: &str) -> Result<String, CheckpointError> {
    let salt = SaltString::generate(&mut OsRng);

    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| CheckpointError::Internal(format!("Failed to hash password: {e}")))
}

/// Verify a password against a stored hash.
///
/// A stored hash that cannot be parsed is an internal fault, not a mismatch.
pub fn verify_password(password: &str, hash: &str) -> Result<bool, CheckpointError> {
    let parsed_hash = PasswordHash::new(hash)
        .map_err(|e| CheckpointError::Internal(format!("Invalid password hash format: {e}")))?;

    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_and_verify() {
        let hash = hash_password("s3cure-enough").unwrap();
        assert!(hash.starts_with("$argon2"));
        assert!(verify_password("s3cure-enough", &hash).unwrap());
        assert!(!verify_password("guess", &hash).unwrap());
    }

    #[test]
    fn test_salted() {
        let a = hash_password("same").unwrap();
        let b = hash_password("same").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_corrupt_hash_is_internal() {
        assert!(matches!(
            verify_password("password", "plaintext-oops"),
            Err(CheckpointError::Internal(_))
        ));
    }
}
