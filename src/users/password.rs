//! Argon2 password hashing. Only PHC-format hash strings are ever stored.

use argon2::{
    password_hash::{self, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use rand::rngs::OsRng;
use thiserror::Error;

use crate::error::ApiError;

#[derive(Debug, Error)]
pub enum PasswordError {
    #[error("failed to hash password: {0}")]
    Hash(password_hash::Error),
    #[error("stored password hash is unusable: {0}")]
    StoredHash(password_hash::Error),
}

impl From<PasswordError> for ApiError {
    fn from(e: PasswordError) -> Self {
        ApiError::Internal(e.into())
    }
}

pub fn hash_password(plain: &str) -> Result<String, PasswordError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(plain.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(PasswordError::Hash)
}

/// `Ok(false)` for a wrong password. Errors only when `stored` cannot be used.
pub fn verify_password(plain: &str, stored: &str) -> Result<bool, PasswordError> {
    let parsed = PasswordHash::new(stored).map_err(PasswordError::StoredHash)?;
    match Argon2::default().verify_password(plain.as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(password_hash::Error::Password) => Ok(false),
        Err(e) => Err(PasswordError::StoredHash(e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hashes_are_salted_argon2() {
        let a = hash_password("test123").unwrap();
        let b = hash_password("test123").unwrap();
        assert!(a.starts_with("$argon2"));
        assert_ne!(a, b);
        assert!(verify_password("test123", &a).unwrap());
        assert!(verify_password("test123", &b).unwrap());
    }

    #[test]
    fn wrong_password_is_false_not_error() {
        let hash = hash_password("testpass").unwrap();
        assert!(!verify_password("test123", &hash).unwrap());
    }

    #[test]
    fn malformed_stored_hash_is_an_error() {
        let err = verify_password("anything", "not-a-valid-hash").unwrap_err();
        assert!(matches!(err, PasswordError::StoredHash(_)));
    }
}
