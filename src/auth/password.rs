// Password hashing with Argon2id, default parameters, random salt per hash

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use tracing::error;

use crate::common::ApiError;

/// Hash a password using Argon2id
pub fn hash_password(password: &str) -> Result<String, ApiError> {
    let salt = SaltString::generate(&mut OsRng);

    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| {
            error!(error = %e, "Failed to hash password");
            ApiError::InternalServer("password hashing failed".to_string())
        })
}

/// Verify a password against a stored hash.
///
/// An unparseable stored hash is treated as a mismatch so a corrupt row can
/// never authenticate.
pub fn verify_password(password: &str, hash: &str) -> bool {
    match PasswordHash::new(hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(e) => {
            error!(error = %e, "Stored password hash could not be parsed");
            false
        }
    }
}
