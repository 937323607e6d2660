//! Password hashing

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use authgate_core::{AuthGateError, AuthGateResult, ErrorContext};

/// Hash a password using Argon2
pub fn hash_password(password: &str) -> AuthGateResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();

    argon2
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AuthGateError::Internal {
            message: format!("Failed to hash password: {}", e),
            source: None,
            context: ErrorContext::new("password").with_operation("hash_password"),
        })
}

/// Verify a password against a stored hash
pub fn verify_password(password: &str, hash: &str) -> AuthGateResult<bool> {
    let parsed_hash = PasswordHash::new(hash).map_err(|e| AuthGateError::Internal {
        message: format!("Stored password hash is malformed: {}", e),
        source: None,
        context: ErrorContext::new("password").with_operation("verify_password"),
    })?;

    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_and_verify() {
        let hash = hash_password("hunter2").unwrap();
        assert!(verify_password("hunter2", &hash).unwrap());
        assert!(!verify_password("hunter3", &hash).unwrap());
    }

    #[test]
    fn malformed_hash_is_an_error() {
        assert!(verify_password("hunter2", "not-a-hash").is_err());
    }
}
