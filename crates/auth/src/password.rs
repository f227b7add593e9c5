//! Password hashing (Argon2id) and the plaintext password rules.

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};

use tourbook_core::{DomainError, DomainResult, Violations};

use crate::error::AuthError;

pub const MIN_PASSWORD_LENGTH: usize = 8;

/// Check a new plaintext password and its confirmation.
pub fn validate_new_password(password: &str, confirm: &str) -> DomainResult<()> {
    let mut violations = Violations::new();
    violations.check(password.is_empty(), "Please provide a password");
    violations.check(
        !password.is_empty() && password.chars().count() < MIN_PASSWORD_LENGTH,
        format!("Password must be at least {MIN_PASSWORD_LENGTH} characters"),
    );
    violations.check(confirm.is_empty(), "Please confirm your password");
    violations.check(
        !confirm.is_empty() && password != confirm,
        "Passwords are not the same!",
    );
    violations.into_result()
}

pub fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|_| AuthError::Hashing)
}

/// Constant-time verification; a malformed stored hash never matches.
pub fn verify_password(candidate: &str, hash: &str) -> bool {
    let Ok(parsed) = PasswordHash::new(hash) else {
        return false;
    };
    Argon2::default()
        .verify_password(candidate.as_bytes(), &parsed)
        .is_ok()
}

pub(crate) fn require_hash(hash: &str) -> DomainResult<()> {
    if hash.is_empty() {
        Err(DomainError::validation("Please provide a password"))
    } else {
        Ok(())
    }
}
