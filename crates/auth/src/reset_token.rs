//! Single-use password reset tokens.
//!
//! Only the SHA-256 digest is stored; the plaintext goes out by email.

use chrono::{DateTime, Duration, Utc};
use rand::RngCore;
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};

pub const RESET_TOKEN_TTL_MINUTES: i64 = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResetToken {
    /// Sent to the user; never persisted.
    pub plain: String,
    /// Persisted and looked up on reset.
    pub hashed: String,
    pub expires_at: DateTime<Utc>,
}

impl ResetToken {
    pub fn generate(now: DateTime<Utc>) -> Self {
        let mut bytes = [0u8; 32];
        OsRng.fill_bytes(&mut bytes);
        let plain = hex::encode(bytes);
        Self {
            hashed: hash_reset_token(&plain),
            plain,
            expires_at: now + Duration::minutes(RESET_TOKEN_TTL_MINUTES),
        }
    }
}

/// Lowercase hex SHA-256 of the plaintext token.
pub fn hash_reset_token(plain: &str) -> String {
    hex::encode(Sha256::digest(plain.as_bytes()))
}
