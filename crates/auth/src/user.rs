//! User entity: identity, credentials and account state.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use tourbook_core::{DomainResult, Resource, UniqueKey, UserId, Violations};
use tourbook_query::Filter;

use crate::error::AuthError;
use crate::password::{hash_password, require_hash, validate_new_password, verify_password};
use crate::reset_token::{ResetToken, hash_reset_token};
use crate::Role;

pub const DEFAULT_PHOTO: &str = "default.jpg";

/// A registered user.
///
/// # Invariants
/// - `email` is stored trimmed and lower-cased, and is unique.
/// - `password` only ever holds an Argon2 hash.
/// - Inactive users are invisible to every read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    #[serde(default)]
    pub id: UserId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default = "default_photo")]
    pub photo: String,
    #[serde(default)]
    pub role: Role,
    #[serde(default)]
    pub password: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_changed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_reset_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_reset_expires: Option<DateTime<Utc>>,
    #[serde(default = "default_active")]
    pub active: bool,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

fn default_photo() -> String {
    DEFAULT_PHOTO.to_string()
}

fn default_active() -> bool {
    true
}

/// Sign-up input: only these fields are accepted from the request.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewUser {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub password_confirm: String,
}

impl User {
    /// Build a new account with role `user` and a hashed password.
    pub fn register(input: NewUser, now: DateTime<Utc>) -> Result<Self, AuthError> {
        validate_new_password(&input.password, &input.password_confirm)?;
        let mut user = Self {
            id: UserId::new(),
            name: input.name,
            email: input.email,
            photo: default_photo(),
            role: Role::User,
            password: hash_password(&input.password)?,
            password_changed_at: None,
            password_reset_token: None,
            password_reset_expires: None,
            active: true,
            created_at: now,
        };
        user.prepare();
        user.validate()?;
        Ok(user)
    }

    pub fn correct_password(&self, candidate: &str) -> bool {
        verify_password(candidate, &self.password)
    }

    /// True when the password changed after a token issued at `iat` (epoch seconds).
    pub fn changed_password_after(&self, iat: i64) -> bool {
        self.password_changed_at
            .is_some_and(|changed| changed.timestamp() > iat)
    }

    /// Replace the password and invalidate any pending reset token.
    ///
    /// The change is stamped one second in the past so a token issued in the
    /// same instant stays valid.
    pub fn set_password(&mut self, password: &str, confirm: &str, now: DateTime<Utc>) -> Result<(), AuthError> {
        validate_new_password(password, confirm)?;
        self.password = hash_password(password)?;
        self.password_changed_at = Some(now - Duration::seconds(1));
        self.clear_reset_token();
        Ok(())
    }

    /// Issue a reset token, storing its digest; returns the plaintext.
    pub fn create_password_reset_token(&mut self, now: DateTime<Utc>) -> String {
        let token = ResetToken::generate(now);
        self.password_reset_token = Some(token.hashed);
        self.password_reset_expires = Some(token.expires_at);
        token.plain
    }

    pub fn clear_reset_token(&mut self) {
        self.password_reset_token = None;
        self.password_reset_expires = None;
    }

    /// True when `plain` is the outstanding, unexpired reset token.
    pub fn reset_token_matches(&self, plain: &str, now: DateTime<Utc>) -> bool {
        match (&self.password_reset_token, self.password_reset_expires) {
            (Some(stored), Some(expires)) => *stored == hash_reset_token(plain) && expires > now,
            _ => false,
        }
    }
}

fn is_valid_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && domain.split('.').count() >= 2
        && domain.split('.').all(|part| !part.is_empty())
        && !email.chars().any(char::is_whitespace)
}

impl Resource for User {
    type Id = UserId;

    const COLLECTION: &'static str = "users";
    const HIDDEN_FIELDS: &'static [&'static str] =
        &["password", "passwordResetToken", "passwordResetExpires", "active"];

    fn id(&self) -> UserId {
        self.id
    }

    fn prepare(&mut self) {
        self.name = self.name.trim().to_string();
        self.email = self.email.trim().to_lowercase();
    }

    fn validate(&self) -> DomainResult<()> {
        let mut violations = Violations::new();
        violations.check(self.name.is_empty(), "Please tell us your name!");
        violations.check(self.email.is_empty(), "Please provide your email");
        violations.check(
            !self.email.is_empty() && !is_valid_email(&self.email),
            "Please provide a valid email",
        );
        violations.into_result()?;
        require_hash(&self.password)
    }

    fn unique_keys(&self) -> Vec<UniqueKey> {
        vec![UniqueKey::new("email", self.email.clone())]
    }

    fn base_filter() -> Filter {
        Filter::new().ne("active", false)
    }
}
