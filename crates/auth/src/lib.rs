//! `tourbook-auth`: authentication and authorization boundary.
//!
//! This crate is decoupled from HTTP and storage: it signs and verifies
//! tokens, hashes passwords, issues reset tokens, owns the `User` entity,
//! and makes role/ownership decisions.

pub mod authorize;
pub mod claims;
pub mod error;
pub mod jwt;
pub mod password;
pub mod reset_token;
pub mod roles;
pub mod user;

pub use authorize::{AuthzError, ensure_owner_or, restrict_to};
pub use claims::{JwtClaims, TokenValidationError, validate_claims};
pub use error::AuthError;
pub use jwt::{Hs256Jwt, JwtValidator, TokenError};
pub use reset_token::{ResetToken, hash_reset_token};
pub use roles::Role;
pub use user::{NewUser, User};
