//! Role and ownership checks.
//!
//! - No IO
//! - No panics
//! - Pure policy: callers supply the principal and the record owner.

use thiserror::Error;

use tourbook_core::UserId;

use crate::Role;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("You do not have permission to perform this action")]
    Forbidden,

    #[error("You can only modify your own records")]
    NotOwner,
}

/// Allow the request only when `role` is one of `allowed`.
pub fn restrict_to(role: Role, allowed: &[Role]) -> Result<(), AuthzError> {
    if allowed.contains(&role) {
        Ok(())
    } else {
        Err(AuthzError::Forbidden)
    }
}

/// Allow the owner of a record, or any principal whose role is in `bypass`.
pub fn ensure_owner_or(
    principal: UserId,
    role: Role,
    owner: UserId,
    bypass: &[Role],
) -> Result<(), AuthzError> {
    if principal == owner || bypass.contains(&role) {
        Ok(())
    } else {
        Err(AuthzError::NotOwner)
    }
}
