use thiserror::Error;

use tourbook_core::DomainError;

use crate::jwt::TokenError;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Token(#[from] TokenError),

    #[error("password hashing failed")]
    Hashing,
}
