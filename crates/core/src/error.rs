//! Domain error model.

use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Keep this focused on deterministic, business/domain failures (validation,
/// identifiers, uniqueness). Infrastructure concerns belong elsewhere.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A value failed validation (e.g. malformed input, out-of-range number).
    #[error("validation failed: {0}")]
    Validation(String),

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// A requested resource was not found (domain-level).
    #[error("not found")]
    NotFound,

    /// A unique field already holds this value on another record.
    #[error("duplicate {field} field value: {value}")]
    Duplicate { field: String, value: String },
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn duplicate(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Duplicate {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn not_found() -> Self {
        Self::NotFound
    }
}

/// Collects validation messages and turns them into a single
/// [`DomainError::Validation`] joined with `". "`.
#[derive(Debug, Default)]
pub struct Violations(Vec<String>);

impl Violations {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `msg` when `failed` holds.
    pub fn check(&mut self, failed: bool, msg: impl Into<String>) {
        if failed {
            self.0.push(msg.into());
        }
    }

    pub fn push(&mut self, msg: impl Into<String>) {
        self.0.push(msg.into());
    }

    pub fn into_result(self) -> DomainResult<()> {
        if self.0.is_empty() {
            Ok(())
        } else {
            Err(DomainError::Validation(self.0.join(". ")))
        }
    }
}
