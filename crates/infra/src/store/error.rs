use thiserror::Error;

use tourbook_core::DomainError;

/// Entity store operation error.
///
/// `Domain` carries caller-visible failures (validation, uniqueness, bad
/// identifiers); the other variants are infrastructure failures.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("stored document is corrupt: {0}")]
    Corrupt(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    pub(crate) fn poisoned() -> Self {
        Self::Unavailable("lock poisoned".to_string())
    }
}
