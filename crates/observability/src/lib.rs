//! Process-wide logging setup for the Tourbook service.

/// Tracing subscriber configuration.
pub mod tracing;

pub use tracing::{DEFAULT_DIRECTIVE, init, init_with};
