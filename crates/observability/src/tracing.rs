//! Tracing/logging initialization.
//!
//! JSON lines on stdout, filtered by `RUST_LOG` when set.

use tracing_subscriber::EnvFilter;

/// Filter used when `RUST_LOG` is unset or unparsable.
pub const DEFAULT_DIRECTIVE: &str = "info";

/// Initialize tracing with the default filter.
///
/// Safe to call multiple times (subsequent calls are no-ops).
pub fn init() {
    init_with(DEFAULT_DIRECTIVE);
}

/// Initialize tracing, falling back to `default_directive` when `RUST_LOG`
/// does not provide a filter. Returns `false` when a subscriber was already
/// installed.
pub fn init_with(default_directive: &str) -> bool {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .json()
        .with_timer(tracing_subscriber::fmt::time::SystemTime)
        .with_target(false)
        .with_current_span(true)
        .try_init()
        .is_ok()
}
