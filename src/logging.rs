//! # Logging
//!
//! Installs a `tracing` subscriber writing human-readable lines to stderr.
//! `RUST_LOG` wins over the configured level when set.

use tracing_subscriber::EnvFilter;

/// Install the global subscriber. Calling it again is a no-op.
pub fn init(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    // Err only means a subscriber is already installed
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
