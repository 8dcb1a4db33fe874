//! Logging bootstrap.
//!
//! Installs the global tracing subscriber for a daemon. The configured
//! `log_level` is the default; `RUST_LOG` overrides it when set.

use tracing_subscriber::EnvFilter;

/// Install the global subscriber. Call once, early in main.
pub fn init_logging(log_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level.to_string()));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();
}
