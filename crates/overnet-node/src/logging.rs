//! Tracing subscriber configuration for overnet binaries.
//!
//! Log levels follow these conventions:
//! - ERROR: unrecoverable failures
//! - WARN: dropped packets, protocol violations, recoverable errors
//! - INFO: membership and lifecycle events
//! - DEBUG: table changes, per-packet dispatch
//! - TRACE: transient drops, timer details

use tracing_subscriber::EnvFilter;

/// Initialize the tracing subscriber with sensible defaults.
///
/// Log level can be controlled via the `RUST_LOG` environment variable.
/// Defaults to `default_level` if not set.
pub fn init(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Initialize the tracing subscriber with JSON output.
///
/// Activated by setting `RUST_LOG_FORMAT=json`.
pub fn init_json(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .json()
        .with_env_filter(filter)
        .init();
}

/// Pick plain or JSON output from `RUST_LOG_FORMAT` and initialize.
pub fn init_auto(default_level: &str) {
    if std::env::var("RUST_LOG_FORMAT").as_deref() == Ok("json") {
        init_json(default_level);
    } else {
        init(default_level);
    }
}

/// Initialize the tracing subscriber for tests.
///
/// Uses `try_init` to avoid panicking if called multiple times.
pub fn init_for_tests() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}
