//! Logging setup for binaries. Libraries only emit `tracing` events.

use tracing_subscriber::EnvFilter;

/// Installs a compact `tracing` subscriber filtered by `RUST_LOG`, or by
/// `debug`/`info` when `RUST_LOG` is unset. Calling it twice is harmless.
pub fn init(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .try_init();
}
