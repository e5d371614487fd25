// ABOUTME: tracing subscriber setup for programs embedding reacher.
// ABOUTME: RUST_LOG wins over the verbose flag when set.

use tracing_subscriber::EnvFilter;

/// Install a fmt subscriber. Safe to call more than once; later calls are ignored.
pub fn init(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .ok();
}
