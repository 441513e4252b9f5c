use std::io;
use tracing_subscriber::{EnvFilter, fmt};

/// Stderr subscriber filtered by `RUST_LOG`, falling back to `info`
/// (`debug` when verbose).
pub fn init_logging(verbose: bool) {
    let fallback = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));

    let _ = fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .try_init();
}
