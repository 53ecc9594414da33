//! Tracing subscriber setup for binaries and tests embedding the dispatcher.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Install a fmt subscriber filtered by `RUST_LOG`.
///
/// Without `RUST_LOG` the level is `debug` when `verbose` is set and `info`
/// otherwise. Returns `false` when a global subscriber was already installed.
pub fn init_tracing(verbose: bool) -> bool {
    let default_level = if verbose { "promptflux=debug,info" } else { "info" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().compact())
        .try_init()
        .is_ok()
}
