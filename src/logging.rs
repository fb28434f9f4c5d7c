//! Console logging for the `tally` binary.
//!
//! The library only emits `tracing` events; installing a subscriber is left to
//! the binary (or to a host embedding the library).

use tracing_subscriber::EnvFilter;

/// Install a fmt subscriber on stderr.
///
/// `RUST_LOG` wins when set; otherwise `verbose` picks `debug` over `info`.
/// Calling this twice is harmless: the second install is ignored.
pub fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
