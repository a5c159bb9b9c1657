//! Diagnostic logging setup
//!
//! Logs go to stderr so stdout stays clean for plans and JSON output.

use tracing_subscriber::EnvFilter;

/// Default filter directive for the given verbosity
pub fn default_directive(verbose: bool) -> String {
    let level = if verbose { "debug" } else { "warn" };
    format!("distup={}", level)
}

/// Install the global subscriber; `RUST_LOG` overrides the default level
pub fn setup_logging(verbose: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbose)));

    // A second init (e.g. in tests) keeps the first subscriber
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
