//! Diagnostic logging setup.

use tracing_subscriber::EnvFilter;

/// Filter used when `--debug` is not given and `RUST_LOG` is unset.
const DEFAULT_FILTER: &str = "warn";

/// Build the filter: `--debug` wins, then `RUST_LOG`, then warnings only.
pub fn filter(debug: bool) -> EnvFilter {
    if debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
    }
}

/// Install the global subscriber. Output goes to stderr so reports on
/// stdout stay machine-readable.
pub fn init(debug: bool) -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(filter(debug))
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to initialise logging: {e}"))
}
