//! Tracing subscriber setup for the `catsearch` binary.
//!
//! Diagnostics go to stderr so stdout stays clean for command output
//! (`search --json` in particular). The filter honors `RUST_LOG` and falls
//! back to `warn` for dependencies and `info` for this crate.

use tracing_subscriber::{fmt, EnvFilter};

const DEFAULT_FILTER: &str = "warn,catalog_search=info,catalog_search_core=info";

/// Install the global subscriber. Returns false if one was already set.
pub fn init_tracing() -> bool {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init()
        .is_ok()
}
