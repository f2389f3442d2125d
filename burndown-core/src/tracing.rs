//! Tracing subscriber setup for binaries and tests.
//!
//! Library crates in this workspace only emit events; whoever owns `main`
//! (or a test harness) calls [`init`] once. `RUST_LOG` overrides the
//! default filter.

use tracing_subscriber::EnvFilter;

/// Install the global fmt subscriber with an env-filter. Safe to call more
/// than once; later calls are no-ops.
pub fn init(default_filter: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}
