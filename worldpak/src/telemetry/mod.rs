//! Metrics and diagnostics.

pub mod metrics;
pub mod snapshot;

pub use metrics::{ResolverMetrics, MISS_REPORT_CAP};
pub use snapshot::{DiagnosticsSnapshot, ResolverSnapshot};

use tracing_subscriber::EnvFilter;

/// Install the global tracing subscriber: `RUST_LOG`-style filtering,
/// compact output, `info` when no filter is set. Safe to call more than
/// once; later calls keep the first subscriber.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}
