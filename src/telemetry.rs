use std::io;

use tracing::info_span;
use tracing_subscriber::EnvFilter;

/// Environment variable holding the log filter directives.
pub(crate) const LOG_ENV: &str = "RHDA_LOG";

/// Install the stderr log subscriber. Later calls are no-ops.
pub(crate) fn init_logging() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .try_init();
}

/// Run a closure inside a `phase` span named after the conversion step.
pub(crate) fn with_span<T, F>(name: &str, f: F) -> T
where
    F: FnOnce() -> T,
{
    let span = info_span!("phase", name = %name);
    span.in_scope(f)
}
