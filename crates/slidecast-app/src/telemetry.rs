//! Tracing initialisation.

use tracing_subscriber::EnvFilter;

/// Install the global subscriber: env-filtered, compact, stdout.
pub(crate) fn init() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,sqlx=warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();
}
