//! Logging initialization and configuration.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEFAULT_FILTER: &str = "request_sessions=info";

fn filter_from(level: Option<&str>) -> EnvFilter {
    match level {
        Some(directive) => EnvFilter::try_new(directive)
            .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER)),
        None => EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER)),
    }
}

/// Initialize the logging system.
///
/// Uses the `RUST_LOG` environment variable for filtering. If not set,
/// defaults to `request_sessions=info`.
///
/// # Panics
///
/// Panics if called more than once, or if another tracing subscriber
/// has already been set.
pub fn init() {
    tracing_subscriber::registry()
        .with(filter_from(None))
        .with(tracing_subscriber::fmt::layer().compact())
        .init();
}

/// Try to initialize the logging system.
///
/// Returns `Err` if logging has already been initialized.
pub fn try_init() -> Result<(), tracing_subscriber::util::TryInitError> {
    try_init_with_level(None)
}

/// Try to initialize logging with an explicit filter directive, such as
/// `debug` or `request_sessions=trace`. Falls back to the default filter
/// if the directive does not parse.
pub fn try_init_with_level(
    level: Option<&str>,
) -> Result<(), tracing_subscriber::util::TryInitError> {
    tracing_subscriber::registry()
        .with(filter_from(level))
        .with(tracing_subscriber::fmt::layer().compact())
        .try_init()
}
