//! Telemetry and observability setup
//!
//! Configures structured logging with tracing and tracing-subscriber.

use std::sync::Once;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

static INIT: Once = Once::new();

/// Filter used when RUST_LOG is not set
pub fn default_filter(default_level: &str) -> String {
    format!("greetwatch={},tower_http=debug", default_level)
}

/// Initialize tracing subscriber for structured logging
///
/// Only the first call per process installs the subscriber.
///
/// RUST_LOG takes precedence over `default_level`.
///
/// # Examples
///
/// ```no_run
/// greetwatch::telemetry::init("info");
/// tracing::info!("Application started");
/// ```
pub fn init(default_level: &str) {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(default_filter(default_level)));

        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    });
}
