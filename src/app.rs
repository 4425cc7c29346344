//! Route wiring for the greetwatch service
//!
//! | Route                  | Instrumentation                     |
//! |------------------------|-------------------------------------|
//! | `GET /`                | template counter only               |
//! | `GET /birthday/{name}` | `requests_in_progress` gauge        |
//! | `GET /greeting/{name}` | `request_latency` histogram         |
//! | `GET /metrics`         | template counter only               |

use crate::error::AppResult;
use crate::handlers::{AppState, greetings, metrics};
use crate::instrument;
use crate::router::{Dispatcher, RouteTable};
use std::sync::Arc;

pub const WELCOME_ENDPOINT: &str = "/";
pub const BIRTHDAY_ENDPOINT: &str = "/birthday/{name}";
pub const GREETING_ENDPOINT: &str = "/greeting/{name}";
pub const METRICS_ENDPOINT: &str = "/metrics";

/// Gauge applied to the birthday endpoint
pub const REQUESTS_IN_PROGRESS: &str = "requests_in_progress";

/// Histogram applied to the greeting endpoint
pub const REQUEST_LATENCY: &str = "request_latency";

/// Register every greetwatch route
///
/// # Errors
///
/// Returns an error on duplicate routes or metric registration conflicts.
pub fn routes(state: &AppState) -> AppResult<RouteTable> {
    let registry = state.registry();
    let greetings_config = &state.config().greetings;

    let mut table = RouteTable::new();
    table.get(WELCOME_ENDPOINT, greetings::welcome)?;
    table.get(
        BIRTHDAY_ENDPOINT,
        instrument::in_progress(
            registry,
            REQUESTS_IN_PROGRESS,
            BIRTHDAY_ENDPOINT,
            greetings::birthday_handler(greetings_config.birthday_delay()),
        )?,
    )?;
    table.get(
        GREETING_ENDPOINT,
        instrument::latency(
            registry,
            REQUEST_LATENCY,
            GREETING_ENDPOINT,
            greetings::greeting_handler(greetings_config.greeting_delay()),
        )?,
    )?;
    table.get(METRICS_ENDPOINT, metrics::handler(Arc::clone(registry)))?;

    Ok(table)
}

/// Build the dispatcher serving every greetwatch route
///
/// # Errors
///
/// Same as [`routes`], plus request counter registration failures.
pub fn build(state: &AppState) -> AppResult<Dispatcher> {
    let dispatcher = routes(state)?.build(state.registry())?;
    tracing::debug!(
        templates = dispatcher.counters().len(),
        "Route table finalized"
    );
    Ok(dispatcher)
}
