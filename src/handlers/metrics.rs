//! Prometheus metrics endpoint
//!
//! Exposes the registry in Prometheus text format for scraping.

use crate::metrics::MetricRegistry;
use crate::router::{Handler, HandlerResult, RouteRequest};
use axum::{http::header, response::IntoResponse};
use std::sync::Arc;

/// Handler for `GET /metrics`
///
/// Encodes the registry at request time, never a cached copy.
///
/// # Response
///
/// - `200 OK` with metrics in Prometheus text format
/// - `500 Internal Server Error` if metrics encoding fails
///
/// # Example
///
/// ```bash
/// curl http://localhost:8000/metrics
/// # HELP greetwatch_api_request_counter Total HTTP requests count for specific endpoint.
/// # TYPE greetwatch_api_request_counter counter
/// greetwatch_api_request_counter{path="/greeting/{name}"} 2
/// ```
pub fn handler(registry: Arc<MetricRegistry>) -> impl Handler {
    move |_request: RouteRequest| {
        let registry = Arc::clone(&registry);
        async move { render(&registry) }
    }
}

/// Encode `registry` as a metrics response
pub fn render(registry: &MetricRegistry) -> HandlerResult {
    let body = registry.gather().map_err(|e| {
        tracing::error!(error = %e, "Failed to gather metrics for Prometheus scraping");
        e
    })?;
    Ok(([(header::CONTENT_TYPE, registry.content_type())], body).into_response())
}
