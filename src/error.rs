//! Error types for greetwatch
//!
//! Startup errors (configuration, route and metric registration) and
//! request-time errors share one enum. All variants implement `IntoResponse`
//! so handlers can return them directly.

use crate::metrics::MetricKind;
use axum::{
    http::{Method, StatusCode},
    response::{IntoResponse, Response},
};
use thiserror::Error;

/// Main error type for the application
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to read config file '{path}': {source}")]
    ConfigFileRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file '{path}': {source}")]
    ConfigParseFailed {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid configuration in '{path}': {reason}")]
    ConfigValidationFailed { path: String, reason: String },

    #[error("Route {method} {template} is already registered")]
    DuplicateRoute { template: String, method: Method },

    #[error("Route template '{template}' conflicts with registered template '{existing}'")]
    ConflictingRoute { template: String, existing: String },

    #[error("Invalid route template '{template}': {reason}")]
    InvalidRouteTemplate { template: String, reason: String },

    #[error("Method {0} cannot be used as a route filter")]
    UnsupportedMethod(Method),

    #[error("Metric '{metric}' is already registered as a {registered}, cannot register it as a {requested}")]
    MetricKindConflict {
        metric: String,
        registered: MetricKind,
        requested: MetricKind,
    },

    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        (StatusCode::INTERNAL_SERVER_ERROR, self.to_string()).into_response()
    }
}

/// Convenience type alias for Results
pub type AppResult<T> = Result<T, AppError>;
