//! greetwatch - greeting service with composable Prometheus handler instrumentation
//!
//! Handlers are wrapped with counter, in-progress gauge and latency histogram
//! decorators from [`instrument`] before being registered in a
//! [`router::RouteTable`]. The built [`router::Dispatcher`] counts every matched
//! request per route template and serves `/metrics` from an explicitly owned
//! [`metrics::MetricRegistry`].

pub mod app;
pub mod cli;
pub mod config;
pub mod error;
pub mod handlers;
pub mod instrument;
pub mod metrics;
pub mod middleware;
pub mod router;
pub mod telemetry;
