//! Per-template request counter
//!
//! Counts every matched request under the route *template* it matched, so
//! `/greeting/alice` and `/greeting/bob` both land on
//! `request_counter{path="/greeting/{name}"}`.

use crate::error::AppResult;
use crate::metrics::MetricRegistry;
use axum::{
    extract::{MatchedPath, Request, State},
    middleware::Next,
    response::Response,
};
use prometheus::IntCounter;
use std::collections::HashMap;
use std::sync::Arc;

/// Default metric name of the per-template counter
pub const REQUEST_COUNTER: &str = "request_counter";

/// Label carrying the endpoint (template) on every greetwatch metric
pub const PATH_LABEL: &str = "path";

/// One counter per registered template
///
/// Built once when the route table is finalized and read-only afterwards, so
/// the middleware never takes a lock.
#[derive(Clone, Default)]
pub struct TemplateCounters {
    counters: Arc<HashMap<String, IntCounter>>,
}

impl TemplateCounters {
    /// Register `name{path="<template>"}` for each template
    ///
    /// # Errors
    ///
    /// Returns an error if the registry rejects any of the counters.
    pub fn register<'a>(
        registry: &MetricRegistry,
        name: &str,
        templates: impl IntoIterator<Item = &'a str>,
    ) -> AppResult<Self> {
        let mut counters = HashMap::new();
        for template in templates {
            let identity = registry.identity(name).with_label(PATH_LABEL, template);
            counters.insert(template.to_string(), registry.register_counter(identity)?);
        }
        Ok(Self {
            counters: Arc::new(counters),
        })
    }

    pub fn get(&self, template: &str) -> Option<&IntCounter> {
        self.counters.get(template)
    }

    pub fn len(&self) -> usize {
        self.counters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counters.is_empty()
    }
}

/// Middleware that increments the matched template's counter once the route
/// has produced a response
///
/// Must be installed with `Router::route_layer` so that `MatchedPath` is set.
/// Unmatched requests never reach it.
pub async fn count_by_template(
    State(counters): State<TemplateCounters>,
    request: Request,
    next: Next,
) -> Response {
    let template = request
        .extensions()
        .get::<MatchedPath>()
        .map(|matched| matched.as_str().to_string());

    let response = next.run(request).await;

    match template.as_deref() {
        Some(template) => match counters.get(template) {
            Some(counter) => counter.inc(),
            None => tracing::warn!(
                template = %template,
                "No request counter registered for matched template"
            ),
        },
        None => tracing::warn!("Request reached template counter without a matched path"),
    }

    response
}
