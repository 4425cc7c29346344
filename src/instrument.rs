//! Handler instrumentation wrappers
//!
//! Each constructor registers one metric labelled `path="<endpoint>"` and
//! returns a handler with the same contract as the one it wraps:
//!
//! - [`count`]: counter incremented after the inner handler returns
//! - [`in_progress`]: gauge held up for the lifetime of the call
//! - [`latency`]: histogram of call duration in seconds
//!
//! Wrappers nest in any order, e.g.
//! `in_progress(&registry, "requests_in_progress", "/x", latency(&registry, "request_latency", "/x", handler)?)?`.
//!
//! The gauge decrement and the latency observation live in drop guards, so
//! they fire when the inner handler returns an error, panics, or its future
//! is dropped before completion.

use crate::error::AppResult;
use crate::metrics::MetricRegistry;
use crate::middleware::PATH_LABEL;
use crate::router::{Handler, HandlerResult, RouteRequest};
use async_trait::async_trait;
use prometheus::{Histogram, IntCounter, IntGauge};

/// Handler wrapped with a request counter
pub struct Counted<H> {
    inner: H,
    counter: IntCounter,
}

/// Handler wrapped with an in-progress gauge
pub struct InProgress<H> {
    inner: H,
    gauge: IntGauge,
}

/// Handler wrapped with a latency histogram
pub struct Timed<H> {
    inner: H,
    histogram: Histogram,
}

/// Count completed calls of `inner` in counter `name{path=endpoint}`
///
/// The increment happens after the inner handler returns, whether it returned
/// a response or an error. A call that panics is not counted.
///
/// # Errors
///
/// Returns an error if the counter cannot be registered.
pub fn count<H: Handler>(
    registry: &MetricRegistry,
    name: &str,
    endpoint: &str,
    inner: H,
) -> AppResult<Counted<H>> {
    let identity = registry.identity(name).with_label(PATH_LABEL, endpoint);
    let counter = registry.register_counter(identity)?;
    Ok(Counted { inner, counter })
}

/// Track calls of `inner` currently in flight in gauge `name{path=endpoint}`
///
/// # Errors
///
/// Returns an error if the gauge cannot be registered.
pub fn in_progress<H: Handler>(
    registry: &MetricRegistry,
    name: &str,
    endpoint: &str,
    inner: H,
) -> AppResult<InProgress<H>> {
    let identity = registry.identity(name).with_label(PATH_LABEL, endpoint);
    let gauge = registry.register_gauge(identity)?;
    Ok(InProgress { inner, gauge })
}

/// Observe the wall-clock duration of every call of `inner` in histogram
/// `name{path=endpoint}`
///
/// # Errors
///
/// Returns an error if the histogram cannot be registered.
pub fn latency<H: Handler>(
    registry: &MetricRegistry,
    name: &str,
    endpoint: &str,
    inner: H,
) -> AppResult<Timed<H>> {
    let identity = registry.identity(name).with_label(PATH_LABEL, endpoint);
    let histogram = registry.register_histogram(identity)?;
    Ok(Timed { inner, histogram })
}

impl<H> Counted<H> {
    pub fn counter(&self) -> &IntCounter {
        &self.counter
    }
}

impl<H> InProgress<H> {
    pub fn gauge(&self) -> &IntGauge {
        &self.gauge
    }
}

impl<H> Timed<H> {
    pub fn histogram(&self) -> &Histogram {
        &self.histogram
    }
}

#[async_trait]
impl<H: Handler> Handler for Counted<H> {
    async fn call(&self, request: RouteRequest) -> HandlerResult {
        let result = self.inner.call(request).await;
        self.counter.inc();
        result
    }
}

/// Holds the gauge up until dropped
struct InFlight {
    gauge: IntGauge,
}

impl InFlight {
    fn enter(gauge: &IntGauge) -> Self {
        gauge.inc();
        Self {
            gauge: gauge.clone(),
        }
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.gauge.dec();
    }
}

#[async_trait]
impl<H: Handler> Handler for InProgress<H> {
    async fn call(&self, request: RouteRequest) -> HandlerResult {
        let _in_flight = InFlight::enter(&self.gauge);
        self.inner.call(request).await
    }
}

#[async_trait]
impl<H: Handler> Handler for Timed<H> {
    async fn call(&self, request: RouteRequest) -> HandlerResult {
        // HistogramTimer observes on drop
        let _timer = self.histogram.start_timer();
        self.inner.call(request).await
    }
}
