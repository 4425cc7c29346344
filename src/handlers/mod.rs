//! HTTP request handlers for greetwatch

use crate::config::Config;
use crate::error::AppResult;
use crate::metrics::MetricRegistry;
use std::sync::Arc;

pub mod greetings;
pub mod metrics;

/// Application state shared across all handlers
///
/// All fields are Arc'd for cheap cloning into route closures.
#[derive(Clone)]
pub struct AppState {
    config: Arc<Config>,
    registry: Arc<MetricRegistry>,
}

impl AppState {
    /// Create a new AppState from configuration
    ///
    /// Builds the metric registry from the `[observability]` section.
    ///
    /// # Errors
    ///
    /// Returns an error if the process collector cannot be registered.
    pub fn new(config: Arc<Config>) -> AppResult<Self> {
        let observability = &config.observability;
        let mut registry =
            MetricRegistry::new(observability.namespace.clone(), observability.subsystem.clone());
        if let Some(buckets) = &observability.latency_buckets {
            registry = registry.with_buckets(buckets.clone());
        }
        if observability.process_metrics {
            registry.register_process_collector()?;
        }

        Ok(Self {
            config,
            registry: Arc::new(registry),
        })
    }

    /// Get reference to the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Get reference to the metric registry
    pub fn registry(&self) -> &Arc<MetricRegistry> {
        &self.registry
    }
}
