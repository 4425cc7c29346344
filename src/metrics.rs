//! Prometheus metric registry for greetwatch
//!
//! Wraps a `prometheus::Registry` with an identity table so that handler
//! wrappers and the router can register their metrics by
//! (namespace, subsystem, name, labels) without tripping over duplicates:
//!
//! - Registering an identity twice with the same kind returns the existing handle.
//! - Registering it with a different kind is rejected.
//!
//! Metric updates go straight to the prometheus atomics. The identity table is
//! only locked while registering or taking a snapshot.

use crate::error::{AppError, AppResult};
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntGauge, Opts, Registry, TextEncoder,
};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::{Mutex, MutexGuard};

const COUNTER_HELP: &str = "Total HTTP requests count for specific endpoint.";
const GAUGE_HELP: &str = "Total HTTP requests in progress for specific endpoint.";
const HISTOGRAM_HELP: &str = "HTTP requests latency distribution for specific endpoint.";

/// Unique identity of one metric time series
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MetricIdentity {
    namespace: String,
    subsystem: String,
    name: String,
    labels: BTreeMap<String, String>,
}

impl MetricIdentity {
    pub fn new(
        namespace: impl Into<String>,
        subsystem: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            subsystem: subsystem.into(),
            name: name.into(),
            labels: BTreeMap::new(),
        }
    }

    /// Add a constant label to the identity
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn subsystem(&self) -> &str {
        &self.subsystem
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn labels(&self) -> &BTreeMap<String, String> {
        &self.labels
    }

    /// Fully qualified family name, e.g. `greetwatch_api_request_latency`
    ///
    /// Empty namespace or subsystem parts are skipped, the same way
    /// prometheus builds the name from `Opts`.
    pub fn fq_name(&self) -> String {
        [self.namespace.as_str(), self.subsystem.as_str(), self.name.as_str()]
            .into_iter()
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join("_")
    }

    fn const_labels(&self) -> HashMap<String, String> {
        self.labels
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

impl fmt::Display for MetricIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.fq_name())?;
        if !self.labels.is_empty() {
            let labels: Vec<String> = self
                .labels
                .iter()
                .map(|(k, v)| format!("{}=\"{}\"", k, v))
                .collect();
            write!(f, "{{{}}}", labels.join(","))?;
        }
        Ok(())
    }
}

/// Kind of a registered metric
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    Counter,
    Gauge,
    Histogram,
}

impl MetricKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Counter => "counter",
            MetricKind::Gauge => "gauge",
            MetricKind::Histogram => "histogram",
        }
    }

    fn help(&self) -> &'static str {
        match self {
            MetricKind::Counter => COUNTER_HELP,
            MetricKind::Gauge => GAUGE_HELP,
            MetricKind::Histogram => HISTOGRAM_HELP,
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point-in-time value of one metric
#[derive(Debug, Clone, PartialEq)]
pub enum MetricValue {
    Counter(u64),
    Gauge(i64),
    Histogram { count: u64, sum: f64 },
}

/// One entry of [`MetricRegistry::snapshot`]
#[derive(Debug, Clone, PartialEq)]
pub struct MetricSnapshot {
    pub identity: MetricIdentity,
    pub kind: MetricKind,
    pub value: MetricValue,
}

#[derive(Clone)]
enum RegisteredMetric {
    Counter(IntCounter),
    Gauge(IntGauge),
    Histogram(Histogram),
}

impl RegisteredMetric {
    fn kind(&self) -> MetricKind {
        match self {
            RegisteredMetric::Counter(_) => MetricKind::Counter,
            RegisteredMetric::Gauge(_) => MetricKind::Gauge,
            RegisteredMetric::Histogram(_) => MetricKind::Histogram,
        }
    }

    fn value(&self) -> MetricValue {
        match self {
            RegisteredMetric::Counter(c) => MetricValue::Counter(c.get()),
            RegisteredMetric::Gauge(g) => MetricValue::Gauge(g.get()),
            RegisteredMetric::Histogram(h) => MetricValue::Histogram {
                count: h.get_sample_count(),
                sum: h.get_sample_sum(),
            },
        }
    }
}

#[derive(Default)]
struct IdentityTable {
    metrics: BTreeMap<MetricIdentity, RegisteredMetric>,
    // One TYPE per family in the exposition format
    family_kinds: HashMap<String, MetricKind>,
}

/// Process-wide metric registry
///
/// Owned explicitly (usually behind an `Arc` in `AppState`) rather than held in
/// a global, so every test can build an isolated registry.
pub struct MetricRegistry {
    registry: Registry,
    namespace: String,
    subsystem: String,
    buckets: Vec<f64>,
    table: Mutex<IdentityTable>,
}

impl MetricRegistry {
    /// Create a registry whose [`identity`](Self::identity) helper uses the given
    /// namespace and subsystem
    pub fn new(namespace: impl Into<String>, subsystem: impl Into<String>) -> Self {
        Self {
            registry: Registry::new(),
            namespace: namespace.into(),
            subsystem: subsystem.into(),
            buckets: prometheus::DEFAULT_BUCKETS.to_vec(),
            table: Mutex::new(IdentityTable::default()),
        }
    }

    /// Override the histogram buckets used for latency metrics
    pub fn with_buckets(mut self, buckets: Vec<f64>) -> Self {
        self.buckets = buckets;
        self
    }

    /// Register the process collector (CPU, memory, open fds)
    ///
    /// # Errors
    ///
    /// Returns an error if the collector was already registered.
    #[cfg(target_os = "linux")]
    pub fn register_process_collector(&self) -> AppResult<()> {
        let collector = prometheus::process_collector::ProcessCollector::for_self();
        self.registry.register(Box::new(collector))?;
        tracing::debug!("Registered process metrics collector");
        Ok(())
    }

    /// Process metrics are only collected on Linux
    #[cfg(not(target_os = "linux"))]
    pub fn register_process_collector(&self) -> AppResult<()> {
        tracing::debug!("Process metrics are not supported on this platform");
        Ok(())
    }

    /// Build an identity in this registry's namespace and subsystem
    pub fn identity(&self, name: impl Into<String>) -> MetricIdentity {
        MetricIdentity::new(self.namespace.clone(), self.subsystem.clone(), name)
    }

    /// Register (or fetch) a counter
    ///
    /// # Errors
    ///
    /// Returns [`AppError::MetricKindConflict`] if the identity or its family is
    /// already registered with another kind, or a prometheus error if the
    /// name or labels are invalid.
    pub fn register_counter(&self, identity: MetricIdentity) -> AppResult<IntCounter> {
        let metric = self.register(identity, MetricKind::Counter, |identity| {
            let counter = IntCounter::with_opts(Self::opts(identity, MetricKind::Counter))?;
            Ok(RegisteredMetric::Counter(counter))
        })?;
        match metric {
            RegisteredMetric::Counter(counter) => Ok(counter),
            other => Err(Self::unexpected_kind(other.kind(), MetricKind::Counter)),
        }
    }

    /// Register (or fetch) a gauge
    ///
    /// # Errors
    ///
    /// Same as [`register_counter`](Self::register_counter).
    pub fn register_gauge(&self, identity: MetricIdentity) -> AppResult<IntGauge> {
        let metric = self.register(identity, MetricKind::Gauge, |identity| {
            let gauge = IntGauge::with_opts(Self::opts(identity, MetricKind::Gauge))?;
            Ok(RegisteredMetric::Gauge(gauge))
        })?;
        match metric {
            RegisteredMetric::Gauge(gauge) => Ok(gauge),
            other => Err(Self::unexpected_kind(other.kind(), MetricKind::Gauge)),
        }
    }

    /// Register (or fetch) a histogram using the registry's buckets
    ///
    /// # Errors
    ///
    /// Same as [`register_counter`](Self::register_counter).
    pub fn register_histogram(&self, identity: MetricIdentity) -> AppResult<Histogram> {
        let buckets = self.buckets.clone();
        let metric = self.register(identity, MetricKind::Histogram, move |identity| {
            let opts = HistogramOpts::new(identity.name(), MetricKind::Histogram.help())
                .namespace(identity.namespace())
                .subsystem(identity.subsystem())
                .const_labels(identity.const_labels())
                .buckets(buckets);
            Ok(RegisteredMetric::Histogram(Histogram::with_opts(opts)?))
        })?;
        match metric {
            RegisteredMetric::Histogram(histogram) => Ok(histogram),
            other => Err(Self::unexpected_kind(other.kind(), MetricKind::Histogram)),
        }
    }

    fn register<F>(
        &self,
        identity: MetricIdentity,
        kind: MetricKind,
        create: F,
    ) -> AppResult<RegisteredMetric>
    where
        F: FnOnce(&MetricIdentity) -> Result<RegisteredMetric, prometheus::Error>,
    {
        let mut table = self
            .table
            .lock()
            .map_err(|_| AppError::Internal("metric identity table lock poisoned".to_string()))?;

        if let Some(existing) = table.metrics.get(&identity) {
            if existing.kind() != kind {
                return Err(AppError::MetricKindConflict {
                    metric: identity.to_string(),
                    registered: existing.kind(),
                    requested: kind,
                });
            }
            return Ok(existing.clone());
        }

        let family = identity.fq_name();
        if let Some(&registered) = table.family_kinds.get(&family) {
            if registered != kind {
                return Err(AppError::MetricKindConflict {
                    metric: family,
                    registered,
                    requested: kind,
                });
            }
        }

        let metric = create(&identity)?;
        let collector: Box<dyn prometheus::core::Collector> = match &metric {
            RegisteredMetric::Counter(c) => Box::new(c.clone()),
            RegisteredMetric::Gauge(g) => Box::new(g.clone()),
            RegisteredMetric::Histogram(h) => Box::new(h.clone()),
        };
        self.registry.register(collector)?;

        tracing::debug!(metric = %identity, kind = %kind, "Registered metric");

        table.family_kinds.insert(family, kind);
        table.metrics.insert(identity, metric.clone());
        Ok(metric)
    }

    fn opts(identity: &MetricIdentity, kind: MetricKind) -> Opts {
        Opts::new(identity.name(), kind.help())
            .namespace(identity.namespace())
            .subsystem(identity.subsystem())
            .const_labels(identity.const_labels())
    }

    fn unexpected_kind(found: MetricKind, requested: MetricKind) -> AppError {
        AppError::Internal(format!(
            "identity table returned a {} for a {} registration",
            found, requested
        ))
    }

    /// Current value of every registered metric
    ///
    /// Each value is read atomically on its own; there is no cross-metric
    /// consistency.
    pub fn snapshot(&self) -> Vec<MetricSnapshot> {
        let Some(table) = self.read_table("snapshot") else {
            return Vec::new();
        };
        let entries: Vec<(MetricIdentity, RegisteredMetric)> = table
            .metrics
            .iter()
            .map(|(identity, metric)| (identity.clone(), metric.clone()))
            .collect();
        drop(table);

        entries
            .into_iter()
            .map(|(identity, metric)| MetricSnapshot {
                kind: metric.kind(),
                value: metric.value(),
                identity,
            })
            .collect()
    }

    /// Current value of a single metric, if registered
    pub fn lookup(&self, identity: &MetricIdentity) -> Option<MetricValue> {
        let metric = self.read_table("lookup")?.metrics.get(identity).cloned()?;
        Some(metric.value())
    }

    /// Number of registered identities (process collector excluded)
    pub fn len(&self) -> usize {
        self.read_table("len").map_or(0, |table| table.metrics.len())
    }

    // A poisoned table reads as empty
    fn read_table(&self, operation: &'static str) -> Option<MutexGuard<'_, IdentityTable>> {
        match self.table.lock() {
            Ok(table) => Some(table),
            Err(_) => {
                tracing::error!(operation, "Metric identity table lock poisoned, reading as empty");
                None
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Content type of [`gather`](Self::gather) output
    pub fn content_type(&self) -> String {
        TextEncoder::new().format_type().to_string()
    }

    /// Encode every registered metric in Prometheus text format
    ///
    /// # Errors
    ///
    /// Returns an error if metric encoding fails.
    pub fn gather(&self) -> Result<String, prometheus::Error> {
        let metric_families = self.registry.gather();
        let metric_count = metric_families.len();

        tracing::debug!(
            metric_family_count = metric_count,
            "Encoding metrics to Prometheus text format"
        );

        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&metric_families, &mut buffer)
            .map_err(|e| {
                tracing::error!(
                    error = %e,
                    metric_family_count = metric_count,
                    "Prometheus text encoder failed"
                );
                e
            })?;

        String::from_utf8(buffer).map_err(|e| {
            tracing::error!(
                invalid_byte_index = e.utf8_error().valid_up_to(),
                "Prometheus encoder produced invalid UTF-8"
            );
            prometheus::Error::Msg(format!("Metrics output is not valid UTF-8: {}", e))
        })
    }
}

impl fmt::Debug for MetricRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetricRegistry")
            .field("namespace", &self.namespace)
            .field("subsystem", &self.subsystem)
            .field("metrics", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn registry() -> MetricRegistry {
        MetricRegistry::new("greetwatch", "api")
    }

    #[test]
    fn test_poisoned_table_reads_as_empty() {
        let registry = Arc::new(registry());
        let counter_id = registry.identity("requests").with_label("path", "/");
        registry.register_counter(counter_id.clone()).unwrap();

        let poisoner = Arc::clone(&registry);
        let joined = thread::spawn(move || {
            let _guard = poisoner.table.lock().unwrap();
            panic!("poison the identity table");
        })
        .join();
        assert!(joined.is_err());

        assert_eq!(registry.lookup(&counter_id), None);
        assert_eq!(registry.len(), 0);
        assert!(registry.is_empty());
        assert!(registry.snapshot().is_empty());
        assert!(matches!(
            registry.register_counter(counter_id),
            Err(AppError::Internal(_))
        ));
    }

    #[test]
    fn test_fq_name_joins_parts() {
        let id = MetricIdentity::new("greetwatch", "api", "request_latency");
        assert_eq!(id.fq_name(), "greetwatch_api_request_latency");

        let id = MetricIdentity::new("", "api", "request_latency");
        assert_eq!(id.fq_name(), "api_request_latency");
    }

    #[test]
    fn test_identity_display_includes_labels() {
        let id = MetricIdentity::new("greetwatch", "api", "request_counter")
            .with_label("path", "/greeting/{name}");
        assert_eq!(
            id.to_string(),
            "greetwatch_api_request_counter{path=\"/greeting/{name}\"}"
        );
    }

    #[test]
    fn test_counter_registration_is_idempotent() {
        let registry = registry();
        let id = registry.identity("hits").with_label("path", "/");

        let first = registry.register_counter(id.clone()).unwrap();
        let second = registry.register_counter(id.clone()).unwrap();
        first.inc();
        second.inc();

        assert_eq!(first.get(), 2);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.lookup(&id), Some(MetricValue::Counter(2)));
    }

    #[test]
    fn test_same_identity_different_kind_is_rejected() {
        let registry = registry();
        let id = registry.identity("hits");
        registry.register_counter(id.clone()).unwrap();

        let err = registry.register_gauge(id).unwrap_err();
        assert!(matches!(
            err,
            AppError::MetricKindConflict {
                registered: MetricKind::Counter,
                requested: MetricKind::Gauge,
                ..
            }
        ));
    }

    #[test]
    fn test_same_family_different_kind_is_rejected() {
        let registry = registry();
        registry
            .register_counter(registry.identity("hits").with_label("path", "/a"))
            .unwrap();

        let err = registry
            .register_histogram(registry.identity("hits").with_label("path", "/b"))
            .unwrap_err();
        assert!(matches!(err, AppError::MetricKindConflict { .. }));
    }

    #[test]
    fn test_same_family_different_labels_share_family() {
        let registry = registry();
        let a = registry
            .register_gauge(registry.identity("in_flight").with_label("path", "/a"))
            .unwrap();
        let b = registry
            .register_gauge(registry.identity("in_flight").with_label("path", "/b"))
            .unwrap();
        a.inc();
        b.dec();

        let output = registry.gather().unwrap();
        assert_eq!(
            output.matches("# TYPE greetwatch_api_in_flight gauge").count(),
            1
        );
        assert!(output.contains("greetwatch_api_in_flight{path=\"/a\"} 1"));
        assert!(output.contains("greetwatch_api_in_flight{path=\"/b\"} -1"));
    }

    #[test]
    fn test_invalid_metric_name_is_rejected() {
        let registry = registry();
        let result = registry.register_counter(registry.identity("bad-name"));
        assert!(matches!(result, Err(AppError::Metrics(_))));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_snapshot_reports_every_kind() {
        let registry = registry();
        let counter = registry.register_counter(registry.identity("c")).unwrap();
        let gauge = registry.register_gauge(registry.identity("g")).unwrap();
        let histogram = registry
            .register_histogram(registry.identity("h"))
            .unwrap();

        counter.inc();
        gauge.add(3);
        histogram.observe(0.25);
        histogram.observe(0.75);

        let snapshot = registry.snapshot();
        assert_eq!(snapshot.len(), 3);

        let find = |name: &str| {
            snapshot
                .iter()
                .find(|s| s.identity.name() == name)
                .cloned()
                .unwrap()
        };
        assert_eq!(find("c").value, MetricValue::Counter(1));
        assert_eq!(find("g").kind, MetricKind::Gauge);
        assert_eq!(find("g").value, MetricValue::Gauge(3));
        assert_eq!(
            find("h").value,
            MetricValue::Histogram {
                count: 2,
                sum: 1.0
            }
        );
    }

    #[test]
    fn test_lookup_unknown_identity_is_none() {
        let registry = registry();
        assert_eq!(registry.lookup(&registry.identity("missing")), None);
    }

    #[test]
    fn test_custom_buckets_appear_in_output() {
        let registry = registry().with_buckets(vec![0.5, 1.0, 30.0]);
        let histogram = registry
            .register_histogram(registry.identity("latency"))
            .unwrap();
        histogram.observe(0.1);

        let output = registry.gather().unwrap();
        assert!(output.contains("le=\"0.5\""));
        assert!(output.contains("le=\"30\""));
        assert!(output.contains("greetwatch_api_latency_count 1"));
    }

    #[test]
    fn test_gather_produces_prometheus_text_format() {
        let registry = registry();
        registry
            .register_counter(registry.identity("request_counter").with_label("path", "/"))
            .unwrap()
            .inc();

        let output = registry.gather().unwrap();
        assert!(output.contains("# HELP greetwatch_api_request_counter"));
        assert!(output.contains("# TYPE greetwatch_api_request_counter counter"));
        assert!(output.contains("greetwatch_api_request_counter{path=\"/\"} 1"));
        assert!(registry.content_type().starts_with("text/plain"));
    }

    #[test]
    fn test_concurrent_registration_and_updates() {
        let registry = Arc::new(registry());
        let mut handles = vec![];

        for _ in 0..16 {
            let r = Arc::clone(&registry);
            handles.push(thread::spawn(move || {
                let counter = r
                    .register_counter(r.identity("shared").with_label("path", "/x"))
                    .expect("registration should succeed");
                for _ in 0..100 {
                    counter.inc();
                }
            }));
        }

        for handle in handles {
            handle.join().expect("Thread should not panic");
        }

        let id = registry.identity("shared").with_label("path", "/x");
        assert_eq!(registry.lookup(&id), Some(MetricValue::Counter(1600)));
        assert_eq!(registry.len(), 1);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_process_collector_registers_once() {
        let registry = registry();
        registry.register_process_collector().unwrap();
        assert!(registry.register_process_collector().is_err());

        let output = registry.gather().unwrap();
        assert!(output.contains("process_"));
        assert!(registry.is_empty());
    }
}
