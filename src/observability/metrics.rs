use crate::error::{SearchError, SearchResult};
use prometheus::{
    core::Collector, Encoder, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry, TextEncoder,
};
use std::sync::Arc;
use std::time::Instant;

/// Prometheus registry holding the search endpoint collectors
#[derive(Clone)]
pub struct MetricsRegistry {
    registry: Arc<Registry>,
    pub metrics: Arc<SearchMetrics>,
}

/// Per-endpoint search collectors, labelled by `endpoint` (`lexical` or `semantic`)
pub struct SearchMetrics {
    pub search_requests_total: IntCounterVec,
    pub search_errors_total: IntCounterVec,
    pub search_timeouts_total: IntCounterVec,
    pub search_duration_seconds: HistogramVec,
    pub search_items_returned: HistogramVec,
}

impl MetricsRegistry {
    pub fn new() -> SearchResult<Self> {
        let registry = Arc::new(Registry::new());
        let metrics = Arc::new(SearchMetrics::new(&registry)?);

        Ok(Self { registry, metrics })
    }

    /// Metrics in Prometheus text exposition format
    pub fn gather(&self) -> SearchResult<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();

        let mut buffer = Vec::new();
        encoder
            .encode(&metric_families, &mut buffer)
            .map_err(|e| SearchError::Internal(format!("Failed to encode metrics: {}", e)))?;

        String::from_utf8(buffer)
            .map_err(|e| SearchError::Internal(format!("Failed to convert metrics to string: {}", e)))
    }

    pub fn content_type(&self) -> String {
        TextEncoder::new().format_type().to_string()
    }
}

fn register<C: Collector + Clone + 'static>(registry: &Registry, collector: &C, name: &str) -> SearchResult<()> {
    registry
        .register(Box::new(collector.clone()))
        .map_err(|e| SearchError::Internal(format!("Failed to register {}: {}", name, e)))
}

impl SearchMetrics {
    fn new(registry: &Registry) -> SearchResult<Self> {
        let search_requests_total = IntCounterVec::new(
            Opts::new("search_requests_total", "Total number of search requests processed"),
            &["endpoint"],
        )
        .map_err(|e| SearchError::Internal(format!("Failed to create search_requests_total metric: {}", e)))?;

        let search_errors_total = IntCounterVec::new(
            Opts::new("search_errors_total", "Total number of failed search requests"),
            &["endpoint", "error_type"],
        )
        .map_err(|e| SearchError::Internal(format!("Failed to create search_errors_total metric: {}", e)))?;

        let search_timeouts_total = IntCounterVec::new(
            Opts::new("search_timeouts_total", "Total number of search requests that hit a deadline"),
            &["endpoint"],
        )
        .map_err(|e| SearchError::Internal(format!("Failed to create search_timeouts_total metric: {}", e)))?;

        let search_duration_seconds = HistogramVec::new(
            HistogramOpts::new("search_duration_seconds", "Duration of search requests in seconds")
                .buckets(vec![0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 4.0]),
            &["endpoint"],
        )
        .map_err(|e| SearchError::Internal(format!("Failed to create search_duration_seconds metric: {}", e)))?;

        let search_items_returned = HistogramVec::new(
            HistogramOpts::new("search_items_returned", "Number of items returned per search page")
                .buckets(vec![0.0, 1.0, 5.0, 10.0, 20.0, 24.0]),
            &["endpoint"],
        )
        .map_err(|e| SearchError::Internal(format!("Failed to create search_items_returned metric: {}", e)))?;

        register(registry, &search_requests_total, "search_requests_total")?;
        register(registry, &search_errors_total, "search_errors_total")?;
        register(registry, &search_timeouts_total, "search_timeouts_total")?;
        register(registry, &search_duration_seconds, "search_duration_seconds")?;
        register(registry, &search_items_returned, "search_items_returned")?;

        Ok(Self {
            search_requests_total,
            search_errors_total,
            search_timeouts_total,
            search_duration_seconds,
            search_items_returned,
        })
    }

    /// Count a finished search on `endpoint`
    pub fn record_outcome(&self, endpoint: &str, outcome: Result<usize, &SearchError>) {
        self.search_requests_total.with_label_values(&[endpoint]).inc();
        match outcome {
            Ok(items) => self
                .search_items_returned
                .with_label_values(&[endpoint])
                .observe(items as f64),
            Err(error) => {
                if matches!(error, SearchError::Timeout) {
                    self.search_timeouts_total.with_label_values(&[endpoint]).inc();
                }
                self.search_errors_total
                    .with_label_values(&[endpoint, error.error_type()])
                    .inc();
            }
        }
    }

    pub fn start_timer(&self, endpoint: &str) -> Timer {
        Timer::new(self.search_duration_seconds.with_label_values(&[endpoint]))
    }
}

/// Records elapsed time into a histogram when observed
pub struct Timer {
    start: Instant,
    histogram: prometheus::Histogram,
}

impl Timer {
    pub fn new(histogram: prometheus::Histogram) -> Self {
        Self {
            start: Instant::now(),
            histogram,
        }
    }

    pub fn observe(self) {
        self.histogram.observe(self.start.elapsed().as_secs_f64());
    }
}
