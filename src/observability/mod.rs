//! Tracing setup, log sanitizing and Prometheus metrics

pub mod logging;
pub mod metrics;
pub mod tracing;

pub use logging::sanitize_query;
pub use metrics::{MetricsRegistry, SearchMetrics, Timer};
pub use self::tracing::init_tracing;
