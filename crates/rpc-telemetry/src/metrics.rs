//! Prometheus metrics for request/response handling.
//!
//! All metrics follow the naming convention: `rpc_<metric>_<unit>`
//!
//! Metrics count from first use; `register_metrics` only makes them visible
//! to `encode_metrics`.

use lazy_static::lazy_static;
use prometheus::{
    exponential_buckets, Counter, CounterVec, Encoder, Gauge, Histogram, HistogramOpts, Opts,
    Registry, TextEncoder,
};
use std::sync::Arc;

use crate::TelemetryError;

lazy_static! {
    /// Global metrics registry
    pub static ref REGISTRY: Registry = Registry::new();

    /// Requests published with a correlation id
    pub static ref REQUESTS_SENT: Counter = Counter::new(
        "rpc_requests_sent_total",
        "Total requests published"
    ).expect("metric creation failed");

    /// Replies handed to a waiting caller
    pub static ref REPLIES_DELIVERED: Counter = Counter::new(
        "rpc_replies_delivered_total",
        "Total replies delivered to a waiting caller"
    ).expect("metric creation failed");

    /// Requests resolved by the timeout arm
    pub static ref REQUEST_TIMEOUTS: Counter = Counter::new(
        "rpc_request_timeouts_total",
        "Total requests that received no reply in time"
    ).expect("metric creation failed");

    /// Requests resolved by caller cancellation or deadline
    pub static ref REQUESTS_CANCELLED: Counter = Counter::new(
        "rpc_requests_cancelled_total",
        "Total requests cancelled by the caller"
    ).expect("metric creation failed");

    /// Publish failures
    pub static ref PUBLISH_FAILURES: Counter = Counter::new(
        "rpc_publish_failures_total",
        "Total requests whose publish failed"
    ).expect("metric creation failed");

    /// Inbound replies that matched no waiter
    pub static ref REPLIES_DROPPED: CounterVec = CounterVec::new(
        Opts::new("rpc_replies_dropped_total", "Inbound replies dropped without delivery"),
        &["reason"]  // reason: missing_correlation/unknown_id/waiter_gone
    ).expect("metric creation failed");

    /// Abandoned registry entries removed by the sweeper
    pub static ref CORRELATION_ENTRIES_SWEPT: Counter = Counter::new(
        "rpc_correlation_entries_swept_total",
        "Total abandoned correlation entries removed by the sweeper"
    ).expect("metric creation failed");

    /// Requests currently awaiting a reply
    pub static ref PENDING_REQUESTS: Gauge = Gauge::new(
        "rpc_pending_requests",
        "Requests currently awaiting a reply"
    ).expect("metric creation failed");

    /// Time from publish to reply
    pub static ref REQUEST_DURATION: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            "rpc_request_duration_seconds",
            "Time from publishing a request to receiving its reply"
        ).buckets(exponential_buckets(0.0005, 2.0, 16).expect("valid buckets"))
    ).expect("metric creation failed");
}

/// Handle to the registry the metrics were registered with.
pub struct MetricsHandle {
    registry: Arc<Registry>,
}

impl MetricsHandle {
    /// Render the registry in Prometheus text format.
    pub fn gather(&self) -> Result<String, TelemetryError> {
        encode(&self.registry)
    }
}

/// Register all metrics with the global registry.
///
/// Registering twice reports an `AlreadyReg` error from prometheus; callers
/// that may initialize more than once can ignore it.
pub fn register_metrics() -> Result<MetricsHandle, TelemetryError> {
    let metrics: Vec<Box<dyn prometheus::core::Collector>> = vec![
        Box::new(REQUESTS_SENT.clone()),
        Box::new(REPLIES_DELIVERED.clone()),
        Box::new(REQUEST_TIMEOUTS.clone()),
        Box::new(REQUESTS_CANCELLED.clone()),
        Box::new(PUBLISH_FAILURES.clone()),
        Box::new(REPLIES_DROPPED.clone()),
        Box::new(CORRELATION_ENTRIES_SWEPT.clone()),
        Box::new(PENDING_REQUESTS.clone()),
        Box::new(REQUEST_DURATION.clone()),
    ];

    for metric in metrics {
        REGISTRY
            .register(metric)
            .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
    }

    Ok(MetricsHandle {
        registry: Arc::new(REGISTRY.clone()),
    })
}

/// Encode all metrics in the global registry as Prometheus text format.
pub fn encode_metrics() -> Result<String, TelemetryError> {
    encode(&REGISTRY)
}

fn encode(registry: &Registry) -> Result<String, TelemetryError> {
    let encoder = TextEncoder::new();
    let metric_families = registry.gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
    String::from_utf8(buffer).map_err(|e| TelemetryError::MetricsInit(e.to_string()))
}
