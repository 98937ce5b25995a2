//! # Reply-Bus Telemetry
//!
//! Logging and metrics shared by every crate in the workspace.
//!
//! - **Logs**: `tracing` events rendered by `tracing-subscriber`, pretty for
//!   development or JSON for log shippers
//! - **Metrics**: Prometheus counters, a gauge and a latency histogram for
//!   request/response handling
//!
//! ## Usage
//!
//! ```rust,ignore
//! use rpc_telemetry::{init_telemetry, TelemetryConfig};
//!
//! let _guard = init_telemetry(TelemetryConfig::from_env())?;
//! ```
//!
//! ## Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `RPC_SERVICE_NAME` | `reply-bus` | Service name attached to logs |
//! | `RPC_LOG_LEVEL` | `info` | Log level filter (falls back to `RUST_LOG`) |
//! | `RPC_JSON_LOGS` | `false` | Emit JSON lines instead of pretty output |
//! | `RPC_CONSOLE_OUTPUT` | `true` | Write logs to stdout at all |

mod config;
mod logging;
pub mod metrics;

pub use config::TelemetryConfig;
pub use logging::init_logging;
pub use metrics::{
    encode_metrics, register_metrics, MetricsHandle, CORRELATION_ENTRIES_SWEPT,
    PENDING_REQUESTS, PUBLISH_FAILURES, REPLIES_DELIVERED, REPLIES_DROPPED, REQUESTS_CANCELLED,
    REQUESTS_SENT, REQUEST_DURATION, REQUEST_TIMEOUTS,
};

use thiserror::Error;

/// Telemetry initialization errors
#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Failed to initialize logging: {0}")]
    LoggingInit(String),

    #[error("Failed to initialize Prometheus metrics: {0}")]
    MetricsInit(String),
}

/// Initialize logging and register metrics.
///
/// Returns a guard that should be held for the lifetime of the application.
pub fn init_telemetry(config: TelemetryConfig) -> Result<TelemetryGuard, TelemetryError> {
    let metrics = register_metrics()?;
    init_logging(&config)?;

    tracing::info!(
        service = %config.service_name,
        log_level = %config.log_level,
        json_logs = config.json_logs,
        "Telemetry initialized"
    );

    Ok(TelemetryGuard { metrics })
}

/// Guard that keeps telemetry active.
pub struct TelemetryGuard {
    metrics: MetricsHandle,
}

impl TelemetryGuard {
    /// Metrics handle for rendering the registry.
    #[must_use]
    pub fn metrics(&self) -> &MetricsHandle {
        &self.metrics
    }
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        tracing::info!("Shutting down telemetry...");
    }
}
