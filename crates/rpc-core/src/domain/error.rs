//! Error types for request/response handling.
//!
//! Only failures the caller must act on are errors. Replies without
//! correlation data or with an unknown id are expected traffic on a shared
//! reply topic and are dropped, never reported.

use crate::domain::cancel::CancelCause;
use crate::domain::config::ConfigError;
use crate::domain::correlation::CorrelationId;
use std::time::Duration;
use thiserror::Error;

/// Errors reported by a transport implementation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The connection is gone.
    #[error("transport closed")]
    Closed,

    /// Topic name or filter was rejected.
    #[error("invalid topic: {0}")]
    InvalidTopic(String),

    /// The transport refused the operation.
    #[error("rejected: {0}")]
    Rejected(String),
}

/// Failures while establishing the request handler.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConnectionError {
    /// Connect or authentication refused by the transport.
    #[error("{0}")]
    Refused(String),

    /// Registering for or subscribing to the reply topic failed.
    #[error("subscribe to {topic} failed: {source}")]
    Subscribe {
        topic: String,
        #[source]
        source: TransportError,
    },
}

/// Errors returned to `request` callers.
#[derive(Debug, Error)]
pub enum RpcError {
    /// Handler settings were rejected before anything was started.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Handler initialization failed. Fatal, not retried.
    #[error("connection failed: {0}")]
    Connection(#[from] ConnectionError),

    /// The request could not be published. No wait occurred.
    #[error("publish failed: {0}")]
    Publish(#[source] TransportError),

    /// No reply arrived within the timeout.
    #[error("request timeout after {}ms (correlation id {correlation_id})", .timeout.as_millis())]
    RequestTimeout {
        correlation_id: CorrelationId,
        timeout: Duration,
    },

    /// The caller cancelled the wait or its deadline passed.
    #[error("request {0}")]
    Cancelled(CancelCause),

    /// A freshly generated correlation id was already registered.
    #[error("correlation id collision: {0}")]
    CorrelationCollision(CorrelationId),
}

impl RpcError {
    /// Whether this is a timeout ("no answer") as opposed to a failure.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::RequestTimeout { .. })
    }

    /// Whether the caller cancelled the request.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled(_))
    }

    /// Cancellation cause, if this is a cancellation.
    pub fn cancel_cause(&self) -> Option<&CancelCause> {
        match self {
            Self::Cancelled(cause) => Some(cause),
            _ => None,
        }
    }
}

/// Convenience alias for results of request operations.
pub type RpcResult<T> = Result<T, RpcError>;
