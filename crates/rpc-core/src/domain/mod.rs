//! Domain types: correlation ids, envelopes, cancellation, configuration
//! and errors.

pub mod cancel;
pub mod config;
pub mod correlation;
pub mod envelope;
pub mod error;
pub mod pending;

// Re-exports for convenience
pub use cancel::{cancel_pair, CancelCause, CancelSignal, CancelSource};
pub use config::{ConfigError, RequestConfig, RpcConfig, TransportConfig};
pub use correlation::CorrelationId;
pub use envelope::{reply_to, reply_topic_for, Message, MessageProperties, QoS};
pub use error::{ConnectionError, RpcError, RpcResult, TransportError};
pub use pending::{deadline_after, CorrelationRegistry, RegistryStats, ReplySlot, StatsSnapshot};
