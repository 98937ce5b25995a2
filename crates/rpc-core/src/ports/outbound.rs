//! Outbound ports for the request handler.

use crate::domain::envelope::{Message, QoS};
use crate::domain::error::TransportError;
use async_trait::async_trait;
use std::sync::Arc;

/// Callback invoked once per inbound message.
pub type InboundHandler = Arc<dyn Fn(Message) + Send + Sync>;

/// A connected publish/subscribe session.
///
/// Connection, authentication and framing live behind this trait; the core
/// only publishes, subscribes and registers callbacks.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Client id the session was established with.
    fn client_id(&self) -> &str;

    /// Subscribe to a topic filter.
    async fn subscribe(&self, filter: &str, qos: QoS) -> Result<(), TransportError>;

    /// Publish a message.
    async fn publish(&self, message: Message) -> Result<(), TransportError>;

    /// Register a callback for inbound messages matching `filter`.
    fn on_message(&self, filter: &str, handler: InboundHandler) -> Result<(), TransportError>;
}
