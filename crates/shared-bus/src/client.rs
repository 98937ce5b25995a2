//! # Bus Client
//!
//! A connected session on the broker. Mirrors the surface of an MQTT client:
//! `subscribe`, `publish`, and a router of per-filter message callbacks.
//!
//! Each subscription gets its own delivery task; callbacks registered with
//! `on_message` run on those tasks, so callbacks for different subscriptions
//! may run concurrently.

use crate::broker::{InMemoryBroker, MessagePublisher};
use crate::message::{BusMessage, QoS};
use crate::topic::{validate_topic_name, TopicError, TopicFilter};
use parking_lot::{Mutex, RwLock};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_stream::StreamExt;
use tracing::{debug, trace};

/// Callback invoked for every inbound message matching its filter.
pub type MessageHandler = Arc<dyn Fn(BusMessage) + Send + Sync>;

/// Errors from client operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ClientError {
    /// The client was disconnected.
    #[error("client disconnected")]
    Disconnected,

    /// Topic name or filter was invalid.
    #[error("invalid topic: {0}")]
    InvalidTopic(#[from] TopicError),
}

type HandlerTable = Arc<RwLock<Vec<(TopicFilter, MessageHandler)>>>;

/// A client session on an `InMemoryBroker`.
///
/// Dropping the client stops its delivery tasks and frees its client id.
pub struct BusClient {
    client_id: String,
    broker: Arc<InMemoryBroker>,
    handlers: HandlerTable,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    connected: AtomicBool,
}

impl BusClient {
    pub(crate) fn new(client_id: String, broker: Arc<InMemoryBroker>) -> Self {
        Self {
            client_id,
            broker,
            handlers: Arc::new(RwLock::new(Vec::new())),
            tasks: Mutex::new(Vec::new()),
            connected: AtomicBool::new(true),
        }
    }

    /// Client id assigned at connect time.
    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Whether the client is still connected.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// Register a callback for messages whose topic matches `filter`.
    ///
    /// Registration alone does not subscribe; messages only arrive for
    /// filters passed to `subscribe`.
    pub fn on_message(&self, filter: &str, handler: MessageHandler) -> Result<(), ClientError> {
        let filter = TopicFilter::parse(filter)?;
        debug!(client_id = %self.client_id, filter = %filter, "Registered message handler");
        self.handlers.write().push((filter, handler));
        Ok(())
    }

    /// Subscribe to a topic filter and start delivering matching messages
    /// to the registered callbacks.
    pub async fn subscribe(&self, filter: &str, qos: QoS) -> Result<(), ClientError> {
        if !self.is_connected() {
            return Err(ClientError::Disconnected);
        }
        let filter = TopicFilter::parse(filter)?;

        let mut messages = self.broker.subscribe(filter.clone()).into_stream();
        let handlers = Arc::clone(&self.handlers);
        let client_id = self.client_id.clone();

        let task = tokio::spawn(async move {
            while let Some(message) = messages.next().await {
                dispatch(&handlers, &client_id, message);
            }
            debug!(client_id = %client_id, "Delivery task finished (broker closed)");
        });
        self.tasks.lock().push(task);

        debug!(
            client_id = %self.client_id,
            filter = %filter,
            qos = qos.level(),
            "Subscribed"
        );
        Ok(())
    }

    /// Publish a message. The sender field is stamped with this client's id.
    ///
    /// Returns the number of subscriptions the message reached.
    pub async fn publish(&self, mut message: BusMessage) -> Result<usize, ClientError> {
        if !self.is_connected() {
            return Err(ClientError::Disconnected);
        }
        validate_topic_name(&message.topic)?;

        message.sender = Some(self.client_id.clone());
        Ok(self.broker.publish(message).await)
    }

    /// Stop delivery and release the client id. Idempotent.
    pub fn disconnect(&self) {
        if !self.connected.swap(false, Ordering::AcqRel) {
            return;
        }
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }
        self.broker.release_client(&self.client_id);
    }
}

impl fmt::Debug for BusClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BusClient")
            .field("client_id", &self.client_id)
            .field("connected", &self.is_connected())
            .field("handlers", &self.handlers.read().len())
            .finish_non_exhaustive()
    }
}

impl Drop for BusClient {
    fn drop(&mut self) {
        self.disconnect();
    }
}

fn dispatch(handlers: &HandlerTable, client_id: &str, message: BusMessage) {
    // Snapshot matching handlers so no lock is held while callbacks run.
    let matching: Vec<MessageHandler> = handlers
        .read()
        .iter()
        .filter(|(filter, _)| filter.matches(&message.topic))
        .map(|(_, handler)| Arc::clone(handler))
        .collect();

    if matching.is_empty() {
        trace!(client_id = %client_id, topic = %message.topic, "No handler for message");
        return;
    }

    for handler in matching {
        handler(message.clone());
    }
}
