//! Request handler: wires a transport, the correlation registry, the
//! dispatcher and the reply router together.

use crate::domain::config::{RequestConfig, RpcConfig};
use crate::domain::envelope::{reply_topic_for, Message};
use crate::domain::error::{ConnectionError, RpcResult};
use crate::domain::pending::{CorrelationRegistry, StatsSnapshot};
use crate::ipc::bus_adapter::connect_bus;
use crate::ipc::handler::{RequestDispatcher, RequestOptions};
use crate::ipc::router::ResponseRouter;
use crate::ports::outbound::Transport;
use bytes::Bytes;
use shared_bus::InMemoryBroker;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::info;

/// Synchronous-style request/response over a topic transport.
///
/// Replies arrive on `"{client_id}/responses"`. Each handler owns its own
/// registry; any number of handlers can share a process.
pub struct RequestHandler {
    transport: Arc<dyn Transport>,
    dispatcher: RequestDispatcher,
    router: ResponseRouter,
    sweeper: JoinHandle<()>,
}

impl RequestHandler {
    /// Build a handler on an already connected transport.
    ///
    /// Validates `config`, registers the reply router, subscribes to the
    /// reply topic and starts the registry sweeper. Must be called within a
    /// tokio runtime.
    pub async fn new(transport: Arc<dyn Transport>, config: &RequestConfig) -> RpcResult<Self> {
        config.validate()?;

        let reply_topic = reply_topic_for(transport.client_id());
        let registry = Arc::new(CorrelationRegistry::new());
        let router = ResponseRouter::new(Arc::clone(&registry));

        let subscribe_error = |source| ConnectionError::Subscribe {
            topic: reply_topic.clone(),
            source,
        };
        transport
            .on_message(&reply_topic, router.handler())
            .map_err(subscribe_error)?;
        transport
            .subscribe(&reply_topic, config.reply_qos())
            .await
            .map_err(subscribe_error)?;

        let sweeper = registry.spawn_sweeper(config.sweep_interval, config.sweep_grace);

        info!(
            client_id = %transport.client_id(),
            reply_topic = %reply_topic,
            timeout_ms = config.timeout.as_millis(),
            "Request handler ready"
        );

        let dispatcher = RequestDispatcher::new(
            registry,
            Arc::clone(&transport),
            reply_topic,
            config.timeout,
        );

        Ok(Self {
            transport,
            dispatcher,
            router,
            sweeper,
        })
    }

    /// Connect to a broker and build a handler from configuration.
    pub async fn connect(broker: &Arc<InMemoryBroker>, config: &RpcConfig) -> RpcResult<Self> {
        let client = connect_bus(broker, &config.transport)?;
        Self::new(Arc::new(client), &config.requests).await
    }

    /// Send a request and wait for its reply using the default timeout.
    pub async fn request(&self, message: Message) -> RpcResult<Message> {
        self.dispatcher.request_default(message).await
    }

    /// Send a request with per-call options.
    pub async fn request_with(&self, message: Message, options: RequestOptions) -> RpcResult<Message> {
        self.dispatcher.request(message, options).await
    }

    /// Send a request with a per-call timeout.
    pub async fn request_with_timeout(&self, message: Message, timeout: Duration) -> RpcResult<Message> {
        self.dispatcher.request_with_timeout(message, timeout).await
    }

    /// Send `payload` to `topic` and wait for the reply.
    pub async fn request_payload(
        &self,
        topic: impl Into<String>,
        payload: impl Into<Bytes>,
    ) -> RpcResult<Message> {
        self.dispatcher.request_payload(topic, payload).await
    }

    pub fn client_id(&self) -> &str {
        self.transport.client_id()
    }

    pub fn reply_topic(&self) -> &str {
        self.dispatcher.reply_topic()
    }

    /// Requests currently awaiting a reply
    pub fn pending_count(&self) -> usize {
        self.dispatcher.registry().len()
    }

    pub fn registry(&self) -> &Arc<CorrelationRegistry> {
        self.dispatcher.registry()
    }

    pub fn router(&self) -> &ResponseRouter {
        &self.router
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.dispatcher.registry().stats().snapshot()
    }
}

impl Drop for RequestHandler {
    fn drop(&mut self) {
        self.sweeper.abort();
    }
}
