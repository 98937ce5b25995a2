//! Shared helpers for integration tests and benchmarks.

use bytes::Bytes;
use rpc_core::{reply_to, Message, QoS, RequestConfig, RequestHandler};
use shared_bus::{BusClient, ConnectOptions, InMemoryBroker};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Topic the test services listen on.
pub const SERVICE_TOPIC: &str = "services/echo";

/// Connect a client with a fixed id.
pub fn connect(broker: &Arc<InMemoryBroker>, client_id: &str) -> BusClient {
    broker
        .connect(ConnectOptions::default().with_client_id(client_id))
        .expect("connect")
}

/// Build a request handler for `client_id` with the given default timeout.
pub async fn handler(broker: &Arc<InMemoryBroker>, client_id: &str, timeout: Duration) -> RequestHandler {
    let config = RequestConfig {
        timeout,
        ..RequestConfig::default()
    };
    RequestHandler::new(Arc::new(connect(broker, client_id)), &config)
        .await
        .expect("request handler")
}

/// A service endpoint the test drives by hand: it hands every request to the
/// test and publishes whatever replies the test asks for.
pub struct RequestTap {
    client: Arc<BusClient>,
    requests: mpsc::UnboundedReceiver<Message>,
}

impl RequestTap {
    pub async fn attach(broker: &Arc<InMemoryBroker>, client_id: &str, topic: &str) -> Self {
        let client = Arc::new(connect(broker, client_id));
        let (tx, requests) = mpsc::unbounded_channel();

        client
            .on_message(
                topic,
                Arc::new(move |message| {
                    let _ = tx.send(message);
                }),
            )
            .expect("register tap");
        client
            .subscribe(topic, QoS::AtLeastOnce)
            .await
            .expect("subscribe tap");

        Self { client, requests }
    }

    /// Next request seen on the topic.
    pub async fn next_request(&mut self) -> Message {
        tokio::time::timeout(Duration::from_secs(5), self.requests.recv())
            .await
            .expect("no request within 5s")
            .expect("tap closed")
    }

    /// Publish a correlated reply to `request`.
    pub async fn reply(&self, request: &Message, payload: impl Into<Bytes>) {
        let reply = reply_to(request, payload).expect("request has a response topic");
        self.publish(reply).await;
    }

    /// Publish an arbitrary message.
    pub async fn publish(&self, message: Message) {
        self.client.publish(message).await.expect("publish");
    }
}

/// Echo service: replies to every request with its own payload.
pub async fn spawn_echo(broker: &Arc<InMemoryBroker>, client_id: &str) -> Arc<BusClient> {
    let client = Arc::new(connect(broker, client_id));
    let publisher = Arc::downgrade(&client);

    client
        .on_message(
            SERVICE_TOPIC,
            Arc::new(move |request: Message| {
                let (Some(reply), Some(publisher)) =
                    (reply_to(&request, request.payload.clone()), publisher.upgrade())
                else {
                    return;
                };
                tokio::spawn(async move {
                    let _ = publisher.publish(reply).await;
                });
            }),
        )
        .expect("register echo");
    client
        .subscribe(SERVICE_TOPIC, QoS::AtLeastOnce)
        .await
        .expect("subscribe echo");
    client
}
