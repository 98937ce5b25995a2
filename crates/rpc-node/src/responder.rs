//! Echo responder: answers every request on its topic with the request
//! payload, sent to the request's response topic.

use rpc_core::{reply_to, Message, QoS};
use shared_bus::{BusClient, ConnectOptions, InMemoryBroker};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tracing::{debug, info, warn};

/// A responder client connected to the broker.
pub struct EchoResponder {
    client: Arc<BusClient>,
}

impl EchoResponder {
    /// Connect as `client_id` and serve `topic`, replying after `delay`.
    pub async fn start(
        broker: &Arc<InMemoryBroker>,
        options: ConnectOptions,
        topic: &str,
        delay: Duration,
    ) -> anyhow::Result<Self> {
        let client = Arc::new(broker.connect(options)?);
        let publisher: Weak<BusClient> = Arc::downgrade(&client);

        client.on_message(
            topic,
            Arc::new(move |request: Message| {
                let Some(reply) = reply_to(&request, request.payload.clone()) else {
                    warn!(topic = %request.topic, "Request without response topic, ignoring");
                    return;
                };
                let Some(publisher) = publisher.upgrade() else {
                    return;
                };
                tokio::spawn(async move {
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                    if let Err(e) = publisher.publish(reply).await {
                        warn!(error = %e, "Failed to publish reply");
                    } else {
                        debug!("Reply published");
                    }
                });
            }),
        )?;
        client.subscribe(topic, QoS::AtLeastOnce).await?;

        info!(
            client_id = %client.client_id(),
            topic = %topic,
            delay_ms = delay.as_millis(),
            "Echo responder started"
        );
        Ok(Self { client })
    }

    pub fn client_id(&self) -> &str {
        self.client.client_id()
    }
}

impl Drop for EchoResponder {
    fn drop(&mut self) {
        self.client.disconnect();
    }
}
