//! Transport adapter over `shared-bus`.
//!
//! Lets a `BusClient` back a `RequestHandler` and turns transport
//! configuration into broker connect options.

use crate::domain::config::TransportConfig;
use crate::domain::envelope::{Message, QoS};
use crate::domain::error::{ConnectionError, TransportError};
use crate::ports::outbound::{InboundHandler, Transport};
use async_trait::async_trait;
use secrecy::ExposeSecret;
use shared_bus::{BusClient, ClientError, ConnectOptions, InMemoryBroker};
use std::sync::Arc;
use tracing::{debug, info, warn};

impl From<ClientError> for TransportError {
    fn from(err: ClientError) -> Self {
        match err {
            ClientError::Disconnected => TransportError::Closed,
            ClientError::InvalidTopic(e) => TransportError::InvalidTopic(e.to_string()),
        }
    }
}

#[async_trait]
impl Transport for BusClient {
    fn client_id(&self) -> &str {
        BusClient::client_id(self)
    }

    async fn subscribe(&self, filter: &str, qos: QoS) -> Result<(), TransportError> {
        BusClient::subscribe(self, filter, qos).await?;
        Ok(())
    }

    async fn publish(&self, message: Message) -> Result<(), TransportError> {
        let topic = message.topic.clone();
        let receivers = BusClient::publish(self, message).await?;

        if receivers == 0 {
            warn!(topic = %topic, "No subscribers for published message");
        } else {
            debug!(topic = %topic, receivers, "Message delivered to broker");
        }
        Ok(())
    }

    fn on_message(&self, filter: &str, handler: InboundHandler) -> Result<(), TransportError> {
        BusClient::on_message(self, filter, handler)?;
        Ok(())
    }
}

/// Build connect options from transport configuration.
pub fn connect_options(config: &TransportConfig) -> ConnectOptions {
    let mut options = ConnectOptions {
        keep_alive: config.keep_alive,
        ..ConnectOptions::default()
    };
    if let Some(client_id) = &config.client_id {
        options = options.with_client_id(client_id.clone());
    }
    if let Some(username) = &config.username {
        options = options.with_username(username.clone());
    }
    if let Some(password) = &config.password {
        options = options.with_password(password.expose_secret());
    }
    options
}

/// Connect to a broker using transport configuration.
pub fn connect_bus(
    broker: &Arc<InMemoryBroker>,
    config: &TransportConfig,
) -> Result<BusClient, ConnectionError> {
    let client = broker
        .connect(connect_options(config))
        .map_err(|e| ConnectionError::Refused(e.to_string()))?;

    info!(
        address = %broker.address(),
        client_id = %client.client_id(),
        "Connected to broker"
    );
    Ok(client)
}
