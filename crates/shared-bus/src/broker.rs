//! # In-Memory Broker
//!
//! The server side of the bus: accepts client connections, fans published
//! messages out to every subscription and keeps track of who is connected.

use crate::client::BusClient;
use crate::message::BusMessage;
use crate::subscriber::Subscription;
use crate::topic::TopicFilter;
use crate::DEFAULT_CHANNEL_CAPACITY;
use async_trait::async_trait;
use parking_lot::RwLock;
use secrecy::{ExposeSecret, SecretString};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Connect refusal reasons, numbered like MQTT v5 CONNACK reason codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReasonCode {
    /// Another connected client already uses the requested client id.
    ClientIdInUse,
    /// Username or password did not match.
    BadCredentials,
    /// Credentials are required but none were supplied.
    NotAuthorized,
}

impl ReasonCode {
    /// Numeric reason code.
    #[must_use]
    pub fn code(self) -> u8 {
        match self {
            Self::ClientIdInUse => 0x85,
            Self::BadCredentials => 0x86,
            Self::NotAuthorized => 0x87,
        }
    }
}

impl fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#04x}", self.code())
    }
}

/// Errors from connecting to the broker.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConnectError {
    /// The broker refused the connection.
    #[error("failed to connect to {address} : {code} - {reason}")]
    Refused {
        address: String,
        code: ReasonCode,
        reason: String,
    },
}

impl ConnectError {
    /// Reason code of a refusal.
    #[must_use]
    pub fn reason_code(&self) -> ReasonCode {
        match self {
            Self::Refused { code, .. } => *code,
        }
    }
}

/// Options for `InMemoryBroker::connect`.
#[derive(Debug, Clone)]
pub struct ConnectOptions {
    /// Requested client id. A random UUID is assigned when absent.
    pub client_id: Option<String>,
    /// Username, if the broker requires authentication.
    pub username: Option<String>,
    /// Password, if the broker requires authentication.
    pub password: Option<SecretString>,
    /// Keep-alive interval advertised by the client.
    pub keep_alive: Duration,
    /// Start without any prior session state.
    pub clean_start: bool,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            client_id: None,
            username: None,
            password: None,
            keep_alive: Duration::from_secs(30),
            clean_start: true,
        }
    }
}

impl ConnectOptions {
    /// Set the username and password.
    #[must_use]
    pub fn with_credentials(self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.with_username(username).with_password(password)
    }

    /// Set the username.
    #[must_use]
    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    /// Set the password.
    #[must_use]
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(SecretString::from(password.into()));
        self
    }

    /// Set the client id.
    #[must_use]
    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }
}

/// Trait for publishing messages to the bus.
#[async_trait]
pub trait MessagePublisher: Send + Sync {
    /// Publish a message.
    ///
    /// Returns the number of active subscriptions the message was handed to.
    async fn publish(&self, message: BusMessage) -> usize;
}

/// In-memory implementation of the broker.
///
/// Uses `tokio::sync::broadcast` for multi-producer, multi-consumer fan-out;
/// topic filtering happens on the subscriber side.
pub struct InMemoryBroker {
    /// Broker address, used in connect errors and logs.
    address: String,

    /// Broadcast sender for messages.
    sender: broadcast::Sender<BusMessage>,

    /// Required username, if any.
    username: Option<String>,

    /// Required password, if any.
    password: Option<SecretString>,

    /// Currently connected client ids.
    clients: Arc<RwLock<HashSet<String>>>,

    /// Active subscription count by filter.
    subscriptions: Arc<RwLock<HashMap<String, usize>>>,

    /// Channel capacity.
    capacity: usize,
}

impl InMemoryBroker {
    /// Create a new broker with default capacity and no authentication.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Create a new broker with specified capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            address: "memory://local".to_string(),
            sender,
            username: None,
            password: None,
            clients: Arc::new(RwLock::new(HashSet::new())),
            subscriptions: Arc::new(RwLock::new(HashMap::new())),
            capacity,
        }
    }

    /// Require clients to authenticate with these credentials.
    #[must_use]
    pub fn with_credentials(self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.with_username(username).with_password(password)
    }

    /// Require clients to present this username.
    #[must_use]
    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    /// Require clients to present this password.
    #[must_use]
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(SecretString::from(password.into()));
        self
    }

    /// Set the address reported in errors and logs.
    #[must_use]
    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = address.into();
        self
    }

    /// Broker address.
    #[must_use]
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Connect a new client.
    ///
    /// Fails when credentials are required and missing or wrong, or when the
    /// requested client id is already connected.
    pub fn connect(self: &Arc<Self>, options: ConnectOptions) -> Result<BusClient, ConnectError> {
        self.authenticate(&options)?;

        let client_id = options
            .client_id
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        if !self.clients.write().insert(client_id.clone()) {
            warn!(client_id = %client_id, "Client id already connected");
            return Err(self.refuse(ReasonCode::ClientIdInUse, "client identifier in use"));
        }

        info!(
            address = %self.address,
            client_id = %client_id,
            keep_alive_secs = options.keep_alive.as_secs(),
            clean_start = options.clean_start,
            "Client connected"
        );

        Ok(BusClient::new(client_id, Arc::clone(self)))
    }

    /// Username and password are checked independently; each one the
    /// broker requires must be present and match.
    fn authenticate(&self, options: &ConnectOptions) -> Result<(), ConnectError> {
        if self.username.is_none() && self.password.is_none() {
            return Ok(());
        }
        if options.username.is_none() && options.password.is_none() {
            return Err(self.refuse(ReasonCode::NotAuthorized, "credentials required"));
        }

        let username_ok = match &self.username {
            Some(required) => options.username.as_deref() == Some(required.as_str()),
            None => true,
        };
        let password_ok = match &self.password {
            Some(required) => options
                .password
                .as_ref()
                .is_some_and(|given| given.expose_secret() == required.expose_secret()),
            None => true,
        };

        if !(username_ok && password_ok) {
            return Err(self.refuse(ReasonCode::BadCredentials, "bad user name or password"));
        }
        Ok(())
    }

    fn refuse(&self, code: ReasonCode, reason: &str) -> ConnectError {
        ConnectError::Refused {
            address: self.address.clone(),
            code,
            reason: reason.to_string(),
        }
    }

    /// Forget a client id so it can be reused.
    pub(crate) fn release_client(&self, client_id: &str) {
        if self.clients.write().remove(client_id) {
            debug!(client_id = %client_id, "Client disconnected");
        }
    }

    /// Whether a client id is currently connected.
    #[must_use]
    pub fn is_connected(&self, client_id: &str) -> bool {
        self.clients.read().contains(client_id)
    }

    /// Number of connected clients.
    #[must_use]
    pub fn client_count(&self) -> usize {
        self.clients.read().len()
    }

    /// Subscribe to messages matching a filter.
    #[must_use]
    pub fn subscribe(&self, filter: TopicFilter) -> Subscription {
        let receiver = self.sender.subscribe();

        *self
            .subscriptions
            .write()
            .entry(filter.as_str().to_string())
            .or_insert(0) += 1;

        debug!(filter = %filter, "New subscription created");

        Subscription::new(receiver, filter, self.subscriptions.clone())
    }

    /// Number of live subscriptions for an exact filter string.
    #[must_use]
    pub fn subscriptions_for(&self, filter: &str) -> usize {
        self.subscriptions.read().get(filter).copied().unwrap_or(0)
    }

    /// Get the number of active subscriptions.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Get the channel capacity.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for InMemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MessagePublisher for InMemoryBroker {
    async fn publish(&self, message: BusMessage) -> usize {
        let topic = message.topic.clone();
        match self.sender.send(message) {
            Ok(receiver_count) => {
                debug!(topic = %topic, receivers = receiver_count, "Message published");
                receiver_count
            }
            Err(_) => {
                debug!(topic = %topic, "Message dropped (no subscribers)");
                0
            }
        }
    }
}
