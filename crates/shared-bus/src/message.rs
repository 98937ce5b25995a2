//! # Bus Messages
//!
//! The unit of transfer on the broker: a topic, an opaque payload and the
//! MQTT v5 style properties request/response patterns rely on.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// Delivery quality requested for a subscription or a publish.
///
/// The in-process broker delivers every message at most once regardless;
/// the level is carried so adapters for real brokers can honor it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QoS {
    /// Fire and forget.
    AtMostOnce,
    /// Acknowledged delivery.
    #[default]
    AtLeastOnce,
    /// Assured single delivery.
    ExactlyOnce,
}

impl QoS {
    /// Parse the numeric QoS level (0, 1 or 2).
    #[must_use]
    pub fn from_level(level: u8) -> Option<Self> {
        match level {
            0 => Some(Self::AtMostOnce),
            1 => Some(Self::AtLeastOnce),
            2 => Some(Self::ExactlyOnce),
            _ => None,
        }
    }

    /// Numeric QoS level.
    #[must_use]
    pub fn level(self) -> u8 {
        match self {
            Self::AtMostOnce => 0,
            Self::AtLeastOnce => 1,
            Self::ExactlyOnce => 2,
        }
    }
}

/// Optional metadata attached to a message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageProperties {
    /// Opaque bytes echoed back by responders to link a reply to its request.
    pub correlation_data: Option<Bytes>,
    /// Topic the receiver should publish its reply to.
    pub response_topic: Option<String>,
    /// MIME type of the payload.
    pub content_type: Option<String>,
    /// Free-form key/value pairs.
    pub user_properties: Vec<(String, String)>,
}

/// A message as it travels through the broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusMessage {
    /// Concrete topic name (no wildcards).
    pub topic: String,
    /// Opaque application payload.
    pub payload: Bytes,
    /// Requested delivery quality.
    pub qos: QoS,
    /// Retain flag. The in-process broker does not keep retained messages.
    pub retain: bool,
    /// Properties, absent when the publisher set none.
    pub properties: Option<MessageProperties>,
    /// Client id of the publisher, stamped by the client on publish.
    pub sender: Option<String>,
}

impl BusMessage {
    /// Create a message with default QoS and no properties.
    pub fn new(topic: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
            qos: QoS::default(),
            retain: false,
            properties: None,
            sender: None,
        }
    }

    /// Attach properties.
    #[must_use]
    pub fn with_properties(mut self, properties: MessageProperties) -> Self {
        self.properties = Some(properties);
        self
    }

    /// Correlation data, if any.
    #[must_use]
    pub fn correlation_data(&self) -> Option<&Bytes> {
        self.properties.as_ref()?.correlation_data.as_ref()
    }

    /// Response topic, if any.
    #[must_use]
    pub fn response_topic(&self) -> Option<&str> {
        self.properties.as_ref()?.response_topic.as_deref()
    }
}
