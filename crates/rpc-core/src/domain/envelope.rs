//! Request and reply envelopes.
//!
//! Messages are the transport's `BusMessage`. A request carries the
//! correlation id and the reply-to topic in its properties; a reply only
//! needs to echo the correlation id.

use crate::domain::correlation::CorrelationId;
pub use shared_bus::{BusMessage as Message, MessageProperties, QoS};

/// Suffix appended to the client id to form its reply topic.
pub const REPLY_TOPIC_SUFFIX: &str = "responses";

/// Reply topic for a client: `"{client_id}/responses"`.
pub fn reply_topic_for(client_id: &str) -> String {
    format!("{client_id}/{REPLY_TOPIC_SUFFIX}")
}

/// Stamp request metadata onto an outgoing message.
///
/// Creates the properties when absent and overwrites any existing
/// correlation data and response topic. Requests are never retained.
pub fn stamp_request(mut message: Message, id: CorrelationId, reply_topic: &str) -> Message {
    let properties = message.properties.get_or_insert_with(MessageProperties::default);
    properties.correlation_data = Some(id.to_correlation_data());
    properties.response_topic = Some(reply_topic.to_string());
    message.retain = false;
    message
}

/// Correlation id of an inbound message, if it carries one of ours.
pub fn correlation_id(message: &Message) -> Option<CorrelationId> {
    message
        .correlation_data()
        .and_then(|data| CorrelationId::from_correlation_data(data))
}

/// Build the reply to a request, echoing its correlation data.
///
/// Returns `None` when the request named no response topic, since there is
/// nowhere to send the reply.
pub fn reply_to(request: &Message, payload: impl Into<bytes::Bytes>) -> Option<Message> {
    let topic = request.response_topic()?.to_string();
    let properties = MessageProperties {
        correlation_data: request.correlation_data().cloned(),
        ..Default::default()
    };
    let mut reply = Message::new(topic, payload).with_properties(properties);
    reply.qos = request.qos;
    Some(reply)
}
