//! Response router: hands inbound replies to the requests waiting on them.

use crate::domain::envelope::{correlation_id, Message};
use crate::domain::pending::{CorrelationRegistry, RegistryStats};
use crate::ports::outbound::InboundHandler;
use rpc_telemetry::metrics::{REPLIES_DELIVERED, REPLIES_DROPPED};
use std::sync::Arc;
use tracing::debug;

/// What happened to an inbound reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteOutcome {
    /// Handed to the waiting request
    Delivered,
    /// No usable correlation data on the message
    MissingCorrelation,
    /// No pending request for the id (late, duplicate or foreign)
    UnknownId,
    /// Entry claimed but the waiter had already gone
    WaiterGone,
}

impl RouteOutcome {
    fn label(self) -> &'static str {
        match self {
            Self::Delivered => "delivered",
            Self::MissingCorrelation => "missing_correlation",
            Self::UnknownId => "unknown_id",
            Self::WaiterGone => "waiter_gone",
        }
    }
}

/// Inbound callback for the reply topic.
#[derive(Clone)]
pub struct ResponseRouter {
    registry: Arc<CorrelationRegistry>,
}

impl ResponseRouter {
    pub fn new(registry: Arc<CorrelationRegistry>) -> Self {
        Self { registry }
    }

    /// Route one inbound message. Never blocks and never fails; replies
    /// that match no waiter are dropped.
    pub fn on_message(&self, message: Message) -> RouteOutcome {
        let outcome = self.route(message);

        if outcome == RouteOutcome::Delivered {
            RegistryStats::bump(&self.registry.stats().delivered);
            REPLIES_DELIVERED.inc();
        } else {
            RegistryStats::bump(&self.registry.stats().dropped_replies);
            REPLIES_DROPPED.with_label_values(&[outcome.label()]).inc();
        }
        outcome
    }

    fn route(&self, message: Message) -> RouteOutcome {
        let Some(id) = correlation_id(&message) else {
            debug!(topic = %message.topic, "Dropping reply without correlation id");
            return RouteOutcome::MissingCorrelation;
        };

        let Some(slot) = self.registry.take_and_remove(&id) else {
            debug!(correlation_id = %id, "Dropping reply for unknown or expired correlation id");
            return RouteOutcome::UnknownId;
        };

        let elapsed = slot.elapsed();
        if slot.deliver(message) {
            debug!(
                correlation_id = %id,
                response_time_ms = elapsed.as_millis(),
                "Delivered reply"
            );
            RouteOutcome::Delivered
        } else {
            debug!(correlation_id = %id, "Reply receiver dropped");
            RouteOutcome::WaiterGone
        }
    }

    /// Wrap the router as a transport callback.
    pub fn handler(&self) -> InboundHandler {
        let router = self.clone();
        Arc::new(move |message| {
            router.on_message(message);
        })
    }
}
