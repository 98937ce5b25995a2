//! Request dispatcher: publish a request and wait for its correlated reply.

use crate::domain::cancel::{CancelCause, CancelSignal};
use crate::domain::correlation::CorrelationId;
use crate::domain::envelope::{stamp_request, Message};
use crate::domain::error::{RpcError, RpcResult};
use crate::domain::pending::{deadline_after, CorrelationRegistry, RegistryStats, ReplySlot};
use crate::ports::outbound::Transport;
use bytes::Bytes;
use rpc_telemetry::metrics::{
    PUBLISH_FAILURES, REQUESTS_CANCELLED, REQUESTS_SENT, REQUEST_DURATION, REQUEST_TIMEOUTS,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Per-call options for `RequestDispatcher::request`.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    /// Overrides the dispatcher's default timeout
    pub timeout: Option<Duration>,
    /// Absolute point in time after which the caller stops waiting
    pub deadline: Option<Instant>,
    /// Caller-controlled cancellation
    pub cancel: Option<CancelSignal>,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    #[must_use]
    pub fn with_cancel(mut self, signal: CancelSignal) -> Self {
        self.cancel = Some(signal);
        self
    }

    /// Cause if the request is already cancelled or past its deadline.
    fn precancelled(&self) -> Option<CancelCause> {
        if let Some(cause) = self.cancel.as_ref().and_then(CancelSignal::cause) {
            return Some(cause);
        }
        match self.deadline {
            Some(deadline) if deadline <= Instant::now() => Some(CancelCause::DeadlineExceeded),
            _ => None,
        }
    }
}

/// What woke the waiting request.
enum Wake {
    Reply(Result<Message, oneshot::error::RecvError>),
    Timeout,
    Cancelled(CancelCause),
}

/// Removes the entry if the request future is dropped mid-wait.
struct PendingGuard<'a> {
    registry: &'a CorrelationRegistry,
    correlation_id: CorrelationId,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        if self.registry.take_and_remove(&self.correlation_id).is_some() {
            RegistryStats::bump(&self.registry.stats().abandoned);
            debug!(correlation_id = %self.correlation_id, "Request dropped while awaiting reply");
        }
    }
}

/// Publishes requests and waits for their replies.
///
/// Each call registers a reply slot under a fresh correlation id, publishes
/// the request stamped with that id and the reply topic, then races the
/// reply against the timeout and the caller's cancellation.
pub struct RequestDispatcher {
    registry: Arc<CorrelationRegistry>,
    transport: Arc<dyn Transport>,
    reply_topic: String,
    default_timeout: Duration,
}

impl RequestDispatcher {
    pub fn new(
        registry: Arc<CorrelationRegistry>,
        transport: Arc<dyn Transport>,
        reply_topic: impl Into<String>,
        default_timeout: Duration,
    ) -> Self {
        Self {
            registry,
            transport,
            reply_topic: reply_topic.into(),
            default_timeout,
        }
    }

    /// Send a request and wait for the correlated reply.
    ///
    /// Exactly one of reply, timeout or cancellation decides the result.
    /// When the timer or cancellation fires, the dispatcher tries to claim
    /// the registry entry; if the router claimed it first, the reply it is
    /// delivering is returned instead.
    pub async fn request(&self, message: Message, options: RequestOptions) -> RpcResult<Message> {
        if let Some(cause) = options.precancelled() {
            RegistryStats::bump(&self.registry.stats().cancelled);
            REQUESTS_CANCELLED.inc();
            return Err(RpcError::Cancelled(cause));
        }

        let timeout = options.timeout.unwrap_or(self.default_timeout);
        let correlation_id = CorrelationId::new();
        let (slot, mut reply_rx) = ReplySlot::channel(correlation_id);

        // The timer and the sweeper share one deadline, fixed before publish.
        let expires = deadline_after(timeout);
        self.registry.register(correlation_id, slot, expires)?;
        let _guard = PendingGuard {
            registry: &self.registry,
            correlation_id,
        };

        let request = stamp_request(message, correlation_id, &self.reply_topic);
        let topic = request.topic.clone();

        if let Err(e) = self.transport.publish(request).await {
            self.registry.take_and_remove(&correlation_id);
            RegistryStats::bump(&self.registry.stats().publish_failed);
            PUBLISH_FAILURES.inc();
            warn!(
                correlation_id = %correlation_id,
                topic = %topic,
                error = %e,
                "Failed to publish request"
            );
            return Err(RpcError::Publish(e));
        }

        REQUESTS_SENT.inc();
        debug!(
            correlation_id = %correlation_id,
            topic = %topic,
            timeout_ms = timeout.as_millis(),
            "Sent request"
        );
        let started = Instant::now();

        let wake = tokio::select! {
            biased;
            reply = &mut reply_rx => Wake::Reply(reply),
            () = expiry(expires) => Wake::Timeout,
            cause = cancellation(options.cancel.as_ref(), options.deadline) => Wake::Cancelled(cause),
        };

        let timeout_error = RpcError::RequestTimeout {
            correlation_id,
            timeout,
        };

        let result = match wake {
            Wake::Reply(Ok(reply)) => Ok(reply),
            // Slot dropped without a reply: only the sweeper does that.
            Wake::Reply(Err(_)) => Err(timeout_error),
            Wake::Timeout => self.claim(correlation_id, reply_rx, timeout_error).await,
            Wake::Cancelled(cause) => {
                self.claim(correlation_id, reply_rx, RpcError::Cancelled(cause))
                    .await
            }
        };

        match &result {
            Ok(_) => {
                let elapsed = started.elapsed();
                REQUEST_DURATION.observe(elapsed.as_secs_f64());
                debug!(
                    correlation_id = %correlation_id,
                    elapsed_ms = elapsed.as_millis(),
                    "Received reply"
                );
            }
            Err(RpcError::RequestTimeout { .. }) => {
                RegistryStats::bump(&self.registry.stats().timed_out);
                REQUEST_TIMEOUTS.inc();
                warn!(
                    correlation_id = %correlation_id,
                    topic = %topic,
                    timeout_ms = timeout.as_millis(),
                    "Request timed out"
                );
            }
            Err(e) => {
                RegistryStats::bump(&self.registry.stats().cancelled);
                REQUESTS_CANCELLED.inc();
                debug!(correlation_id = %correlation_id, error = %e, "Request cancelled");
            }
        }

        result
    }

    /// Resolve a fired timer or cancellation against a concurrent reply.
    async fn claim(
        &self,
        correlation_id: CorrelationId,
        reply_rx: oneshot::Receiver<Message>,
        error: RpcError,
    ) -> RpcResult<Message> {
        if self.registry.take_and_remove(&correlation_id).is_some() {
            return Err(error);
        }

        // The router holds the slot and sends without blocking.
        match reply_rx.await {
            Ok(reply) => {
                debug!(correlation_id = %correlation_id, "Reply claimed before timer");
                Ok(reply)
            }
            Err(_) => Err(error),
        }
    }

    /// Send a request with the default options.
    pub async fn request_default(&self, message: Message) -> RpcResult<Message> {
        self.request(message, RequestOptions::default()).await
    }

    /// Send a request with a per-call timeout.
    pub async fn request_with_timeout(
        &self,
        message: Message,
        timeout: Duration,
    ) -> RpcResult<Message> {
        self.request(message, RequestOptions::new().with_timeout(timeout))
            .await
    }

    /// Build a message from topic and payload and send it.
    pub async fn request_payload(
        &self,
        topic: impl Into<String>,
        payload: impl Into<Bytes>,
    ) -> RpcResult<Message> {
        self.request_default(Message::new(topic, payload)).await
    }

    /// Topic replies are expected on.
    pub fn reply_topic(&self) -> &str {
        &self.reply_topic
    }

    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    pub fn registry(&self) -> &Arc<CorrelationRegistry> {
        &self.registry
    }
}

async fn expiry(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

async fn cancellation(signal: Option<&CancelSignal>, deadline: Option<Instant>) -> CancelCause {
    let cancelled = async {
        match signal {
            Some(signal) => signal.cancelled().await,
            None => std::future::pending().await,
        }
    };
    let deadline = async {
        match deadline {
            Some(deadline) => {
                tokio::time::sleep_until(deadline).await;
                CancelCause::DeadlineExceeded
            }
            None => std::future::pending().await,
        }
    };

    tokio::select! {
        biased;
        cause = cancelled => cause,
        cause = deadline => cause,
    }
}
