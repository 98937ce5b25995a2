//! # Subscriptions
//!
//! The receiving side of the broker. A subscription sees every message
//! published after it was created and filters them by topic.

use crate::message::BusMessage;
use crate::topic::TopicFilter;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::broadcast;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::Stream;
use tracing::debug;

/// A subscription handle for receiving messages.
///
/// When dropped, the subscription is automatically unregistered.
pub struct Subscription {
    /// The broadcast receiver.
    receiver: broadcast::Receiver<BusMessage>,

    /// Filter for this subscription.
    filter: TopicFilter,

    /// Unregisters the subscription on drop.
    guard: SubscriptionGuard,
}

impl Subscription {
    pub(crate) fn new(
        receiver: broadcast::Receiver<BusMessage>,
        filter: TopicFilter,
        subscriptions: Arc<RwLock<HashMap<String, usize>>>,
    ) -> Self {
        let guard = SubscriptionGuard {
            key: filter.as_str().to_string(),
            subscriptions,
        };
        Self {
            receiver,
            filter,
            guard,
        }
    }

    /// Get the filter for this subscription.
    #[must_use]
    pub fn filter(&self) -> &TopicFilter {
        &self.filter
    }

    /// Turn the subscription into a `Stream` of matching messages.
    #[must_use]
    pub fn into_stream(self) -> MessageStream {
        MessageStream {
            inner: BroadcastStream::new(self.receiver),
            filter: self.filter,
            _guard: self.guard,
        }
    }
}

/// Decrements the per-filter subscription count when dropped.
struct SubscriptionGuard {
    key: String,
    subscriptions: Arc<RwLock<HashMap<String, usize>>>,
}

impl Drop for SubscriptionGuard {
    fn drop(&mut self) {
        let mut subs = self.subscriptions.write();
        if let Some(count) = subs.get_mut(&self.key) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                subs.remove(&self.key);
            }
        }
        debug!(filter = %self.key, "Subscription dropped");
    }
}

/// A stream over a subscription.
///
/// Lagged receivers skip the lost messages; the stream ends when the broker
/// is dropped.
pub struct MessageStream {
    inner: BroadcastStream<BusMessage>,
    filter: TopicFilter,
    _guard: SubscriptionGuard,
}

impl MessageStream {
    /// Get the filter for this stream.
    #[must_use]
    pub fn filter(&self) -> &TopicFilter {
        &self.filter
    }
}

impl Stream for MessageStream {
    type Item = BusMessage;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            match Pin::new(&mut self.inner).poll_next(cx) {
                Poll::Ready(Some(Ok(message))) => {
                    if self.filter.matches(&message.topic) {
                        return Poll::Ready(Some(message));
                    }
                }
                Poll::Ready(Some(Err(BroadcastStreamRecvError::Lagged(count)))) => {
                    debug!(lagged = count, "Stream lagged, some messages dropped");
                }
                Poll::Ready(None) => return Poll::Ready(None),
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}
