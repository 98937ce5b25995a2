//! Correlation registry: the bridge between a waiting request and the
//! inbound reply callback.
//!
//! Flow:
//! 1. Dispatcher creates a `ReplySlot` and calls `register()`
//! 2. Dispatcher publishes the request carrying the correlation id
//! 3. Router receives the reply and calls `take_and_remove()`, then
//!    `ReplySlot::deliver()`
//! 4. Dispatcher wakes with the reply, or claims the entry itself on
//!    timeout/cancellation
//!
//! Whoever removes the entry decides the outcome; removal is atomic so at
//! most one party ever holds the slot.

use crate::domain::correlation::CorrelationId;
use crate::domain::envelope::Message;
use crate::domain::error::RpcError;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use rpc_telemetry::metrics::{CORRELATION_ENTRIES_SWEPT, PENDING_REQUESTS};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, warn};

/// Single-use handoff for one reply.
///
/// Holds the sending half of a oneshot channel; the dispatcher that created
/// it owns the receiver.
#[derive(Debug)]
pub struct ReplySlot {
    sender: oneshot::Sender<Message>,
    correlation_id: CorrelationId,
    created_at: Instant,
}

impl ReplySlot {
    /// Create a slot and the receiver its reply will arrive on.
    pub fn channel(correlation_id: CorrelationId) -> (Self, oneshot::Receiver<Message>) {
        let (sender, receiver) = oneshot::channel();
        let slot = Self {
            sender,
            correlation_id,
            created_at: Instant::now(),
        };
        (slot, receiver)
    }

    /// Hand the reply to the waiter. Never blocks.
    ///
    /// Returns false if the waiter is gone; the reply is discarded.
    pub fn deliver(self, reply: Message) -> bool {
        self.sender.send(reply).is_ok()
    }

    /// Whether the waiting receiver has been dropped.
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    pub fn correlation_id(&self) -> CorrelationId {
        self.correlation_id
    }

    /// Time since the slot was created.
    pub fn elapsed(&self) -> Duration {
        self.created_at.elapsed()
    }
}

struct PendingEntry {
    slot: ReplySlot,
    deadline: Option<Instant>,
}

/// Deadline `timeout` from now; `None` when it does not fit in an `Instant`.
pub fn deadline_after(timeout: Duration) -> Option<Instant> {
    Instant::now().checked_add(timeout)
}

/// Statistics for the correlation registry
#[derive(Debug, Default)]
pub struct RegistryStats {
    /// Entries registered
    pub registered: AtomicU64,
    /// Replies handed to a waiter
    pub delivered: AtomicU64,
    /// Requests resolved by timeout
    pub timed_out: AtomicU64,
    /// Requests resolved by cancellation or deadline
    pub cancelled: AtomicU64,
    /// Requests whose publish failed
    pub publish_failed: AtomicU64,
    /// Entries removed because the request future was dropped
    pub abandoned: AtomicU64,
    /// Entries removed by the sweeper
    pub swept: AtomicU64,
    /// Inbound replies that matched no waiter
    pub dropped_replies: AtomicU64,
}

impl RegistryStats {
    /// Plain-value copy of the counters.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            registered: self.registered.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            timed_out: self.timed_out.load(Ordering::Relaxed),
            cancelled: self.cancelled.load(Ordering::Relaxed),
            publish_failed: self.publish_failed.load(Ordering::Relaxed),
            abandoned: self.abandoned.load(Ordering::Relaxed),
            swept: self.swept.load(Ordering::Relaxed),
            dropped_replies: self.dropped_replies.load(Ordering::Relaxed),
        }
    }

    pub(crate) fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Point-in-time copy of `RegistryStats`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub registered: u64,
    pub delivered: u64,
    pub timed_out: u64,
    pub cancelled: u64,
    pub publish_failed: u64,
    pub abandoned: u64,
    pub swept: u64,
    pub dropped_replies: u64,
}

/// Thread-safe map from correlation id to the reply slot of the request
/// waiting on it.
///
/// An entry exists exactly while a request awaits its reply.
#[derive(Default)]
pub struct CorrelationRegistry {
    pending: DashMap<CorrelationId, PendingEntry>,
    stats: RegistryStats,
}

impl CorrelationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a slot for `correlation_id`.
    ///
    /// `deadline` must be the same instant the dispatcher's timer waits for;
    /// the sweeper only removes the entry once it is `grace` past it. `None`
    /// means no deadline. An id that is already registered is never
    /// overwritten.
    pub fn register(
        &self,
        correlation_id: CorrelationId,
        slot: ReplySlot,
        deadline: Option<Instant>,
    ) -> Result<(), RpcError> {
        match self.pending.entry(correlation_id) {
            Entry::Occupied(_) => {
                warn!(correlation_id = %correlation_id, "Correlation id already registered");
                Err(RpcError::CorrelationCollision(correlation_id))
            }
            Entry::Vacant(vacant) => {
                vacant.insert(PendingEntry { slot, deadline });
                RegistryStats::bump(&self.stats.registered);
                PENDING_REQUESTS.inc();
                debug!(correlation_id = %correlation_id, "Registered pending request");
                Ok(())
            }
        }
    }

    /// Atomically remove the entry and return its slot.
    ///
    /// `None` if the id was never registered or someone else already took it.
    pub fn take_and_remove(&self, correlation_id: &CorrelationId) -> Option<ReplySlot> {
        let (_, entry) = self.pending.remove(correlation_id)?;
        PENDING_REQUESTS.dec();
        Some(entry.slot)
    }

    /// Number of requests awaiting a reply
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Check if a correlation id is pending
    pub fn contains(&self, correlation_id: &CorrelationId) -> bool {
        self.pending.contains_key(correlation_id)
    }

    /// Get statistics
    pub fn stats(&self) -> &RegistryStats {
        &self.stats
    }

    /// Remove entries whose waiter is gone, or whose deadline passed more
    /// than `grace` ago.
    ///
    /// Returns the number of entries removed.
    pub fn remove_abandoned(&self, grace: Duration) -> usize {
        let now = Instant::now();
        let mut removed = 0;

        self.pending.retain(|id, entry| {
            let waiter_gone = entry.slot.is_closed();
            let overdue = entry
                .deadline
                .and_then(|deadline| deadline.checked_add(grace))
                .is_some_and(|limit| now > limit);

            if waiter_gone || overdue {
                warn!(
                    correlation_id = %id,
                    waiter_gone,
                    age_ms = entry.slot.elapsed().as_millis(),
                    "Removing abandoned pending request"
                );
                removed += 1;
                false
            } else {
                true
            }
        });

        if removed > 0 {
            self.stats.swept.fetch_add(removed as u64, Ordering::Relaxed);
            CORRELATION_ENTRIES_SWEPT.inc_by(removed as f64);
            PENDING_REQUESTS.sub(removed as f64);
        }
        removed
    }

    /// Run `remove_abandoned` every `interval` until the registry is dropped.
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration, grace: Duration) -> JoinHandle<()> {
        let registry: Weak<Self> = Arc::downgrade(self);

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // First tick completes immediately.
            ticker.tick().await;

            loop {
                ticker.tick().await;
                let Some(registry) = registry.upgrade() else {
                    break;
                };
                let removed = registry.remove_abandoned(grace);
                if removed > 0 {
                    debug!(removed, "Swept abandoned pending requests");
                }
            }
        })
    }
}
