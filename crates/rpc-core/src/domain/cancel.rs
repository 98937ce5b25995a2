//! Caller-side cancellation.
//!
//! A `CancelSource` fires at most once with a cause; any number of
//! `CancelSignal`s observe it. Built on `tokio::sync::watch` so late
//! observers still see a cancellation that already happened.

use std::sync::Arc;
use thiserror::Error;
use tokio::sync::watch;

/// Why a request was cancelled.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CancelCause {
    /// Explicit cancellation with a caller-supplied reason.
    #[error("cancelled: {0}")]
    Cancelled(String),

    /// The caller's absolute deadline passed.
    #[error("deadline exceeded")]
    DeadlineExceeded,
}

/// Create a connected source/signal pair.
pub fn cancel_pair() -> (CancelSource, CancelSignal) {
    let (tx, rx) = watch::channel(None);
    (CancelSource { tx: Arc::new(tx) }, CancelSignal { rx })
}

/// The firing side of a cancellation.
#[derive(Debug, Clone)]
pub struct CancelSource {
    tx: Arc<watch::Sender<Option<CancelCause>>>,
}

impl CancelSource {
    /// Cancel with a reason. Returns `false` if already cancelled; the first
    /// cause sticks.
    pub fn cancel(&self, reason: impl Into<String>) -> bool {
        let cause = CancelCause::Cancelled(reason.into());
        self.tx.send_if_modified(|current| {
            if current.is_some() {
                return false;
            }
            *current = Some(cause);
            true
        })
    }

    /// Whether `cancel` has been called.
    pub fn is_cancelled(&self) -> bool {
        self.tx.borrow().is_some()
    }

    /// A new observer of this source.
    pub fn signal(&self) -> CancelSignal {
        CancelSignal {
            rx: self.tx.subscribe(),
        }
    }
}

/// The observing side of a cancellation.
#[derive(Debug, Clone)]
pub struct CancelSignal {
    rx: watch::Receiver<Option<CancelCause>>,
}

impl CancelSignal {
    /// The cause, if cancellation already happened.
    pub fn cause(&self) -> Option<CancelCause> {
        self.rx.borrow().clone()
    }

    /// Wait until cancelled.
    ///
    /// Never completes if every source is dropped without cancelling.
    pub async fn cancelled(&self) -> CancelCause {
        let mut rx = self.rx.clone();
        loop {
            let current = rx.borrow_and_update().clone();
            if let Some(cause) = current {
                return cause;
            }
            if rx.changed().await.is_err() {
                return std::future::pending().await;
            }
        }
    }
}
