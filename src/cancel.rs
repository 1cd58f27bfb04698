//! Cancellation signaling
//!
//! Broadcast-based cancellation with a recorded cause. Scopes are linked
//! parent to child so a caller-level cancel propagates down to object and
//! part workers.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::broadcast;

use crate::error::UploadError;

/// A cancelable scope carrying the cause of the first cancellation.
///
/// Clones share the same scope. `child` derives a scope that cancels when
/// the parent does but can also be canceled on its own.
#[derive(Clone)]
pub struct CancelSignal {
    inner: Arc<SignalInner>,
}

struct SignalInner {
    sender: broadcast::Sender<()>,
    canceled: AtomicBool,
    cause: Mutex<Option<String>>,
}

impl CancelSignal {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(1);
        CancelSignal {
            inner: Arc::new(SignalInner {
                sender,
                canceled: AtomicBool::new(false),
                cause: Mutex::new(None),
            }),
        }
    }

    /// Cancels the scope. The first cause wins; later calls are no-ops.
    pub fn cancel(&self, cause: impl Into<String>) {
        if !self.inner.canceled.swap(true, Ordering::SeqCst) {
            *self.inner.cause.lock() = Some(cause.into());
            let _ = self.inner.sender.send(());
        }
    }

    pub fn is_canceled(&self) -> bool {
        self.inner.canceled.load(Ordering::SeqCst)
    }

    /// The recorded cause, if the scope has been canceled.
    pub fn cause(&self) -> Option<String> {
        self.inner.cause.lock().clone()
    }

    /// The cancellation rendered as an error, for recording into results.
    pub fn cancel_error(&self) -> UploadError {
        UploadError::Canceled {
            cause: self.cause().unwrap_or_else(|| "canceled".to_string()),
        }
    }

    /// Resolves once the scope is canceled.
    pub async fn canceled(&self) {
        // subscribe before checking the flag so a concurrent cancel is not
        // missed between the check and the wait
        let mut receiver = self.inner.sender.subscribe();
        if self.is_canceled() {
            return;
        }

        loop {
            match receiver.recv().await {
                Ok(()) => return,
                Err(broadcast::error::RecvError::Lagged(_)) => {
                    if self.is_canceled() {
                        return;
                    }
                }
                // we hold a sender through self, so the channel cannot
                // close before a cancel is observed
                Err(broadcast::error::RecvError::Closed) => return,
            }
        }
    }

    /// Derives a scope that follows this one: canceling the parent cancels
    /// the child with the parent's cause. Canceling the child does not
    /// affect the parent.
    pub fn child(&self) -> CancelSignal {
        let child = CancelSignal::new();

        let parent = self.clone();
        let linked = child.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = parent.canceled() => {
                    linked.cancel(parent.cause().unwrap_or_else(|| "canceled".to_string()));
                }
                _ = linked.canceled() => {}
            }
        });

        child
    }
}

impl Default for CancelSignal {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn cancel_wakes_waiters() {
        let signal = CancelSignal::new();
        let waiter = signal.clone();

        let handle = tokio::spawn(async move {
            waiter.canceled().await;
            42
        });

        signal.cancel("test");
        assert_eq!(handle.await.unwrap(), 42);
        assert_eq!(signal.cause().as_deref(), Some("test"));
    }

    #[tokio::test]
    async fn first_cause_wins() {
        let signal = CancelSignal::new();
        signal.cancel("first");
        signal.cancel("second");
        assert_eq!(signal.cause().as_deref(), Some("first"));
    }

    #[tokio::test]
    async fn canceled_resolves_after_the_fact() {
        let signal = CancelSignal::new();
        signal.cancel("done");
        signal.canceled().await;
        assert!(signal.is_canceled());
    }

    #[tokio::test]
    async fn child_follows_parent() {
        let parent = CancelSignal::new();
        let child = parent.child();

        parent.cancel("parent gone");
        child.canceled().await;
        assert_eq!(child.cause().as_deref(), Some("parent gone"));
    }

    #[tokio::test]
    async fn child_cancel_leaves_parent_alone() {
        let parent = CancelSignal::new();
        let child = parent.child();

        child.cancel("local");
        child.canceled().await;
        assert!(!parent.is_canceled());
    }
}
