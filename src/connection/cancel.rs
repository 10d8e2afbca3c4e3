//! Monotonic cancellation signal shared by both pumps and the door

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

struct Inner {
    raised: AtomicBool,
    notify: Notify,
}

/// Broadcast-once cancellation flag
///
/// Once raised it never resets. Cheap to clone; all clones observe the same
/// flag.
#[derive(Clone)]
pub struct CancelSignal {
    inner: Arc<Inner>,
}

impl CancelSignal {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                raised: AtomicBool::new(false),
                notify: Notify::new(),
            }),
        }
    }

    /// Raise the signal
    ///
    /// Returns `true` only for the call that actually raised it.
    pub fn cancel(&self) -> bool {
        if self.inner.raised.swap(true, Ordering::SeqCst) {
            return false;
        }
        self.inner.notify.notify_waiters();
        true
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.inner.raised.load(Ordering::SeqCst)
    }

    /// Wait until the signal is raised
    pub async fn cancelled(&self) {
        loop {
            let notified = self.inner.notify.notified();
            tokio::pin!(notified);
            // Register before checking so a concurrent cancel is not missed
            notified.as_mut().enable();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

impl Default for CancelSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CancelSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancelSignal")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}
