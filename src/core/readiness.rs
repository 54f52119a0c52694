//! One-shot readiness signal
//!
//! A [`ReadinessSignal`] is the availability token a reader hands to its
//! driver when [`InputStatus::NothingAvailableNow`](super::InputStatus) is
//! returned. Background fetchers call [`ReadinessSignal::signal`] once data
//! lands; the driver awaits [`ReadinessSignal::wait_until_ready`] before
//! polling again.
//!
//! The signal is one-shot and idempotent: only the first `signal()` has an
//! effect, and once signalled every past and future waiter observes readiness
//! immediately and permanently.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

#[derive(Debug, Default)]
struct Inner {
    ready: AtomicBool,
    notify: Notify,
}

/// Cloneable handle to a one-shot completion
#[derive(Debug, Clone, Default)]
pub struct ReadinessSignal {
    inner: Arc<Inner>,
}

impl ReadinessSignal {
    /// Create a signal that has not fired yet
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a signal that is already ready
    pub fn ready() -> Self {
        let signal = Self::new();
        signal.signal();
        signal
    }

    /// Mark the signal ready and release all waiters.
    ///
    /// Returns `true` only for the call that flipped the state.
    pub fn signal(&self) -> bool {
        if self.inner.ready.swap(true, Ordering::AcqRel) {
            return false;
        }
        self.inner.notify.notify_waiters();
        true
    }

    /// Non-blocking point check
    pub fn is_ready(&self) -> bool {
        self.inner.ready.load(Ordering::Acquire)
    }

    /// Suspend the calling task until the signal has fired
    pub async fn wait_until_ready(&self) {
        loop {
            let notified = self.inner.notify.notified();
            tokio::pin!(notified);
            // Register before the check so a concurrent signal() cannot slip between them.
            notified.as_mut().enable();
            if self.is_ready() {
                return;
            }
            notified.await;
        }
    }

    /// Wait for readiness for at most `timeout`; returns whether it was observed
    pub async fn wait_timeout(&self, timeout: Duration) -> bool {
        tokio::time::timeout(timeout, self.wait_until_ready())
            .await
            .is_ok()
    }

    /// Whether two handles refer to the same underlying signal
    pub fn same_as(&self, other: &ReadinessSignal) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}
