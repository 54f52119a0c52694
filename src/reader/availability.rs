//! Renewable availability token shared between a reader and its fetchers

use crate::core::ReadinessSignal;
use std::sync::{Arc, Mutex, MutexGuard};

/// Holds the reader's current [`ReadinessSignal`].
///
/// Fetchers fire whatever token is current; the reader swaps in a fresh one
/// once the previous token has fired.
#[derive(Debug, Clone, Default)]
pub struct Availability {
    current: Arc<Mutex<ReadinessSignal>>,
}

impl Availability {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, ReadinessSignal> {
        // The guarded value is a handle; a panic while holding it cannot corrupt it.
        self.current
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Fire the current token
    pub fn notify(&self) {
        self.lock().signal();
    }

    /// The current token, replaced first if it has already fired
    pub fn renew(&self) -> ReadinessSignal {
        let mut current = self.lock();
        if current.is_ready() {
            *current = ReadinessSignal::new();
        }
        current.clone()
    }

    pub fn current(&self) -> ReadinessSignal {
        self.lock().clone()
    }
}

/// Fires the token when dropped, so waiters observe a fetcher that died
pub(crate) struct NotifyOnDrop(pub(crate) Availability);

impl Drop for NotifyOnDrop {
    fn drop(&mut self) {
        self.0.notify();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_renew_keeps_unfired_token() {
        let availability = Availability::new();
        let first = availability.renew();
        let second = availability.renew();
        assert!(first.same_as(&second));
    }

    #[test]
    fn test_renew_replaces_fired_token() {
        let availability = Availability::new();
        let first = availability.renew();
        availability.notify();
        assert!(first.is_ready());

        let second = availability.renew();
        assert!(!second.same_as(&first));
        assert!(!second.is_ready());
    }

    #[test]
    fn test_drop_guard_fires_token() {
        let availability = Availability::new();
        let token = availability.renew();
        drop(NotifyOnDrop(availability.clone()));
        assert!(token.is_ready());
    }
}
