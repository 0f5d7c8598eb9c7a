//! Subscription handles: the unit of cancellation.

use std::fmt;
use std::sync::{Mutex, PoisonError};

type Teardown = Box<dyn FnOnce() + Send>;

/// Handle keeping an observer (or any linked effect) attached.
///
/// Dropping the handle disposes it. [`Subscription::dispose`] may be called
/// any number of times; only the first call runs the teardown.
#[must_use = "dropping a Subscription detaches the observer immediately"]
pub struct Subscription {
    teardown: Mutex<Option<Teardown>>,
}

impl Subscription {
    /// Wrap a teardown closure.
    pub fn new(teardown: impl FnOnce() + Send + 'static) -> Self {
        Self {
            teardown: Mutex::new(Some(Box::new(teardown))),
        }
    }

    /// A subscription with nothing to tear down.
    pub fn empty() -> Self {
        Self {
            teardown: Mutex::new(None),
        }
    }

    /// Bundle several subscriptions so they are disposed together, in order.
    pub fn all(subscriptions: impl IntoIterator<Item = Subscription>) -> Self {
        let subscriptions: Vec<Subscription> = subscriptions.into_iter().collect();
        Self::new(move || {
            for subscription in subscriptions {
                subscription.dispose();
            }
        })
    }

    /// Detach. Idempotent and panic-free with respect to repeated calls.
    pub fn dispose(&self) {
        let teardown = self
            .teardown
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(teardown) = teardown {
            teardown();
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.teardown
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("disposed", &self.is_disposed())
            .finish()
    }
}
