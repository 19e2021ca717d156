//! Subscriber types for the reactive system.
//!
//! A subscriber is any computation that depends on reactive values: an
//! effect, a component render cycle, or a plain callback.

use std::sync::atomic::{AtomicU64, Ordering};

/// Unique identifier for a subscriber.
///
/// Each subscriber gets a unique ID when created. Signals use it to avoid
/// duplicate subscriptions and to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(u64);

impl SubscriberId {
    /// Generate a new unique subscriber ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for SubscriberId {
    fn default() -> Self {
        Self::new()
    }
}

/// Something a signal can notify.
pub trait Reactive {
    fn subscriber_id(&self) -> SubscriberId;

    /// One of the values this subscriber read has changed.
    fn notify(&self);
}

/// A subscriber backed by a plain callback, for exercising signals
/// without an effect.
#[cfg(test)]
pub(crate) struct Subscriber {
    id: SubscriberId,
    notify: Box<dyn Fn()>,
}

#[cfg(test)]
impl Subscriber {
    pub fn new<F>(notify: F) -> Self
    where
        F: Fn() + 'static,
    {
        Self {
            id: SubscriberId::new(),
            notify: Box::new(notify),
        }
    }

    pub fn id(&self) -> SubscriberId {
        self.id
    }
}

#[cfg(test)]
impl Reactive for Subscriber {
    fn subscriber_id(&self) -> SubscriberId {
        self.id
    }

    fn notify(&self) {
        (self.notify)();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    #[test]
    fn subscriber_ids_are_unique() {
        let id1 = SubscriberId::new();
        let id2 = SubscriberId::new();
        let id3 = SubscriberId::new();

        assert_ne!(id1, id2);
        assert_ne!(id2, id3);
        assert_ne!(id1, id3);
    }

    #[test]
    fn subscriber_notify_calls_callback() {
        let called = Rc::new(Cell::new(false));
        let called_clone = called.clone();

        let subscriber = Subscriber::new(move || called_clone.set(true));

        assert!(!called.get());
        subscriber.notify();
        assert!(called.get());
    }
}
