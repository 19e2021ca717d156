//! Signal Implementation
//!
//! A Signal is the fundamental reactive primitive. It holds a value and
//! tracks which computations depend on it.
//!
//! # How Signals Work
//!
//! 1. When a signal is read within a reactive context (an effect), the
//!    signal registers that context as a subscriber.
//!
//! 2. When a signal's value is set, all live subscribers are notified
//!    synchronously.
//!
//! 3. The caller decides whether a write is a change. Signals do not
//!    compare values; component hosts diff input, state and context before
//!    writing.
//!
//! Subscribers are held weakly, so a dropped effect silently falls out of
//! the list on the next notification.

use std::cell::RefCell;
use std::fmt::Debug;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use super::context::{ReactiveContext, Source};
use super::subscriber::{Reactive, SubscriberId};

fn next_signal_id() -> u64 {
    static SIGNAL_ID_COUNTER: AtomicU64 = AtomicU64::new(0);
    SIGNAL_ID_COUNTER.fetch_add(1, Ordering::Relaxed)
}

struct SignalCore<T> {
    id: u64,
    value: RefCell<T>,
    subscribers: RefCell<Vec<(SubscriberId, Weak<dyn Reactive>)>>,
}

impl<T> SignalCore<T> {
    fn subscribe(&self, id: SubscriberId, subscriber: Weak<dyn Reactive>) {
        let mut subs = self.subscribers.borrow_mut();
        if !subs.iter().any(|(existing, _)| *existing == id) {
            subs.push((id, subscriber));
        }
    }
}

impl<T> Source for SignalCore<T> {
    fn source_id(&self) -> u64 {
        self.id
    }

    fn unsubscribe(&self, subscriber: SubscriberId) {
        self.subscribers
            .borrow_mut()
            .retain(|(id, _)| *id != subscriber);
    }
}

/// A reactive cell holding a value of type `T`.
///
/// ```rust,ignore
/// let count = Signal::new(0);
/// let value = count.get();
/// count.set(5); // notifies subscribers
/// ```
pub struct Signal<T: Clone + 'static> {
    core: Rc<SignalCore<T>>,
}

impl<T: Clone + 'static> Signal<T> {
    pub fn new(value: T) -> Self {
        Self {
            core: Rc::new(SignalCore {
                id: next_signal_id(),
                value: RefCell::new(value),
                subscribers: RefCell::new(Vec::new()),
            }),
        }
    }

    pub fn id(&self) -> u64 {
        self.core.id
    }

    /// Read the value, subscribing the running computation.
    pub fn get(&self) -> T {
        if let Some((id, subscriber)) = ReactiveContext::current() {
            self.core.subscribe(id, subscriber);
            ReactiveContext::track(self.core.clone());
        }
        self.core.value.borrow().clone()
    }

    /// Read the value without establishing a dependency.
    pub fn get_untracked(&self) -> T {
        self.core.value.borrow().clone()
    }

    /// Borrow the value without cloning or tracking.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.core.value.borrow())
    }

    /// Store a new value and notify subscribers.
    pub fn set(&self, value: T) {
        *self.core.value.borrow_mut() = value;
        self.notify_subscribers();
    }

    /// Replace the value without notifying anyone.
    pub fn set_silent(&self, value: T) {
        *self.core.value.borrow_mut() = value;
    }

    pub fn update<F>(&self, f: F)
    where
        F: FnOnce(&T) -> T,
    {
        let next = f(&self.core.value.borrow());
        self.set(next);
    }

    /// Register a subscriber explicitly.
    pub fn subscribe(&self, subscriber: &Rc<dyn Reactive>) {
        self.core
            .subscribe(subscriber.subscriber_id(), Rc::downgrade(subscriber));
    }

    pub fn unsubscribe(&self, subscriber: SubscriberId) {
        self.core.unsubscribe(subscriber);
    }

    fn notify_subscribers(&self) {
        // Snapshot first: a notified effect may resubscribe while running.
        let live: Vec<Rc<dyn Reactive>> = {
            let mut subs = self.core.subscribers.borrow_mut();
            subs.retain(|(_, weak)| weak.strong_count() > 0);
            subs.iter().filter_map(|(_, weak)| weak.upgrade()).collect()
        };
        for subscriber in live {
            subscriber.notify();
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.core
            .subscribers
            .borrow()
            .iter()
            .filter(|(_, weak)| weak.strong_count() > 0)
            .count()
    }
}

impl<T: Clone + 'static> Clone for Signal<T> {
    fn clone(&self) -> Self {
        Self {
            core: Rc::clone(&self.core),
        }
    }
}

impl<T: Clone + Debug + 'static> Debug for Signal<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signal")
            .field("id", &self.core.id)
            .field("value", &*self.core.value.borrow())
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::subscriber::Subscriber;
    use std::cell::Cell;

    #[test]
    fn signal_get_and_set() {
        let signal = Signal::new(0);
        assert_eq!(signal.get(), 0);

        signal.set(42);
        assert_eq!(signal.get(), 42);
    }

    #[test]
    fn signal_update() {
        let signal = Signal::new(10);
        signal.update(|v| v + 5);
        assert_eq!(signal.get(), 15);
    }

    #[test]
    fn signal_notifies_subscribers() {
        let signal = Signal::new(0);
        let calls = Rc::new(Cell::new(0));
        let calls_clone = calls.clone();

        let subscriber: Rc<dyn Reactive> =
            Rc::new(Subscriber::new(move || calls_clone.set(calls_clone.get() + 1)));
        signal.subscribe(&subscriber);

        signal.set(1);
        signal.set(2);
        assert_eq!(calls.get(), 2);

        signal.unsubscribe(subscriber.subscriber_id());
        signal.set(3);
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn dropped_subscribers_are_pruned() {
        let signal = Signal::new(0);
        {
            let subscriber: Rc<dyn Reactive> = Rc::new(Subscriber::new(|| {}));
            signal.subscribe(&subscriber);
            assert_eq!(signal.subscriber_count(), 1);
        }
        signal.set(1);
        assert_eq!(signal.subscriber_count(), 0);
    }

    #[test]
    fn signal_clone_shares_state() {
        let signal1 = Signal::new(0);
        let signal2 = signal1.clone();

        signal1.set(42);
        assert_eq!(signal2.get(), 42);
        assert_eq!(signal1.id(), signal2.id());
    }
}
