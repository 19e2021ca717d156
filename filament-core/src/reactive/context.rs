//! Reactive Context
//!
//! The reactive context tracks which computation is currently running.
//! When a signal is read, it registers the current computation as a
//! subscriber and records itself as one of the computation's sources.
//!
//! # Implementation
//!
//! A thread-local stack holds one entry per running computation. Entering a
//! computation pushes an entry; the returned guard pops it. Nested effects
//! (a component effect creating a child component's effect) each see their
//! own entry. [`untrack`] pushes an entry without a subscriber so reads
//! inside it register nothing.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use super::subscriber::{Reactive, SubscriberId};

/// A value a computation can depend on.
pub trait Source {
    fn source_id(&self) -> u64;

    fn unsubscribe(&self, subscriber: SubscriberId);
}

thread_local! {
    static CONTEXT_STACK: RefCell<Vec<ContextEntry>> = const { RefCell::new(Vec::new()) };
}

struct ContextEntry {
    subscriber: Option<(SubscriberId, Weak<dyn Reactive>)>,
    /// Sources read during this computation, first read first.
    sources: Vec<Rc<dyn Source>>,
}

/// Guard that pops the context when dropped.
pub struct ReactiveContext {
    subscriber_id: Option<SubscriberId>,
}

impl ReactiveContext {
    /// Enter a new reactive context for the given subscriber.
    pub fn enter(subscriber_id: SubscriberId, subscriber: Weak<dyn Reactive>) -> Self {
        CONTEXT_STACK.with(|stack| {
            stack.borrow_mut().push(ContextEntry {
                subscriber: Some((subscriber_id, subscriber)),
                sources: Vec::new(),
            });
        });
        Self {
            subscriber_id: Some(subscriber_id),
        }
    }

    fn enter_untracked() -> Self {
        CONTEXT_STACK.with(|stack| {
            stack.borrow_mut().push(ContextEntry {
                subscriber: None,
                sources: Vec::new(),
            });
        });
        Self {
            subscriber_id: None,
        }
    }

    pub fn is_active() -> bool {
        CONTEXT_STACK.with(|stack| {
            stack
                .borrow()
                .last()
                .is_some_and(|entry| entry.subscriber.is_some())
        })
    }

    /// The running subscriber, if any.
    pub fn current() -> Option<(SubscriberId, Weak<dyn Reactive>)> {
        CONTEXT_STACK.with(|stack| {
            stack
                .borrow()
                .last()
                .and_then(|entry| entry.subscriber.clone())
        })
    }

    pub fn current_subscriber() -> Option<SubscriberId> {
        Self::current().map(|(id, _)| id)
    }

    /// Record a source read by the current computation.
    pub fn track(source: Rc<dyn Source>) {
        CONTEXT_STACK.with(|stack| {
            if let Some(entry) = stack.borrow_mut().last_mut() {
                if entry.subscriber.is_none() {
                    return;
                }
                let id = source.source_id();
                if !entry.sources.iter().any(|s| s.source_id() == id) {
                    entry.sources.push(source);
                }
            }
        });
    }

    /// Drain the sources collected in the current context.
    pub fn take_sources() -> Vec<Rc<dyn Source>> {
        CONTEXT_STACK.with(|stack| {
            stack
                .borrow_mut()
                .last_mut()
                .map(|entry| std::mem::take(&mut entry.sources))
                .unwrap_or_default()
        })
    }
}

impl Drop for ReactiveContext {
    fn drop(&mut self) {
        CONTEXT_STACK.with(|stack| {
            let popped = stack.borrow_mut().pop();
            if let Some(entry) = popped {
                debug_assert_eq!(
                    entry.subscriber.map(|(id, _)| id),
                    self.subscriber_id,
                    "ReactiveContext mismatch"
                );
            }
        });
    }
}

/// Run `f` without registering any signal reads.
pub fn untrack<T>(f: impl FnOnce() -> T) -> T {
    let _ctx = ReactiveContext::enter_untracked();
    f()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::subscriber::Subscriber;

    fn subscriber() -> (SubscriberId, Rc<dyn Reactive>) {
        let sub = Subscriber::new(|| {});
        (sub.id(), Rc::new(sub))
    }

    #[test]
    fn context_tracks_subscriber() {
        let (id, sub) = subscriber();

        assert!(!ReactiveContext::is_active());
        assert!(ReactiveContext::current_subscriber().is_none());

        {
            let _ctx = ReactiveContext::enter(id, Rc::downgrade(&sub));
            assert!(ReactiveContext::is_active());
            assert_eq!(ReactiveContext::current_subscriber(), Some(id));
        }

        assert!(!ReactiveContext::is_active());
    }

    #[test]
    fn nested_contexts() {
        let (id1, sub1) = subscriber();
        let (id2, sub2) = subscriber();

        {
            let _ctx1 = ReactiveContext::enter(id1, Rc::downgrade(&sub1));
            {
                let _ctx2 = ReactiveContext::enter(id2, Rc::downgrade(&sub2));
                assert_eq!(ReactiveContext::current_subscriber(), Some(id2));
            }
            assert_eq!(ReactiveContext::current_subscriber(), Some(id1));
        }

        assert!(ReactiveContext::current_subscriber().is_none());
    }

    #[test]
    fn untrack_hides_the_running_subscriber() {
        let (id, sub) = subscriber();
        let _ctx = ReactiveContext::enter(id, Rc::downgrade(&sub));
        untrack(|| assert!(ReactiveContext::current_subscriber().is_none()));
        assert_eq!(ReactiveContext::current_subscriber(), Some(id));
    }
}
