//! Settle-once promises consumed by the `async` construct.
//!
//! A [`Promise`] is a single-threaded handle shared between whoever settles
//! it and whoever waits on it. Settlement callbacks run synchronously inside
//! `resolve`/`reject`; consumers that re-enter the engine defer their work
//! through the engine microtask queue.

use std::cell::RefCell;
use std::future::Future;
use std::rc::Rc;

use super::Value;

#[derive(Debug, Clone, PartialEq)]
pub enum PromiseState {
    Pending,
    Fulfilled(Value),
    Rejected(Value),
}

type Waiter = Box<dyn FnOnce(&PromiseState)>;

struct PromiseInner {
    state: RefCell<PromiseState>,
    waiters: RefCell<Vec<Waiter>>,
}

#[derive(Clone)]
pub struct Promise {
    inner: Rc<PromiseInner>,
}

impl Promise {
    /// A pending promise.
    pub fn new() -> Self {
        Self::with_state(PromiseState::Pending)
    }

    pub fn resolved(value: Value) -> Self {
        Self::with_state(PromiseState::Fulfilled(value))
    }

    pub fn rejected(reason: Value) -> Self {
        Self::with_state(PromiseState::Rejected(reason))
    }

    fn with_state(state: PromiseState) -> Self {
        Self {
            inner: Rc::new(PromiseInner {
                state: RefCell::new(state),
                waiters: RefCell::new(Vec::new()),
            }),
        }
    }

    /// Settle a promise from a local future.
    ///
    /// Must be called inside a `tokio::task::LocalSet`.
    pub fn from_future<F>(future: F) -> Self
    where
        F: Future<Output = Result<Value, Value>> + 'static,
    {
        let promise = Self::new();
        let handle = promise.clone();
        tokio::task::spawn_local(async move {
            match future.await {
                Ok(value) => handle.resolve(value),
                Err(reason) => handle.reject(reason),
            }
        });
        promise
    }

    pub fn state(&self) -> PromiseState {
        self.inner.state.borrow().clone()
    }

    pub fn is_pending(&self) -> bool {
        matches!(*self.inner.state.borrow(), PromiseState::Pending)
    }

    pub fn resolve(&self, value: Value) {
        self.settle(PromiseState::Fulfilled(value));
    }

    pub fn reject(&self, reason: Value) {
        self.settle(PromiseState::Rejected(reason));
    }

    /// Run `f` once the promise settles, or immediately if it already has.
    pub fn on_settle<F>(&self, f: F)
    where
        F: FnOnce(&PromiseState) + 'static,
    {
        let state = self.state();
        if matches!(state, PromiseState::Pending) {
            self.inner.waiters.borrow_mut().push(Box::new(f));
        } else {
            f(&state);
        }
    }

    pub fn ptr_eq(&self, other: &Promise) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    fn settle(&self, next: PromiseState) {
        {
            let mut state = self.inner.state.borrow_mut();
            if !matches!(*state, PromiseState::Pending) {
                return;
            }
            *state = next.clone();
        }
        let waiters = std::mem::take(&mut *self.inner.waiters.borrow_mut());
        for waiter in waiters {
            waiter(&next);
        }
    }
}

impl Default for Promise {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn settles_once() {
        let promise = Promise::new();
        promise.resolve(Value::from(1));
        promise.reject(Value::from("late"));
        assert_eq!(promise.state(), PromiseState::Fulfilled(Value::from(1)));
    }

    #[test]
    fn waiters_run_on_settlement() {
        let promise = Promise::new();
        let seen = Rc::new(Cell::new(false));
        let seen_clone = seen.clone();
        promise.on_settle(move |state| {
            seen_clone.set(matches!(state, PromiseState::Rejected(_)));
        });
        assert!(!seen.get());
        promise.reject(Value::from("boom"));
        assert!(seen.get());
    }

    #[tokio::test(flavor = "current_thread")]
    async fn future_adapter_resolves() {
        let local = tokio::task::LocalSet::new();
        local
            .run_until(async {
                let promise = Promise::from_future(async { Ok(Value::from("done")) });
                assert!(promise.is_pending());
                for _ in 0..10 {
                    if !promise.is_pending() {
                        break;
                    }
                    tokio::task::yield_now().await;
                }
                assert_eq!(promise.state(), PromiseState::Fulfilled(Value::from("done")));
            })
            .await;
    }
}
