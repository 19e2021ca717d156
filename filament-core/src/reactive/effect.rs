//! Effect Implementation
//!
//! An Effect is a side-effecting computation that runs whenever its
//! dependencies change. Every component drives its render cycle through one.
//!
//! # How Effects Work
//!
//! 1. When created, the effect runs its function immediately to establish
//!    initial dependencies.
//!
//! 2. When any dependency changes, the effect re-runs synchronously.
//!
//! 3. Before re-running, the effect drops its old subscriptions and tracks
//!    new ones during execution.
//!
//! # Re-entrancy
//!
//! A write to one of the effect's own sources while it is running does not
//! recurse. The effect is marked pending and runs again once the current
//! run returns. The number of back-to-back reruns is bounded; past the
//! bound the effect gives up for this round and logs a warning.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::warn;

use super::context::{ReactiveContext, Source};
use super::subscriber::{Reactive, SubscriberId};

/// Counter for generating unique effect IDs.
static EFFECT_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

fn next_effect_id() -> u64 {
    EFFECT_ID_COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// Default bound on consecutive self-triggered reruns.
pub const DEFAULT_MAX_EFFECT_RERUNS: usize = 16;

struct EffectInner {
    id: u64,
    subscriber_id: SubscriberId,
    run: Box<dyn Fn()>,
    weak_self: Weak<EffectInner>,
    sources: RefCell<Vec<Rc<dyn Source>>>,
    running: Cell<bool>,
    pending: Cell<bool>,
    disposed: Cell<bool>,
    run_count: Cell<usize>,
    max_reruns: Cell<usize>,
}

impl EffectInner {
    fn execute(&self) {
        if self.disposed.get() {
            return;
        }
        if self.running.get() {
            self.pending.set(true);
            return;
        }

        self.running.set(true);
        let mut reruns = 0;
        loop {
            self.pending.set(false);
            self.run_once();

            if !self.pending.get() || self.disposed.get() {
                break;
            }
            reruns += 1;
            if reruns >= self.max_reruns.get() {
                warn!(
                    effect = self.id,
                    reruns, "effect kept invalidating itself; dropping the pending run"
                );
                self.pending.set(false);
                break;
            }
        }
        self.running.set(false);
    }

    fn run_once(&self) {
        self.clear_sources();

        let subscriber: Weak<dyn Reactive> = self.weak_self.clone();
        let _ctx = ReactiveContext::enter(self.subscriber_id, subscriber);
        (self.run)();
        *self.sources.borrow_mut() = ReactiveContext::take_sources();

        self.run_count.set(self.run_count.get() + 1);
    }

    fn clear_sources(&self) {
        let sources = std::mem::take(&mut *self.sources.borrow_mut());
        for source in sources {
            source.unsubscribe(self.subscriber_id);
        }
    }
}

impl Reactive for EffectInner {
    fn subscriber_id(&self) -> SubscriberId {
        self.subscriber_id
    }

    fn notify(&self) {
        self.execute();
    }
}

/// A side-effecting computation that runs when dependencies change.
///
/// # Example
///
/// ```rust,ignore
/// let count = Signal::new(0);
///
/// let effect = Effect::new({
///     let count = count.clone();
///     move || println!("Count is: {}", count.get())
/// });
///
/// count.set(5);  // Prints: "Count is: 5"
/// ```
pub struct Effect {
    inner: Rc<EffectInner>,
}

impl Effect {
    /// Create a new effect with the given function.
    ///
    /// The function runs immediately to establish initial dependencies.
    pub fn new<F>(run: F) -> Self
    where
        F: Fn() + 'static,
    {
        let effect = Self::new_lazy(run);
        effect.execute();
        effect
    }

    /// Create a new effect without running it immediately.
    pub fn new_lazy<F>(run: F) -> Self
    where
        F: Fn() + 'static,
    {
        let inner = Rc::new_cyclic(|weak_self| EffectInner {
            id: next_effect_id(),
            subscriber_id: SubscriberId::new(),
            run: Box::new(run),
            weak_self: weak_self.clone(),
            sources: RefCell::new(Vec::new()),
            running: Cell::new(false),
            pending: Cell::new(false),
            disposed: Cell::new(false),
            run_count: Cell::new(0),
            max_reruns: Cell::new(DEFAULT_MAX_EFFECT_RERUNS),
        });
        Self { inner }
    }

    /// Override the rerun bound.
    pub fn with_max_reruns(self, max_reruns: usize) -> Self {
        self.inner.max_reruns.set(max_reruns.max(1));
        self
    }

    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn subscriber_id(&self) -> SubscriberId {
        self.inner.subscriber_id
    }

    /// Execute the effect function within a reactive context.
    pub fn execute(&self) {
        self.inner.execute();
    }

    /// Called when a dependency changes.
    pub fn schedule(&self) {
        self.inner.execute();
    }

    /// Stop the effect and release every subscription. Idempotent.
    pub fn dispose(&self) {
        if self.inner.disposed.replace(true) {
            return;
        }
        self.inner.clear_sources();
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.get()
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.get()
    }

    pub fn run_count(&self) -> usize {
        self.inner.run_count.get()
    }

    pub fn dependency_count(&self) -> usize {
        self.inner.sources.borrow().len()
    }
}

impl Clone for Effect {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl std::fmt::Debug for Effect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Effect")
            .field("id", &self.inner.id)
            .field("run_count", &self.run_count())
            .field("dependency_count", &self.dependency_count())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::Signal;

    fn counter() -> (Rc<Cell<i32>>, Rc<Cell<i32>>) {
        let count = Rc::new(Cell::new(0));
        (count.clone(), count)
    }

    #[test]
    fn effect_runs_on_creation() {
        let (runs, runs_clone) = counter();

        let _effect = Effect::new(move || runs_clone.set(runs_clone.get() + 1));

        assert_eq!(runs.get(), 1);
    }

    #[test]
    fn effect_lazy_does_not_run_on_creation() {
        let (runs, runs_clone) = counter();

        let effect = Effect::new_lazy(move || runs_clone.set(runs_clone.get() + 1));
        assert_eq!(runs.get(), 0);
        assert_eq!(effect.run_count(), 0);

        effect.execute();
        assert_eq!(runs.get(), 1);
        assert_eq!(effect.run_count(), 1);
    }

    #[test]
    fn effect_reruns_when_a_signal_changes() {
        let signal = Signal::new(1);
        let seen = Rc::new(Cell::new(0));

        let effect = Effect::new({
            let signal = signal.clone();
            let seen = seen.clone();
            move || seen.set(signal.get())
        });
        assert_eq!(seen.get(), 1);
        assert_eq!(effect.dependency_count(), 1);

        signal.set(7);
        assert_eq!(seen.get(), 7);
        assert_eq!(effect.run_count(), 2);
    }

    #[test]
    fn effect_does_not_run_after_disposal() {
        let signal = Signal::new(0);
        let (runs, runs_clone) = counter();

        let effect = Effect::new({
            let signal = signal.clone();
            move || {
                signal.get();
                runs_clone.set(runs_clone.get() + 1);
            }
        });
        assert_eq!(signal.subscriber_count(), 1);

        effect.dispose();
        effect.dispose();
        assert!(effect.is_disposed());
        assert_eq!(signal.subscriber_count(), 0);

        signal.set(1);
        effect.execute();
        assert_eq!(runs.get(), 1);
    }

    #[test]
    fn self_write_defers_a_single_rerun() {
        let signal = Signal::new(0);
        let (runs, runs_clone) = counter();

        let _effect = Effect::new({
            let signal = signal.clone();
            move || {
                runs_clone.set(runs_clone.get() + 1);
                if signal.get() < 3 {
                    signal.set(signal.get_untracked() + 1);
                }
            }
        });

        assert_eq!(signal.get_untracked(), 3);
        assert_eq!(runs.get(), 4);
    }

    #[test]
    fn runaway_self_writes_are_bounded() {
        let signal = Signal::new(0);

        let effect = Effect::new_lazy({
            let signal = signal.clone();
            move || signal.set(signal.get() + 1)
        })
        .with_max_reruns(5);
        effect.execute();

        assert_eq!(effect.run_count(), 5);
        assert!(!effect.is_running());
    }

    #[test]
    fn effect_clone_shares_state() {
        let effect1 = Effect::new(|| {});
        let effect2 = effect1.clone();

        assert_eq!(effect1.id(), effect2.id());
        effect1.execute();
        assert_eq!(effect2.run_count(), 2);

        effect1.dispose();
        assert!(effect2.is_disposed());
    }
}
