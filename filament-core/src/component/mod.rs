//! Components
//!
//! A [`Component`] is one live instance of a template: its metavariables
//! (`input`, `state`, `context`, `static`), its fine-grained dependency
//! registry, the memo store behind it, and the scheduler that applies
//! queued updates in priority order.
//!
//! # Render cycle
//!
//! Creation wires three effects:
//!
//! 1. The input/context/state effect renders the template on its first
//!    run. Every later run diffs the observable paths against the previous
//!    metavariables and queues the dependents whose path changed.
//! 2. The context effect narrows the engine's shared context to the fields
//!    the template selects.
//! 3. The language effect re-translates `i18n` content.
//!
//! Queued updates are flushed in a microtask (see [`crate::engine::Engine`]),
//! so a burst of writes produces one batch.

mod lifecycle;
mod updates;

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use indexmap::IndexMap;
use serde::Serialize;

use crate::engine::Engine;
use crate::error::{Error, EvalError, Result};
use crate::events::{Emitter, EventListener, ListenerId};
use crate::expr::Host;
use crate::graph::{BatchStats, DependencyRegistry, MemoStore, UpdateScheduler};
use crate::reactive::{Effect, Signal};
use crate::render::{EventBinding, I18nBinding};
use crate::surface::{Boundaries, NodeId, Surface};
use crate::syntax::Construct;
use crate::template::Template;
use crate::value::{deep_assign, Value};

/// The observable roots of a component at one point in time.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Metavars {
    pub input: Value,
    pub state: Value,
    pub context: Value,
}

pub(crate) struct ComponentInner {
    pub(crate) name: String,
    pub(crate) path: String,
    pub(crate) template: Rc<Template>,
    pub(crate) engine: Engine,
    weak_self: Weak<ComponentInner>,

    pub(crate) input: Signal<Value>,
    pub(crate) state: Signal<Value>,
    pub(crate) context: Signal<Value>,
    /// Shared context fields this component selects.
    pub(crate) context_fields: RefCell<Vec<String>>,
    pub(crate) statics: RefCell<Value>,
    pub(crate) previous: RefCell<Metavars>,
    pub(crate) language: RefCell<String>,

    pub(crate) fgud: RefCell<DependencyRegistry>,
    pub(crate) memory: RefCell<MemoStore>,
    pub(crate) scheduler: RefCell<UpdateScheduler>,
    pub(crate) events: RefCell<Vec<EventBinding>>,
    pub(crate) i18n: RefCell<IndexMap<String, I18nBinding>>,
    /// Preserved child components, keyed by their node path.
    pub(crate) children: RefCell<IndexMap<String, Component>>,
    pub(crate) emitter: Emitter,

    pub(crate) nodes: RefCell<Vec<NodeId>>,
    pub(crate) boundaries: Cell<Option<Boundaries>>,
    pub(crate) effects: RefCell<Vec<Effect>>,
    pub(crate) construct: RefCell<Option<Box<dyn Construct>>>,
    pub(crate) failure: RefCell<Option<Error>>,
    pub(crate) rendered: Cell<bool>,
    pub(crate) destroyed: Cell<bool>,
}

impl ComponentInner {
    pub(crate) fn surface(&self) -> Rc<dyn Surface> {
        self.engine.surface()
    }

    pub(crate) fn translate(&self, text: &str) -> String {
        self.engine
            .translator()
            .translate(text, &self.language.borrow())
    }

    pub(crate) fn format(&self, reference: &str, params: &Value) -> Option<String> {
        self.engine
            .translator()
            .format(reference, params, &self.language.borrow())
    }
}

impl Host for ComponentInner {
    fn metavar(&self, name: &str) -> Option<Value> {
        match name {
            "input" => Some(self.input.get_untracked()),
            "state" => Some(self.state.get_untracked()),
            "context" => Some(self.context.get_untracked()),
            "static" => Some(self.statics.borrow().clone()),
            _ => None,
        }
    }

    fn has_method(&self, name: &str) -> bool {
        self.template.handler.has_method(name)
    }

    fn call_method(&self, name: &str, args: &[Value]) -> std::result::Result<Value, EvalError> {
        let method = self
            .template
            .handler
            .get_method(name)
            .ok_or_else(|| EvalError::UnknownMethod(name.to_string()))?;
        let inner = self.weak_self.upgrade().ok_or(EvalError::HostGone)?;
        Ok(method(&Component { inner }, args))
    }
}

/// Introspection counters of one component.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ComponentStats {
    /// (observable path, binding) entries in the registry.
    pub dependencies: usize,
    /// Distinct observable paths.
    pub dependency_paths: usize,
    pub memo_slots: usize,
    pub event_bindings: usize,
    pub i18n_bindings: usize,
    pub children: usize,
    pub pending_updates: usize,
}

/// Handle to a live component. Cloning shares the instance.
#[derive(Clone)]
pub struct Component {
    pub(crate) inner: Rc<ComponentInner>,
}

impl Component {
    pub(crate) fn from_inner(inner: Rc<ComponentInner>) -> Self {
        Self { inner }
    }

    pub(crate) fn downgrade(&self) -> Weak<ComponentInner> {
        Rc::downgrade(&self.inner)
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Component path, `{prepath}:{name}`.
    pub fn path(&self) -> &str {
        &self.inner.path
    }

    pub fn engine(&self) -> &Engine {
        &self.inner.engine
    }

    pub fn template(&self) -> &Rc<Template> {
        &self.inner.template
    }

    pub fn input(&self) -> Value {
        self.inner.input.get_untracked()
    }

    pub fn state(&self) -> Value {
        self.inner.state.get_untracked()
    }

    pub fn context(&self) -> Value {
        self.inner.context.get_untracked()
    }

    pub fn statics(&self) -> Value {
        self.inner.statics.borrow().clone()
    }

    pub fn language(&self) -> String {
        self.inner.language.borrow().clone()
    }

    /// Replace the whole input. No-op when nothing differs.
    pub fn set_input(&self, input: impl Into<Value>) {
        let input = input.into();
        if !input.is_diff(&self.inner.input.get_untracked()) {
            return;
        }
        self.inner.input.set(input);
        self.inner.hook(crate::template::Lifecycle::Input);
        self.inner.notify_construct_input();
    }

    /// Merge-patch the input: every key of `patch` is a property path.
    pub fn sub_input(&self, patch: impl Into<Value>) -> Result<()> {
        let patch = patch.into();
        let Some(entries) = patch.as_object() else {
            return Err(Error::Contract("input patch must be an object".into()));
        };
        let mut next = self.inner.input.get_untracked();
        for (path, value) in entries {
            next = deep_assign(&next, path, value.clone())?;
        }
        self.set_input(next);
        Ok(())
    }

    /// Write `value` at `path` inside the state.
    pub fn set_state(&self, path: &str, value: impl Into<Value>) -> Result<()> {
        let next = deep_assign(&self.inner.state.get_untracked(), path, value.into())?;
        self.replace_state(next);
        Ok(())
    }

    pub fn update_state<F>(&self, f: F)
    where
        F: FnOnce(&Value) -> Value,
    {
        let next = f(&self.inner.state.get_untracked());
        self.replace_state(next);
    }

    pub fn replace_state(&self, state: impl Into<Value>) {
        let state = state.into();
        if state.is_diff(&self.inner.state.get_untracked()) {
            self.inner.state.set(state);
        }
    }

    /// Statics are not observable; writing them queues nothing.
    pub fn set_static(&self, path: &str, value: impl Into<Value>) -> Result<()> {
        let next = deep_assign(&self.inner.statics.borrow(), path, value.into())?;
        *self.inner.statics.borrow_mut() = next;
        Ok(())
    }

    /// Patch the engine-wide context.
    pub fn set_context(&self, patch: impl Into<Value>) {
        self.inner.engine.set_context(patch);
    }

    /// Call a handler method. `None` when the template has no such method.
    pub fn call(&self, method: &str, args: &[Value]) -> Option<Value> {
        let method = self.inner.template.handler.get_method(method)?;
        Some(method(self, args))
    }

    pub fn on<F>(&self, event: &str, listener: F) -> ListenerId
    where
        F: Fn(&[Value]) + 'static,
    {
        let listener: EventListener = Rc::new(listener);
        self.inner.emitter.on(event, listener)
    }

    pub fn once<F>(&self, event: &str, listener: F) -> ListenerId
    where
        F: Fn(&[Value]) + 'static,
    {
        let listener: EventListener = Rc::new(listener);
        self.inner.emitter.once(event, listener)
    }

    pub fn off(&self, event: &str, id: Option<ListenerId>) {
        self.inner.emitter.off(event, id);
    }

    /// Emit to the listeners bound on this component. Returns how many ran.
    pub fn emit(&self, event: &str, payload: &[Value]) -> usize {
        self.inner.emitter.emit(event, payload)
    }

    /// Top-level output nodes, as rendered.
    pub fn nodes(&self) -> Vec<NodeId> {
        self.inner.nodes.borrow().clone()
    }

    /// Markers delimiting this component inside its parent, if any.
    pub fn boundaries(&self) -> Option<Boundaries> {
        self.inner.boundaries.get()
    }

    pub fn is_rendered(&self) -> bool {
        self.inner.rendered.get()
    }

    pub fn is_destroyed(&self) -> bool {
        self.inner.destroyed.get()
    }

    pub fn children(&self) -> Vec<Component> {
        self.inner.children.borrow().values().cloned().collect()
    }

    /// Observable paths that currently have dependents.
    pub fn dependencies(&self) -> Vec<String> {
        self.inner.fgud.borrow().deps()
    }

    /// Registry addresses bound to one observable path.
    pub fn dependents_of(&self, dep: &str) -> Vec<String> {
        self.inner
            .fgud
            .borrow()
            .get(dep)
            .iter()
            .map(|d| d.address().to_string())
            .collect()
    }

    pub fn batch_stats(&self) -> BatchStats {
        self.inner.scheduler.borrow().stats().clone()
    }

    pub fn inspect(&self) -> ComponentStats {
        let inner = &self.inner;
        let fgud = inner.fgud.borrow();
        ComponentStats {
            dependencies: fgud.len(),
            dependency_paths: fgud.deps().len(),
            memo_slots: inner.memory.borrow().len(),
            event_bindings: inner.events.borrow().len(),
            i18n_bindings: inner.i18n.borrow().len(),
            children: inner.children.borrow().len(),
            pending_updates: inner.scheduler.borrow().pending(),
        }
    }

    pub fn ptr_eq(&self, other: &Component) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Component")
            .field("path", &self.inner.path)
            .field("rendered", &self.inner.rendered.get())
            .field("destroyed", &self.inner.destroyed.get())
            .finish()
    }
}
