//! Creation, the render cycle, mounting and teardown.

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Instant;

use indexmap::IndexMap;
use tracing::{debug, error};

use super::{Component, ComponentInner, Metavars};
use crate::engine::Engine;
use crate::error::{Error, Result};
use crate::events::Emitter;
use crate::graph::path::component_path;
use crate::graph::{DependencyRegistry, MemoStore, UpdateScheduler};
use crate::reactive::{untrack, Effect, Signal};
use crate::render;
use crate::surface::{Boundaries, NodeId};
use crate::syntax::{Construct, ConstructSignal};
use crate::template::{Lifecycle, Template};
use crate::value::{Object, Value};

/// Pick the template's context fields out of the shared context.
fn select_context(shared: &Value, fields: &[String]) -> Value {
    let mut selected = Object::new();
    for field in fields {
        selected.insert(field.clone(), shared.get(field));
    }
    Value::object(selected)
}

impl Component {
    /// Instantiate and render `template`.
    ///
    /// The first render runs synchronously inside the component's main
    /// effect. A render failure destroys the half-built instance and is
    /// returned here.
    pub(crate) fn create(
        engine: &Engine,
        name: &str,
        template: Rc<Template>,
        input: Value,
        prepath: &str,
        boundaries: Option<Boundaries>,
    ) -> Result<Component> {
        template.validate(name)?;

        let input = if input.is_nullish() {
            Value::empty_object()
        } else {
            input
        };
        let context = select_context(&engine.context(), &template.context);
        let state = template.state.deep_clone();
        let statics = template.statics.deep_clone();
        let initial = Metavars {
            input: input.clone(),
            state: state.clone(),
            context: context.clone(),
        };

        let inner = Rc::new_cyclic(|weak_self| ComponentInner {
            name: name.to_string(),
            path: component_path(prepath, name),
            template: template.clone(),
            engine: engine.clone(),
            weak_self: weak_self.clone(),
            input: Signal::new(input.clone()),
            state: Signal::new(state),
            context: Signal::new(context),
            context_fields: RefCell::new(template.context.clone()),
            statics: RefCell::new(statics),
            previous: RefCell::new(initial),
            language: RefCell::new(engine.language()),
            fgud: RefCell::new(DependencyRegistry::new()),
            memory: RefCell::new(MemoStore::new()),
            scheduler: RefCell::new(UpdateScheduler::new()),
            events: RefCell::new(Vec::new()),
            i18n: RefCell::new(IndexMap::new()),
            children: RefCell::new(IndexMap::new()),
            emitter: Emitter::new(),
            nodes: RefCell::new(Vec::new()),
            boundaries: Cell::new(boundaries),
            effects: RefCell::new(Vec::new()),
            construct: RefCell::new(None),
            failure: RefCell::new(None),
            rendered: Cell::new(false),
            destroyed: Cell::new(false),
        });
        engine.metrics().component_created();
        debug!(component = %inner.path, "component created");

        if let Some(factory) = &template.construct {
            *inner.construct.borrow_mut() = Some(factory());
        }

        inner.hook(Lifecycle::Create);
        if input.as_object().is_some_and(|map| !map.is_empty()) {
            inner.hook(Lifecycle::Input);
        }

        if !template.context.is_empty() {
            inner.watch_context();
        }
        inner.watch_language();
        inner.start_render_cycle();

        let failure = inner.failure.borrow_mut().take();
        let component = Component { inner };
        if let Some(err) = failure {
            component.destroy();
            return Err(err);
        }
        Ok(component)
    }

    /// Run `f` with the construct taken out of its cell.
    ///
    /// Returns `None` when there is no construct, or when it is already
    /// running further up the stack.
    pub(crate) fn with_construct<R>(
        &self,
        f: impl FnOnce(&mut dyn Construct, &Component) -> Result<R>,
    ) -> Option<Result<R>> {
        let mut construct = self.inner.construct.borrow_mut().take()?;
        let result = f(construct.as_mut(), self);
        if self.inner.destroyed.get() {
            construct.on_destroy(self);
        } else {
            *self.inner.construct.borrow_mut() = Some(construct);
        }
        Some(result)
    }

    /// Deliver an asynchronous signal to the construct.
    pub(crate) fn signal_construct(&self, signal: ConstructSignal) {
        if self.inner.destroyed.get() {
            return;
        }
        if let Some(Err(err)) = self.with_construct(|construct, cx| construct.on_signal(cx, signal)) {
            error!(component = %self.inner.path, error = %err, "construct failed to handle a signal");
            self.inner.engine.metrics().render_failed();
        }
    }

    /// Select more fields of the shared context. The component starts
    /// following context changes if it did not already.
    pub fn use_context(&self, fields: &[&str]) {
        let inner = &self.inner;
        let watching = !inner.context_fields.borrow().is_empty();
        {
            let mut selected = inner.context_fields.borrow_mut();
            for field in fields {
                if !selected.iter().any(|f| f == field) {
                    selected.push(field.to_string());
                }
            }
        }
        if watching {
            inner.refresh_context(&inner.engine.context());
        } else if !fields.is_empty() {
            inner.watch_context();
        }
    }

    /// Forward a navigation to a router construct.
    pub fn navigate(&self, path: &str) {
        self.signal_construct(ConstructSignal::Navigate(path.to_string()));
    }

    /// Append the output to `parent`.
    pub fn mount(&self, parent: NodeId) -> Result<()> {
        self.append_to(parent)
    }

    pub fn append_to(&self, parent: NodeId) -> Result<()> {
        self.ensure_alive()?;
        let surface = self.inner.surface();
        for node in self.live_nodes() {
            surface.append_child(parent, node);
        }
        self.inner.hook(Lifecycle::Attach);
        Ok(())
    }

    pub fn prepend_to(&self, parent: NodeId) -> Result<()> {
        self.ensure_alive()?;
        let surface = self.inner.surface();
        let first = surface.children(parent).first().copied();
        for node in self.live_nodes() {
            surface.insert_before(parent, node, first);
        }
        self.inner.hook(Lifecycle::Attach);
        Ok(())
    }

    /// Put the output where `target` is and remove `target`.
    pub fn replace_with(&self, target: NodeId) -> Result<()> {
        self.ensure_alive()?;
        let surface = self.inner.surface();
        let parent = surface
            .parent(target)
            .ok_or_else(|| Error::Contract(format!("cannot replace node {target}: it has no parent")))?;
        for node in self.live_nodes() {
            surface.insert_before(parent, node, Some(target));
        }
        surface.remove(target);
        self.inner.hook(Lifecycle::Attach);
        Ok(())
    }

    /// Take the output out of the tree, keeping it for a later mount.
    pub fn detach(&self) {
        let surface = self.inner.surface();
        for node in self.live_nodes() {
            surface.detach(node);
        }
        let bindings = std::mem::take(&mut *self.inner.i18n.borrow_mut());
        {
            let mut memory = self.inner.memory.borrow_mut();
            for (key, binding) in &bindings {
                memory.unbind(&binding.node_path, key);
            }
        }
        self.inner.hook(Lifecycle::Detach);
    }

    /// Tear the component down. Idempotent.
    pub fn destroy(&self) {
        let inner = &self.inner;
        if inner.destroyed.get() {
            return;
        }
        inner.hook(Lifecycle::Destroy);
        inner.destroyed.set(true);

        let construct = inner.construct.borrow_mut().take();
        if let Some(mut construct) = construct {
            construct.on_destroy(self);
        }
        let effects = std::mem::take(&mut *inner.effects.borrow_mut());
        for effect in effects {
            effect.dispose();
        }
        inner.scheduler.borrow_mut().close();
        inner.fgud.borrow_mut().clear();
        inner.memory.borrow_mut().clear();
        inner.i18n.borrow_mut().clear();

        let surface = inner.surface();
        let events = std::mem::take(&mut *inner.events.borrow_mut());
        for binding in &events {
            binding.detach(surface.as_ref());
        }
        let children: Vec<Component> = inner.children.borrow_mut().drain(..).map(|(_, c)| c).collect();
        for child in children {
            child.destroy();
        }
        for node in self.live_nodes() {
            surface.remove(node);
        }
        inner.emitter.clear();
        inner.engine.forget_router(&self.inner);
        debug!(component = %inner.path, "component destroyed");
    }

    fn ensure_alive(&self) -> Result<()> {
        if self.inner.destroyed.get() {
            return Err(Error::Detached(self.inner.path.clone()));
        }
        Ok(())
    }

    /// Current top-level nodes. Once attached, the output is a contiguous
    /// run of siblings, so content added between markers after the first
    /// render is picked up too.
    fn live_nodes(&self) -> Vec<NodeId> {
        let nodes = self.inner.nodes.borrow().clone();
        let (Some(&first), Some(&last)) = (nodes.first(), nodes.last()) else {
            return nodes;
        };
        let surface = self.inner.surface();
        if surface.parent(first).is_none() {
            return nodes;
        }
        let mut live = vec![first];
        let mut cursor = first;
        while cursor != last {
            match surface.next_sibling(cursor) {
                Some(next) => {
                    live.push(next);
                    cursor = next;
                }
                None => break,
            }
        }
        live
    }
}

impl ComponentInner {
    /// Run the handler hook and emit the matching lifecycle event.
    pub(crate) fn hook(self: &Rc<Self>, lifecycle: Lifecycle) {
        if let Some(hook) = self.template.handler.hook(lifecycle) {
            hook(&Component::from_inner(self.clone()));
        }
        self.emitter.emit(lifecycle.event_name(), &[]);
    }

    pub(crate) fn notify_construct_input(self: &Rc<Self>) {
        if !self.rendered.get() || self.destroyed.get() {
            return;
        }
        let component = Component::from_inner(self.clone());
        match component.with_construct(|construct, cx| construct.on_input(cx)) {
            Some(Err(err)) => {
                error!(component = %self.path, error = %err, "construct rejected its input");
                self.engine.metrics().render_failed();
            }
            Some(Ok(())) => {}
            None if self.template.construct.is_some() => {
                debug!(component = %self.path, "construct busy; input change folded into the running pass");
            }
            None => {}
        }
    }

    fn start_render_cycle(self: &Rc<Self>) {
        let weak = Rc::downgrade(self);
        let effect = Effect::new_lazy(move || {
            let Some(inner) = weak.upgrade() else {
                return;
            };
            let current = Metavars {
                input: inner.input.get(),
                state: inner.state.get(),
                context: inner.context.get(),
            };
            untrack(|| inner.run_cycle(current));
        })
        .with_max_reruns(self.engine.config().max_effect_reruns);
        self.effects.borrow_mut().push(effect.clone());
        effect.execute();
    }

    fn run_cycle(self: &Rc<Self>, current: Metavars) {
        if self.destroyed.get() {
            return;
        }
        if !self.rendered.get() {
            let started = Instant::now();
            match self.render_initial() {
                Ok(nodes) => {
                    *self.nodes.borrow_mut() = nodes;
                    self.rendered.set(true);
                    self.engine.metrics().render_completed(started.elapsed());
                    debug!(
                        component = %self.path,
                        dependencies = self.fgud.borrow().len(),
                        "component rendered"
                    );
                    self.hook(Lifecycle::Mount);
                }
                Err(err) => {
                    error!(component = %self.path, error = %err, "render failed");
                    self.engine.metrics().render_failed();
                    *self.failure.borrow_mut() = Some(err);
                    return;
                }
            }
        } else {
            let previous = self.previous.borrow().clone();
            if previous == current {
                return;
            }
            self.update_dep_nodes(&current, &previous);
            self.hook(Lifecycle::Update);
        }
        *self.previous.borrow_mut() = current;
        self.hook(Lifecycle::Render);
    }

    fn render_initial(self: &Rc<Self>) -> Result<Vec<NodeId>> {
        if self.template.construct.is_none() {
            return render::render_body(self);
        }
        let component = Component::from_inner(self.clone());
        component
            .with_construct(|construct, cx| construct.self_render(cx))
            .unwrap_or_else(|| Err(Error::Contract(format!("construct of `{}` is missing", self.name))))
    }

    fn watch_context(self: &Rc<Self>) {
        let weak = Rc::downgrade(self);
        let shared = self.engine.context_signal();
        let effect = Effect::new(move || {
            let context = shared.get();
            let Some(inner) = weak.upgrade() else {
                return;
            };
            untrack(|| inner.refresh_context(&context));
        });
        self.effects.borrow_mut().push(effect);
    }

    fn refresh_context(self: &Rc<Self>, shared: &Value) {
        let selected = select_context(shared, &self.context_fields.borrow());
        if selected.is_diff(&self.context.get_untracked()) {
            self.context.set(selected);
            self.hook(Lifecycle::Context);
        }
    }

    fn watch_language(self: &Rc<Self>) {
        let weak = Rc::downgrade(self);
        let language = self.engine.language_signal();
        let effect = Effect::new(move || {
            let lang = language.get();
            let Some(inner) = weak.upgrade() else {
                return;
            };
            if *inner.language.borrow() == lang {
                return;
            }
            *inner.language.borrow_mut() = lang;
            untrack(|| inner.update_i18n_dep_nodes());
        });
        self.effects.borrow_mut().push(effect);
    }
}

impl Drop for ComponentInner {
    fn drop(&mut self) {
        for effect in self.effects.get_mut().drain(..) {
            effect.dispose();
        }
    }
}
