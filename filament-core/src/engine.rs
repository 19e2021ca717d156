//! Engine Instance
//!
//! An [`Engine`] owns everything the components of one application share:
//! the template catalog, the output surface, the shared context and
//! language, the translation service, the microtask queue that batches
//! update flushes, global routers and metrics. Nothing is process-wide;
//! two engines never see each other.
//!
//! # Microtasks
//!
//! Work deferred by components (update flushes, promise settlement) is
//! queued here and runs when the host calls [`Engine::tick`] or
//! [`Engine::run_until_idle`]. There is no background thread.
//!
//! ```rust,ignore
//! let surface = Rc::new(MemorySurface::new());
//! let engine = Engine::new(surface.clone());
//! engine.register("counter", counter_template())?;
//!
//! let counter = engine.mount("counter", json!({"start": 1}), surface.root())?;
//! counter.set_state("count", 2)?;
//! engine.run_until_idle();
//! ```

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::{Rc, Weak};

use indexmap::IndexMap;
use tracing::{debug, info, warn};

use crate::component::{Component, ComponentInner};
use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::i18n::{IdentityTranslator, Translator};
use crate::metrics::Metrics;
use crate::reactive::Signal;
use crate::surface::{NodeId, Surface};
use crate::syntax;
use crate::template::{Compiler, Template};
use crate::value::Value;

/// Upper bound of ticks in one [`Engine::run_until_idle`] call.
pub const MAX_IDLE_TICKS: usize = 10_000;

type Microtask = Box<dyn FnOnce()>;

struct EngineInner {
    config: EngineConfig,
    surface: Rc<dyn Surface>,
    catalog: RefCell<IndexMap<String, Rc<Template>>>,
    context: Signal<Value>,
    language: Signal<String>,
    translator: RefCell<Rc<dyn Translator>>,
    microtasks: RefCell<VecDeque<Microtask>>,
    routers: RefCell<Vec<Weak<ComponentInner>>>,
    roots: RefCell<Vec<Weak<ComponentInner>>>,
    metrics: Metrics,
}

/// Shared handle to one engine.
#[derive(Clone)]
pub struct Engine {
    inner: Rc<EngineInner>,
}

/// Non-owning engine handle, for callbacks that may outlive it.
#[derive(Clone)]
pub struct WeakEngine {
    inner: Weak<EngineInner>,
}

impl WeakEngine {
    pub fn upgrade(&self) -> Option<Engine> {
        self.inner.upgrade().map(|inner| Engine { inner })
    }
}

impl Engine {
    pub fn new(surface: Rc<dyn Surface>) -> Self {
        Self::with_config(surface, EngineConfig::default())
    }

    pub fn with_config(surface: Rc<dyn Surface>, config: EngineConfig) -> Self {
        let language = config.default_language.clone();
        let engine = Self {
            inner: Rc::new(EngineInner {
                config,
                surface,
                catalog: RefCell::new(IndexMap::new()),
                context: Signal::new(Value::empty_object()),
                language: Signal::new(language),
                translator: RefCell::new(Rc::new(IdentityTranslator)),
                microtasks: RefCell::new(VecDeque::new()),
                routers: RefCell::new(Vec::new()),
                roots: RefCell::new(Vec::new()),
                metrics: Metrics::new(),
            }),
        };
        {
            let mut catalog = engine.inner.catalog.borrow_mut();
            for (name, template) in syntax::builtins() {
                catalog.insert(name.to_string(), Rc::new(template));
            }
        }
        debug!(root_prefix = %engine.inner.config.root_prefix, "engine created");
        engine
    }

    pub fn downgrade(&self) -> WeakEngine {
        WeakEngine {
            inner: Rc::downgrade(&self.inner),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    pub fn surface(&self) -> Rc<dyn Surface> {
        self.inner.surface.clone()
    }

    pub fn metrics(&self) -> &Metrics {
        &self.inner.metrics
    }

    // ------------------------------------------------------------------
    // Catalog
    // ------------------------------------------------------------------

    /// Add or replace a template. Invalid templates are rejected.
    pub fn register(&self, name: &str, template: Template) -> Result<()> {
        template.validate(name)?;
        self.inner
            .catalog
            .borrow_mut()
            .insert(name.to_string(), Rc::new(template));
        debug!(template = name, "template registered");
        Ok(())
    }

    pub fn unregister(&self, name: &str) -> bool {
        self.inner.catalog.borrow_mut().shift_remove(name).is_some()
    }

    pub fn has(&self, name: &str) -> bool {
        self.inner.catalog.borrow().contains_key(name)
    }

    pub fn import(&self, name: &str) -> Result<Rc<Template>> {
        self.inner
            .catalog
            .borrow()
            .get(name)
            .cloned()
            .ok_or_else(|| Error::TemplateNotFound(name.to_string()))
    }

    pub fn compile_and_register(&self, name: &str, source: &str, compiler: &dyn Compiler) -> Result<()> {
        let template = compiler.compile(source)?;
        self.register(name, template)
    }

    // ------------------------------------------------------------------
    // Context and language
    // ------------------------------------------------------------------

    /// Shallow-merge `patch` into the shared context.
    pub fn set_context(&self, patch: impl Into<Value>) {
        let current = self.inner.context.get_untracked();
        let next = current.merge(&patch.into());
        if next.is_diff(&current) {
            self.inner.context.set(next);
        }
    }

    pub fn context(&self) -> Value {
        self.inner.context.get_untracked()
    }

    pub(crate) fn context_signal(&self) -> Signal<Value> {
        self.inner.context.clone()
    }

    pub fn set_language(&self, language: &str) {
        if self.inner.language.get_untracked() != language {
            info!(language, "language changed");
            self.inner.language.set(language.to_string());
        }
    }

    pub fn language(&self) -> String {
        self.inner.language.get_untracked()
    }

    pub(crate) fn language_signal(&self) -> Signal<String> {
        self.inner.language.clone()
    }

    /// Swap the translation service. Content already on the surface keeps
    /// its text until the next language change.
    pub fn set_translator(&self, translator: impl Translator + 'static) {
        *self.inner.translator.borrow_mut() = Rc::new(translator);
    }

    pub fn translator(&self) -> Rc<dyn Translator> {
        self.inner.translator.borrow().clone()
    }

    // ------------------------------------------------------------------
    // Microtasks
    // ------------------------------------------------------------------

    pub fn queue_microtask(&self, task: impl FnOnce() + 'static) {
        self.inner.microtasks.borrow_mut().push_back(Box::new(task));
    }

    pub fn pending_microtasks(&self) -> usize {
        self.inner.microtasks.borrow().len()
    }

    /// Run the microtasks queued so far. Tasks they queue wait for the
    /// next tick. Returns how many ran.
    pub fn tick(&self) -> usize {
        let batch = std::mem::take(&mut *self.inner.microtasks.borrow_mut());
        let count = batch.len();
        for task in batch {
            task();
        }
        count
    }

    /// Tick until no microtask is left.
    pub fn run_until_idle(&self) -> usize {
        let mut total = 0;
        for _ in 0..MAX_IDLE_TICKS {
            let ran = self.tick();
            if ran == 0 {
                return total;
            }
            total += ran;
        }
        warn!(pending = self.pending_microtasks(), "microtask queue did not drain");
        total
    }

    // ------------------------------------------------------------------
    // Roots
    // ------------------------------------------------------------------

    /// Instantiate a root component. Its output is not attached anywhere.
    pub fn render(&self, name: &str, input: impl Into<Value>) -> Result<Component> {
        let template = self.import(name)?;
        let component = Component::create(self, name, template, input.into(), &self.inner.config.root_prefix, None)?;
        let mut roots = self.inner.roots.borrow_mut();
        roots.retain(|root| root.strong_count() > 0);
        roots.push(component.downgrade());
        Ok(component)
    }

    /// Render a root component and append it to `parent`.
    pub fn mount(&self, name: &str, input: impl Into<Value>, parent: NodeId) -> Result<Component> {
        let component = self.render(name, input)?;
        component.mount(parent)?;
        Ok(component)
    }

    /// Live root components.
    pub fn roots(&self) -> Vec<Component> {
        self.inner
            .roots
            .borrow()
            .iter()
            .filter_map(Weak::upgrade)
            .map(Component::from_inner)
            .filter(|c| !c.is_destroyed())
            .collect()
    }

    // ------------------------------------------------------------------
    // Routing
    // ------------------------------------------------------------------

    pub(crate) fn register_router(&self, router: &Component) {
        let mut routers = self.inner.routers.borrow_mut();
        let weak = router.downgrade();
        if !routers.iter().any(|r| r.ptr_eq(&weak)) {
            routers.push(weak);
        }
    }

    pub(crate) fn forget_router(&self, router: &Rc<ComponentInner>) {
        self.inner
            .routers
            .borrow_mut()
            .retain(|r| r.strong_count() > 0 && !std::ptr::eq(r.as_ptr(), Rc::as_ptr(router)));
    }

    /// Send every global router to `path`. Returns how many were notified.
    pub fn navigate(&self, path: &str) -> usize {
        let routers: Vec<Component> = self
            .inner
            .routers
            .borrow()
            .iter()
            .filter_map(Weak::upgrade)
            .map(Component::from_inner)
            .collect();
        for router in &routers {
            router.navigate(path);
        }
        routers.len()
    }

    /// Destroy every root and drop pending work.
    pub fn dispose(&self) {
        let roots = std::mem::take(&mut *self.inner.roots.borrow_mut());
        for root in roots.iter().filter_map(Weak::upgrade) {
            Component::from_inner(root).destroy();
        }
        self.inner.microtasks.borrow_mut().clear();
        self.inner.routers.borrow_mut().clear();
        debug!("engine disposed");
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("templates", &self.inner.catalog.borrow().len())
            .field("microtasks", &self.inner.microtasks.borrow().len())
            .field("language", &self.inner.language.get_untracked())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surface::MemorySurface;
    use crate::template::{el, Node};
    use serde_json::json;
    use std::cell::Cell;

    fn engine() -> Engine {
        Engine::new(Rc::new(MemorySurface::new()))
    }

    #[test]
    fn builtins_are_registered() {
        let engine = engine();
        for name in ["if", "switch", "for", "async", "router"] {
            assert!(engine.has(name), "{name} missing");
        }
    }

    #[test]
    fn unknown_templates_are_reported() {
        let engine = engine();
        assert!(matches!(engine.import("nope"), Err(Error::TemplateNotFound(_))));
        assert!(matches!(engine.render("nope", Value::Undefined), Err(Error::TemplateNotFound(_))));
    }

    #[test]
    fn invalid_templates_are_rejected() {
        let engine = engine();
        let empty = Template::new(Vec::<Node>::new());
        assert!(matches!(engine.register("empty", empty), Err(Error::InvalidTemplate { .. })));
        assert!(!engine.has("empty"));
        assert!(engine.register("ok", Template::new([el("p").text("hi")])).is_ok());
        assert!(engine.unregister("ok"));
    }

    #[test]
    fn microtasks_queued_during_a_tick_wait_for_the_next() {
        let engine = engine();
        let ran = Rc::new(Cell::new(0));
        {
            let inner = engine.clone();
            let ran = ran.clone();
            engine.queue_microtask(move || {
                ran.set(ran.get() + 1);
                let ran = ran.clone();
                inner.queue_microtask(move || ran.set(ran.get() + 1));
            });
        }
        assert_eq!(engine.tick(), 1);
        assert_eq!(ran.get(), 1);
        assert_eq!(engine.pending_microtasks(), 1);
        assert_eq!(engine.run_until_idle(), 1);
        assert_eq!(ran.get(), 2);
    }

    #[test]
    fn context_merges_shallowly() {
        let engine = engine();
        engine.set_context(json!({"theme": "dark"}));
        engine.set_context(json!({"user": "ada"}));
        assert_eq!(engine.context(), Value::from(json!({"theme": "dark", "user": "ada"})));
    }

    #[test]
    fn dispose_destroys_roots() {
        let engine = engine();
        engine.register("p", Template::new([el("p").text("hi")])).unwrap();
        let root = engine.render("p", Value::Undefined).unwrap();
        assert_eq!(engine.roots().len(), 1);
        engine.dispose();
        assert!(root.is_destroyed());
        assert!(engine.roots().is_empty());
    }
}
