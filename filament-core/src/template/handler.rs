//! Template handlers: named methods and lifecycle hooks.

use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::component::Component;
use crate::value::Value;

/// A handler method, callable from templates as `self.name(...)` or as an
/// event instruction.
pub type Method = Rc<dyn Fn(&Component, &[Value]) -> Value>;

pub type Hook = Rc<dyn Fn(&Component)>;

/// Component lifecycle points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Lifecycle {
    Create,
    Input,
    Mount,
    Render,
    Update,
    Attach,
    Detach,
    Context,
    Destroy,
}

impl Lifecycle {
    /// Name of the event emitted when the hook fires.
    pub fn event_name(self) -> &'static str {
        match self {
            Lifecycle::Create => "component:create",
            Lifecycle::Input => "component:input",
            Lifecycle::Mount => "component:mount",
            Lifecycle::Render => "component:render",
            Lifecycle::Update => "component:update",
            Lifecycle::Attach => "component:attach",
            Lifecycle::Detach => "component:detach",
            Lifecycle::Context => "component:context",
            Lifecycle::Destroy => "component:destroy",
        }
    }
}

#[derive(Clone, Default)]
pub struct Handler {
    methods: IndexMap<String, Method>,
    hooks: IndexMap<Lifecycle, Hook>,
}

impl Handler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn method<F>(mut self, name: &str, f: F) -> Self
    where
        F: Fn(&Component, &[Value]) -> Value + 'static,
    {
        self.methods.insert(name.to_string(), Rc::new(f));
        self
    }

    pub fn on<F>(mut self, lifecycle: Lifecycle, f: F) -> Self
    where
        F: Fn(&Component) + 'static,
    {
        self.hooks.insert(lifecycle, Rc::new(f));
        self
    }

    pub fn get_method(&self, name: &str) -> Option<Method> {
        self.methods.get(name).cloned()
    }

    pub fn has_method(&self, name: &str) -> bool {
        self.methods.contains_key(name)
    }

    pub fn hook(&self, lifecycle: Lifecycle) -> Option<Hook> {
        self.hooks.get(&lifecycle).cloned()
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handler")
            .field("methods", &self.methods.keys().collect::<Vec<_>>())
            .field("hooks", &self.hooks.keys().collect::<Vec<_>>())
            .finish()
    }
}
