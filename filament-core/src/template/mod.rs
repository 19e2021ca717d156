//! Template Model
//!
//! A [`Template`] is the compiled form of a component: its default
//! fragment, initial state, static values, the context fields it selects,
//! its macros, its handler, and optionally a [`Declaration`] describing the
//! sub-tags a control-flow construct expects.
//!
//! Templates normally come from a compiler. The [`Compiler`] trait is that
//! seam; this crate does not parse markup itself and offers the node
//! builders in [`node`] instead.

mod attributes;
mod handler;
pub mod node;

pub use attributes::{
    Attribute, Instruction, SyntaxAttributes, EVENT_LISTENER_FLAG, FUNCTION_ATTR_FLAG,
    I18N_ATTR_FLAG, META_ATTRIBUTES,
};
pub(crate) use attributes::split_top_level;
pub use handler::{Handler, Hook, Lifecycle, Method};
pub use node::{dynamic, el, fragment, text, DynamicNode, ElementBuilder, ElementNode, Fragment, Node, TextNode};

use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::error::{Error, Result};
use crate::syntax::Construct;
use crate::value::Value;

/// Turns template source into a [`Template`].
pub trait Compiler {
    fn compile(&self, source: &str) -> Result<Template>;
}

/// Builds the self-rendering construct of a control-flow template.
pub type ConstructFactory = Rc<dyn Fn() -> Box<dyn Construct>>;

/// A reusable fragment with declared arguments.
#[derive(Debug, Clone)]
pub struct Macro {
    pub argv: Vec<String>,
    pub fragment: Fragment,
}

/// How a declared sub-tag is found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagKind {
    /// Following sibling elements (`else-if`, `else`).
    Sibling,
    /// Child elements (`case`, `then`).
    Child,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TagSpec {
    pub kind: TagKind,
    pub many: bool,
    pub optional: bool,
}

impl TagSpec {
    pub fn nexted() -> Self {
        Self {
            kind: TagKind::Sibling,
            many: false,
            optional: false,
        }
    }

    pub fn child() -> Self {
        Self {
            kind: TagKind::Child,
            many: false,
            optional: false,
        }
    }

    pub fn many(mut self) -> Self {
        self.many = true;
        self
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }
}

/// Structural contract of a component's usage site.
#[derive(Debug, Clone, Default)]
pub struct Declaration {
    /// Built-in control-flow construct.
    pub syntax: bool,
    pub tags: IndexMap<String, TagSpec>,
}

impl Declaration {
    pub fn syntax() -> Self {
        Self {
            syntax: true,
            tags: IndexMap::new(),
        }
    }

    pub fn component() -> Self {
        Self::default()
    }

    pub fn tag(mut self, name: &str, spec: TagSpec) -> Self {
        self.tags.insert(name.to_string(), spec);
        self
    }
}

#[derive(Clone)]
pub struct Template {
    pub(crate) default: Fragment,
    pub(crate) state: Value,
    pub(crate) statics: Value,
    pub(crate) context: Vec<String>,
    pub(crate) macros: IndexMap<String, Macro>,
    pub(crate) handler: Handler,
    pub(crate) declaration: Option<Declaration>,
    pub(crate) construct: Option<ConstructFactory>,
}

impl Template {
    pub fn new<I, N>(nodes: I) -> Self
    where
        I: IntoIterator<Item = N>,
        N: Into<Node>,
    {
        Self {
            default: fragment(nodes.into_iter().map(Into::into).collect()),
            state: Value::empty_object(),
            statics: Value::empty_object(),
            context: Vec::new(),
            macros: IndexMap::new(),
            handler: Handler::new(),
            declaration: None,
            construct: None,
        }
    }

    /// A control-flow construct rendered by `factory` instead of a fragment.
    pub fn construct<F>(declaration: Declaration, factory: F) -> Self
    where
        F: Fn() -> Box<dyn Construct> + 'static,
    {
        let mut template = Self::new(Vec::<Node>::new());
        template.declaration = Some(declaration);
        template.construct = Some(Rc::new(factory));
        template
    }

    pub fn with_state(mut self, state: impl Into<Value>) -> Self {
        self.state = state.into();
        self
    }

    pub fn with_static(mut self, statics: impl Into<Value>) -> Self {
        self.statics = statics.into();
        self
    }

    pub fn with_context(mut self, fields: &[&str]) -> Self {
        self.context = fields.iter().map(|f| f.to_string()).collect();
        self
    }

    pub fn with_macro<I, N>(mut self, name: &str, argv: &[&str], nodes: I) -> Self
    where
        I: IntoIterator<Item = N>,
        N: Into<Node>,
    {
        self.macros.insert(
            name.to_string(),
            Macro {
                argv: argv.iter().map(|a| a.to_string()).collect(),
                fragment: fragment(nodes.into_iter().map(Into::into).collect()),
            },
        );
        self
    }

    pub fn with_handler(mut self, handler: Handler) -> Self {
        self.handler = handler;
        self
    }

    pub fn with_declaration(mut self, declaration: Declaration) -> Self {
        self.declaration = Some(declaration);
        self
    }

    pub fn handler(&self) -> &Handler {
        &self.handler
    }

    pub fn declaration(&self) -> Option<&Declaration> {
        self.declaration.as_ref()
    }

    pub fn is_syntax(&self) -> bool {
        self.declaration.as_ref().is_some_and(|d| d.syntax)
    }

    pub fn macro_named(&self, name: &str) -> Option<&Macro> {
        self.macros.get(name)
    }

    /// Reject templates that cannot be instantiated.
    pub fn validate(&self, name: &str) -> Result<()> {
        let invalid = |reason: &str| Error::InvalidTemplate {
            name: name.to_string(),
            reason: reason.to_string(),
        };
        if self.default.is_empty() && self.construct.is_none() {
            return Err(invalid("no default fragment"));
        }
        if !matches!(self.state, Value::Object(_)) {
            return Err(invalid("state must be an object"));
        }
        if let Some(declaration) = &self.declaration {
            if declaration.syntax && self.construct.is_none() {
                return Err(invalid("syntax declaration without a construct"));
            }
        }
        Ok(())
    }
}

impl fmt::Debug for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Template")
            .field("nodes", &self.default.len())
            .field("context", &self.context)
            .field("macros", &self.macros.keys().collect::<Vec<_>>())
            .field("declaration", &self.declaration)
            .finish()
    }
}
