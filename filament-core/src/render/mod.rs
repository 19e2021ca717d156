//! Render Passes
//!
//! A [`RenderPass`] turns a template fragment into surface nodes for one
//! host component. While it walks the tree it records a dependency entry
//! for every reactive binding in a pass-local registry and collects event
//! subscriptions. Both are handed over once the fragment's output exists:
//! events are attached by [`RenderPass::finish`], and the caller merges the
//! returned registry into the host, tagged with a partial path when the
//! pass rendered a mesh.
//!
//! # Dispatch
//!
//! For each node, in order:
//!
//! - text nodes interpolate;
//! - `<{expr}>` nodes resolve their tag at render time;
//! - `let`, `const` and `log` act on the scope and produce no output;
//! - a tag naming one of the host's macros renders the macro;
//! - a tag naming a registered template renders a child component;
//! - anything else is a plain element.

mod component;
mod dynamic;
mod element;
mod events;
mod macros;
mod variables;

pub(crate) use events::EventBinding;

use events::PendingEvent;

use std::rc::Rc;

use tracing::trace;

use crate::component::ComponentInner;
use crate::error::Result;
use crate::expr::Env;
use crate::graph::path::PathAddressor;
use crate::graph::{Binding, Dependent, DependencyRegistry, UpdateFn, MAX_PRIORITY_TYPES};
use crate::surface::{NodeId, Surface};
use crate::template::Node;
use crate::value::{Scope, VarKind};

/// A binding re-run when the language changes.
#[derive(Clone)]
pub(crate) struct I18nBinding {
    pub(crate) node_path: String,
    pub(crate) node: NodeId,
    pub(crate) update: UpdateFn,
}

pub(crate) struct RenderPass {
    host: Rc<ComponentInner>,
    deps: DependencyRegistry,
    events: Vec<PendingEvent>,
}

impl RenderPass {
    pub(crate) fn new(host: Rc<ComponentInner>) -> Self {
        Self {
            host,
            deps: DependencyRegistry::new(),
            events: Vec::new(),
        }
    }

    pub(crate) fn host(&self) -> &Rc<ComponentInner> {
        &self.host
    }

    pub(crate) fn surface(&self) -> Rc<dyn Surface> {
        self.host.surface()
    }

    pub(crate) fn env<'a>(&self, scope: &'a Scope) -> Env<'a> {
        Env::new(self.host.clone(), scope)
    }

    /// Render sibling nodes in order.
    pub(crate) fn render_fragment(
        &mut self,
        nodes: &[Node],
        addr: &mut PathAddressor,
        scope: &mut Scope,
        i18n: bool,
    ) -> Result<Vec<NodeId>> {
        let mut out = Vec::new();
        let mut index = 0;
        while index < nodes.len() {
            let (rendered, consumed) = self.render_node(nodes, index, addr, scope, i18n)?;
            out.extend(rendered);
            index += 1 + consumed;
        }
        Ok(out)
    }

    /// Render `nodes[index]`. The second value counts following siblings
    /// the node consumed (`else-if`/`else` of an `if`).
    fn render_node(
        &mut self,
        nodes: &[Node],
        index: usize,
        addr: &mut PathAddressor,
        scope: &mut Scope,
        i18n: bool,
    ) -> Result<(Vec<NodeId>, usize)> {
        let el = match &nodes[index] {
            Node::Text(text) => return Ok((vec![element::render_text(self, text, addr, scope, i18n)], 0)),
            Node::Dynamic(node) => return Ok((dynamic::render(self, node, addr, scope)?, 0)),
            Node::Element(el) => el,
        };
        match el.tag.as_str() {
            "let" => variables::declare(self, el, addr, scope, VarKind::Let).map(|_| (Vec::new(), 0)),
            "const" => variables::declare(self, el, addr, scope, VarKind::Const).map(|_| (Vec::new(), 0)),
            "log" => {
                variables::log(self, el, addr, scope);
                Ok((Vec::new(), 0))
            }
            tag => {
                if let Some(mac) = self.host.template.macro_named(tag).cloned() {
                    return Ok((macros::render(self, el, &mac, addr, scope)?, 0));
                }
                if self.host.engine.has(tag) {
                    let template = self.host.engine.import(tag)?;
                    return component::render_tag(self, nodes, index, el, template, addr, scope);
                }
                Ok((vec![element::render(self, el, addr, scope, i18n)?], 0))
            }
        }
    }

    /// Record one (observable path, binding) entry and its memo.
    pub(crate) fn track(&mut self, dep: &str, binding: Binding, has_let: bool, memo: &Scope, update: UpdateFn) {
        let dependent = Rc::new(Dependent::new(dep, binding, has_let, update));
        self.host.memory.borrow_mut().bind(
            dependent.node_path(),
            dependent.address(),
            dependent.priority(),
            memo,
        );
        if self.host.engine.config().debug {
            trace!(dep, address = %dependent.address(), priority = dependent.priority(), "dependency tracked");
        }
        self.deps.track(dep, dependent);
        self.host.engine.metrics().dependency_tracked();
    }

    /// Register a translation binding on the host.
    pub(crate) fn translatable(&mut self, node_path: &str, node: NodeId, memo: &Scope, update: UpdateFn) {
        let key = format!("{node_path}.i18n");
        let priority = crate::graph::path::depth(node_path) as u32 * MAX_PRIORITY_TYPES + 2;
        self.host.memory.borrow_mut().bind(node_path, &key, priority, memo);
        self.host.i18n.borrow_mut().insert(
            key,
            I18nBinding {
                node_path: node_path.to_string(),
                node,
                update,
            },
        );
    }

    pub(crate) fn listen(&mut self, pending: PendingEvent) {
        self.events.push(pending);
    }

    /// Attach the collected events and hand back the pass's entries.
    pub(crate) fn finish(mut self) -> DependencyRegistry {
        let pending = std::mem::take(&mut self.events);
        for event in pending {
            events::attach(&mut self, event);
        }
        self.deps
    }
}

/// First render of a component's default fragment.
pub(crate) fn render_body(host: &Rc<ComponentInner>) -> Result<Vec<NodeId>> {
    let mut pass = RenderPass::new(host.clone());
    let mut addr = PathAddressor::new(host.path.clone());
    let mut scope = Scope::new();
    let fragment = host.template.default.clone();
    let nodes = pass.render_fragment(&fragment, &mut addr, &mut scope, false)?;
    let deps = pass.finish();
    host.fgud.borrow_mut().merge(deps, None);
    Ok(nodes)
}
