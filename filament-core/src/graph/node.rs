//! Dependency Entries
//!
//! A [`Dependent`] is one (observable path, node binding) pair: the render
//! position that reads the path, what to do when it changes, and when that
//! should happen relative to other updates in the same batch.
//!
//! # Priority
//!
//! Each entry gets a tier:
//!
//! 0. attribute writes that affect layout or visibility,
//! 1. control-flow and scope bindings,
//! 2. everything else (text, attributes, sub-component input),
//! 3. event handler re-bindings.
//!
//! The scheduling priority is `depth * 100 + tier`, so ancestors always
//! update before descendants and tiers order siblings at equal depth.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use smallvec::SmallVec;

use super::path;
use crate::error::Result;
use crate::surface::{Boundaries, NodeId};
use crate::value::Scope;

/// Attributes whose writes can move or hide content.
pub const LAYOUT_AFFECTING_ATTRS: [&str; 5] = ["display", "visibility", "position", "width", "height"];

/// Width of one depth level in the priority space.
pub const MAX_PRIORITY_TYPES: u32 = 100;

/// What produced the binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DependentKind {
    Element,
    Text,
    Component,
    Macro,
    Dynamic,
    Let,
    Log,
    Event,
}

/// What the update callback writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    Attr,
    SpreadAttr,
    /// `@html`, `@text`, `@format`.
    MetaAttr,
    Value,
    Argument,
    Tag,
    Handler,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Tier {
    Layout = 0,
    Structural = 1,
    Default = 2,
    Event = 3,
}

/// Re-evaluates a binding against its memo. Returning a scope replaces the
/// node's memo.
pub type UpdateFn = Rc<dyn Fn(&Scope) -> Result<Option<Scope>>>;

/// Where a dependent lives and how it behaves.
#[derive(Debug, Clone)]
pub struct Binding {
    pub node_path: String,
    pub dep_path: String,
    pub kind: DependentKind,
    pub target: Target,
    /// Attribute or argument name written by the update.
    pub attr: Option<String>,
    pub fragment: Option<NodeId>,
    pub boundaries: Option<Boundaries>,
    /// Owned by a control-flow construct.
    pub syntax: bool,
}

impl Binding {
    pub fn new(node_path: &str, dep_path: &str, kind: DependentKind, target: Target) -> Self {
        Self {
            node_path: node_path.to_string(),
            dep_path: dep_path.to_string(),
            kind,
            target,
            attr: None,
            fragment: None,
            boundaries: None,
            syntax: false,
        }
    }

    pub fn attr(mut self, name: &str) -> Self {
        self.attr = Some(name.to_string());
        self
    }

    pub fn fragment(mut self, node: NodeId) -> Self {
        self.fragment = Some(node);
        self
    }

    pub fn boundaries(mut self, boundaries: Boundaries) -> Self {
        self.boundaries = Some(boundaries);
        self
    }

    pub fn syntax(mut self, syntax: bool) -> Self {
        self.syntax = syntax;
        self
    }
}

pub struct Dependent {
    binding: Binding,
    priority: u32,
    has_let: bool,
    partials: RefCell<SmallVec<[String; 2]>>,
    garbage: Cell<bool>,
    update: UpdateFn,
}

impl Dependent {
    /// Build the entry for `dep`, assigning its priority.
    pub fn new(dep: &str, binding: Binding, has_let: bool, update: UpdateFn) -> Self {
        let priority = path::depth(&binding.node_path) as u32 * MAX_PRIORITY_TYPES
            + tier_of(dep, &binding) as u32;
        Self {
            binding,
            priority,
            has_let,
            partials: RefCell::new(SmallVec::new()),
            garbage: Cell::new(false),
            update,
        }
    }

    pub fn node_path(&self) -> &str {
        &self.binding.node_path
    }

    /// Registry address: unique per binding at a node.
    pub fn address(&self) -> &str {
        &self.binding.dep_path
    }

    pub fn kind(&self) -> DependentKind {
        self.binding.kind
    }

    pub fn target(&self) -> Target {
        self.binding.target
    }

    pub fn attr(&self) -> Option<&str> {
        self.binding.attr.as_deref()
    }

    pub fn fragment(&self) -> Option<NodeId> {
        self.binding.fragment
    }

    pub fn boundaries(&self) -> Option<Boundaries> {
        self.binding.boundaries
    }

    pub fn is_syntax(&self) -> bool {
        self.binding.syntax
    }

    pub fn has_let(&self) -> bool {
        self.has_let
    }

    pub fn priority(&self) -> u32 {
        self.priority
    }

    pub fn tier(&self) -> u32 {
        self.priority % MAX_PRIORITY_TYPES
    }

    /// Tag this entry as rendered inside a mesh partial.
    pub fn tag_partial(&self, partial: &str) {
        let mut partials = self.partials.borrow_mut();
        if !partials.iter().any(|p| p == partial) {
            partials.push(partial.to_string());
        }
    }

    /// Whether the entry was rendered in `partial` or one of its sub-partials.
    pub fn in_partial(&self, partial: &str) -> bool {
        self.partials
            .borrow()
            .iter()
            .any(|p| path::is_within(p, partial))
    }

    pub fn partials(&self) -> Vec<String> {
        self.partials.borrow().to_vec()
    }

    pub fn is_garbage(&self) -> bool {
        self.garbage.get()
    }

    pub fn mark_garbage(&self) {
        self.garbage.set(true);
    }

    pub fn update(&self, memo: &Scope) -> Result<Option<Scope>> {
        (self.update)(memo)
    }
}

impl fmt::Debug for Dependent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dependent")
            .field("address", &self.binding.dep_path)
            .field("kind", &self.binding.kind)
            .field("priority", &self.priority)
            .field("garbage", &self.garbage.get())
            .finish()
    }
}

fn tier_of(dep: &str, binding: &Binding) -> Tier {
    let layout = |name: &str| LAYOUT_AFFECTING_ATTRS.contains(&name);
    if binding.target == Target::Attr
        && (dep.split('.').any(layout) || binding.attr.as_deref().is_some_and(layout))
    {
        Tier::Layout
    } else if binding.syntax {
        Tier::Structural
    } else if binding.kind == DependentKind::Event {
        Tier::Event
    } else {
        Tier::Default
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn noop() -> UpdateFn {
        Rc::new(|_| Ok(None))
    }

    #[test]
    fn layout_attributes_take_tier_zero() {
        let binding = Binding::new("0:app/0", "0:app/0.width", DependentKind::Element, Target::Attr)
            .attr("width");
        let dependent = Dependent::new("state.size", binding, false, noop());
        assert_eq!(dependent.priority(), 100);
        assert_eq!(dependent.tier(), Tier::Layout as u32);

        let binding = Binding::new("0:app/0", "0:app/0.title", DependentKind::Element, Target::Attr)
            .attr("title");
        let dependent = Dependent::new("state.display", binding, false, noop());
        assert_eq!(dependent.tier(), Tier::Layout as u32);
    }

    #[test]
    fn tiers_follow_binding_kind() {
        let text = Binding::new("0:app/0/1", "0:app/0/1.state.x", DependentKind::Text, Target::Value);
        assert_eq!(Dependent::new("state.x", text, false, noop()).priority(), 202);

        let event = Binding::new("0:app/0/2", "0:app/0/2.click", DependentKind::Event, Target::Handler);
        assert_eq!(Dependent::new("state.x", event, false, noop()).priority(), 203);

        let syntax = Binding::new("0:app/x1", "0:app/x1.by", DependentKind::Component, Target::Attr)
            .attr("by")
            .syntax(true);
        assert_eq!(Dependent::new("state.x", syntax, false, noop()).priority(), 101);
    }

    #[test]
    fn partial_tags_match_nested_partials() {
        let binding = Binding::new("0:app/x1.r[2]/0", "a", DependentKind::Text, Target::Value);
        let dependent = Dependent::new("item", binding, false, noop());
        dependent.tag_partial("0:app/x1.r[2]");
        dependent.tag_partial("0:app/x1.r[2]");

        assert_eq!(dependent.partials().len(), 1);
        assert!(dependent.in_partial("0:app/x1.r[2]"));
        assert!(!dependent.in_partial("0:app/x1.r[1]"));
    }
}
