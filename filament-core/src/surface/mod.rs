//! Output Surface
//!
//! The engine never touches a concrete UI toolkit. Everything it produces
//! goes through the [`Surface`] trait: node creation, attribute writes,
//! insertion and removal, attachment queries and event listeners.
//!
//! Nodes are opaque [`NodeId`] handles. A node is *attached* when it is
//! reachable from the surface root; the update path uses that to detect
//! stale dependency entries.
//!
//! [`MemorySurface`] is the headless implementation used by tests and
//! benchmarks.

mod memory;

pub use memory::MemorySurface;

use std::fmt;
use std::rc::Rc;

use crate::value::Value;

/// Opaque handle to a node owned by a surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) u64);

impl NodeId {
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A pair of comment markers delimiting a replaceable region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Boundaries {
    pub start: NodeId,
    pub end: NodeId,
}

/// Event listener callback. Receives the event payload.
pub type Listener = Rc<dyn Fn(&[Value])>;

/// The output tree primitive consumed by the engine.
///
/// All methods take `&self`; implementations use interior mutability. A
/// listener may call back into the surface, so implementations must not
/// hold internal borrows while invoking one.
pub trait Surface {
    /// The live root. Nodes reachable from it are attached.
    fn root(&self) -> NodeId;

    fn create_element(&self, tag: &str) -> NodeId;

    fn create_text(&self, text: &str) -> NodeId;

    fn create_comment(&self, text: &str) -> NodeId;

    fn attribute(&self, node: NodeId, name: &str) -> Option<String>;

    fn set_attribute(&self, node: NodeId, name: &str, value: &str);

    fn remove_attribute(&self, node: NodeId, name: &str);

    /// Text content. For elements this replaces every child with one text
    /// node.
    fn set_text(&self, node: NodeId, text: &str);

    /// Raw markup content. Surfaces that cannot parse markup store it as
    /// opaque content.
    fn set_html(&self, node: NodeId, html: &str);

    fn text(&self, node: NodeId) -> String;

    /// Append `child`, detaching it from any previous parent first.
    fn append_child(&self, parent: NodeId, child: NodeId);

    /// Insert `child` before `reference`, or append when `reference` is
    /// `None`.
    fn insert_before(&self, parent: NodeId, child: NodeId, reference: Option<NodeId>);

    /// Detach a node and release its subtree.
    fn remove(&self, node: NodeId);

    /// Detach a node, keeping it (and its listeners) for reinsertion.
    fn detach(&self, node: NodeId);

    fn parent(&self, node: NodeId) -> Option<NodeId>;

    fn next_sibling(&self, node: NodeId) -> Option<NodeId>;

    fn children(&self, node: NodeId) -> Vec<NodeId>;

    fn is_attached(&self, node: NodeId) -> bool;

    fn subscribe(&self, node: NodeId, event: &str, listener: Listener);

    fn unsubscribe(&self, node: NodeId, event: &str);
}

/// Nodes strictly between two boundary markers.
pub fn nodes_between(surface: &dyn Surface, boundaries: Boundaries) -> Vec<NodeId> {
    let mut out = Vec::new();
    let mut cursor = surface.next_sibling(boundaries.start);
    while let Some(node) = cursor {
        if node == boundaries.end {
            break;
        }
        out.push(node);
        cursor = surface.next_sibling(node);
    }
    out
}

/// Remove everything between two markers, keeping the markers.
pub fn clear_between(surface: &dyn Surface, boundaries: Boundaries) {
    for node in nodes_between(surface, boundaries) {
        surface.remove(node);
    }
}

/// Insert `nodes` right before `anchor`.
///
/// When the anchor has no parent yet the region has not been mounted;
/// nothing is inserted and `false` is returned.
pub fn insert_all_before(surface: &dyn Surface, nodes: &[NodeId], anchor: NodeId) -> bool {
    let Some(parent) = surface.parent(anchor) else {
        return false;
    };
    for node in nodes {
        surface.insert_before(parent, *node, Some(anchor));
    }
    true
}
