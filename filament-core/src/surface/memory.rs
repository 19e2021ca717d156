//! Headless in-memory surface.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;

use indexmap::IndexMap;

use super::{Listener, NodeId, Surface};
use crate::value::Value;

#[derive(Debug, Clone, PartialEq, Eq)]
enum NodeKind {
    Element(String),
    Text,
    Comment,
}

struct NodeData {
    kind: NodeKind,
    text: String,
    html: Option<String>,
    attributes: IndexMap<String, String>,
    children: Vec<NodeId>,
    parent: Option<NodeId>,
    listeners: IndexMap<String, Listener>,
}

impl NodeData {
    fn new(kind: NodeKind, text: &str) -> Self {
        Self {
            kind,
            text: text.to_string(),
            html: None,
            attributes: IndexMap::new(),
            children: Vec::new(),
            parent: None,
            listeners: IndexMap::new(),
        }
    }
}

/// Arena-backed surface with a live root element.
///
/// ```rust,ignore
/// let surface = MemorySurface::new();
/// let div = surface.create_element("div");
/// surface.append_child(surface.root(), div);
/// assert_eq!(surface.to_html(div), "<div></div>");
/// ```
pub struct MemorySurface {
    nodes: RefCell<HashMap<u64, NodeData>>,
    next_id: Cell<u64>,
    root: NodeId,
    mutations: Cell<usize>,
}

impl MemorySurface {
    pub fn new() -> Self {
        let mut nodes = HashMap::new();
        nodes.insert(0, NodeData::new(NodeKind::Element("root".into()), ""));
        Self {
            nodes: RefCell::new(nodes),
            next_id: Cell::new(1),
            root: NodeId(0),
            mutations: Cell::new(0),
        }
    }

    /// Number of writes applied to the tree so far.
    pub fn mutation_count(&self) -> usize {
        self.mutations.get()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.borrow().len()
    }

    pub fn tag(&self, node: NodeId) -> Option<String> {
        match &self.nodes.borrow().get(&node.0)?.kind {
            NodeKind::Element(tag) => Some(tag.clone()),
            _ => None,
        }
    }

    /// Serialize the subtree rooted at `node`. Comments are omitted.
    pub fn to_html(&self, node: NodeId) -> String {
        let mut out = String::new();
        self.write_html(node, &mut out);
        out
    }

    /// Serialize the children of the root.
    pub fn html(&self) -> String {
        let mut out = String::new();
        for child in self.children(self.root) {
            self.write_html(child, &mut out);
        }
        out
    }

    fn write_html(&self, node: NodeId, out: &mut String) {
        let (tag, children) = {
            let nodes = self.nodes.borrow();
            let Some(data) = nodes.get(&node.0) else {
                return;
            };
            match &data.kind {
                NodeKind::Comment => return,
                NodeKind::Text => {
                    out.push_str(&data.text);
                    return;
                }
                NodeKind::Element(tag) => {
                    out.push('<');
                    out.push_str(tag);
                    for (name, value) in &data.attributes {
                        out.push_str(&format!(" {name}=\"{value}\""));
                    }
                    out.push('>');
                    if let Some(html) = &data.html {
                        out.push_str(html);
                    }
                    (tag.clone(), data.children.clone())
                }
            }
        };
        for child in children {
            self.write_html(child, out);
        }
        out.push_str(&format!("</{tag}>"));
    }

    /// Attached elements with the given tag, in document order.
    pub fn find_all(&self, tag: &str) -> Vec<NodeId> {
        let mut out = Vec::new();
        self.collect(self.root, &mut |data, id| {
            if data.kind == NodeKind::Element(tag.to_string()) {
                out.push(id);
            }
        });
        out
    }

    /// First attached element whose attribute `name` equals `value`.
    pub fn find_by_attribute(&self, name: &str, value: &str) -> Option<NodeId> {
        let mut found = None;
        self.collect(self.root, &mut |data, id| {
            if found.is_none() && data.attributes.get(name).map(String::as_str) == Some(value) {
                found = Some(id);
            }
        });
        found
    }

    fn collect(&self, node: NodeId, visit: &mut dyn FnMut(&NodeData, NodeId)) {
        let children = {
            let nodes = self.nodes.borrow();
            let Some(data) = nodes.get(&node.0) else {
                return;
            };
            visit(data, node);
            data.children.clone()
        };
        for child in children {
            self.collect(child, visit);
        }
    }

    /// Fire the listener registered for `event` on `node`.
    ///
    /// Returns `false` when no listener is registered.
    pub fn dispatch(&self, node: NodeId, event: &str, payload: &[Value]) -> bool {
        let listener = self
            .nodes
            .borrow()
            .get(&node.0)
            .and_then(|data| data.listeners.get(event).cloned());
        match listener {
            Some(listener) => {
                listener(payload);
                true
            }
            None => false,
        }
    }

    pub fn listener_count(&self, node: NodeId) -> usize {
        self.nodes
            .borrow()
            .get(&node.0)
            .map_or(0, |data| data.listeners.len())
    }

    fn alloc(&self, data: NodeData) -> NodeId {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        self.nodes.borrow_mut().insert(id, data);
        NodeId(id)
    }

    fn touch(&self) {
        self.mutations.set(self.mutations.get() + 1);
    }

    fn unlink(&self, node: NodeId) {
        let mut nodes = self.nodes.borrow_mut();
        let parent = nodes.get_mut(&node.0).and_then(|data| data.parent.take());
        if let Some(parent) = parent {
            if let Some(parent) = nodes.get_mut(&parent.0) {
                parent.children.retain(|child| *child != node);
            }
        }
    }

    fn release(&self, node: NodeId) {
        let removed = self.nodes.borrow_mut().remove(&node.0);
        if let Some(data) = removed {
            for child in data.children {
                self.release(child);
            }
        }
    }
}

impl Default for MemorySurface {
    fn default() -> Self {
        Self::new()
    }
}

impl Surface for MemorySurface {
    fn root(&self) -> NodeId {
        self.root
    }

    fn create_element(&self, tag: &str) -> NodeId {
        self.alloc(NodeData::new(NodeKind::Element(tag.to_string()), ""))
    }

    fn create_text(&self, text: &str) -> NodeId {
        self.alloc(NodeData::new(NodeKind::Text, text))
    }

    fn create_comment(&self, text: &str) -> NodeId {
        self.alloc(NodeData::new(NodeKind::Comment, text))
    }

    fn attribute(&self, node: NodeId, name: &str) -> Option<String> {
        self.nodes
            .borrow()
            .get(&node.0)
            .and_then(|data| data.attributes.get(name).cloned())
    }

    fn set_attribute(&self, node: NodeId, name: &str, value: &str) {
        if let Some(data) = self.nodes.borrow_mut().get_mut(&node.0) {
            data.attributes.insert(name.to_string(), value.to_string());
        }
        self.touch();
    }

    fn remove_attribute(&self, node: NodeId, name: &str) {
        if let Some(data) = self.nodes.borrow_mut().get_mut(&node.0) {
            data.attributes.shift_remove(name);
        }
        self.touch();
    }

    fn set_text(&self, node: NodeId, text: &str) {
        let is_element = matches!(
            self.nodes.borrow().get(&node.0).map(|d| &d.kind),
            Some(NodeKind::Element(_))
        );
        if is_element {
            for child in self.children(node) {
                self.remove(child);
            }
            let text_node = self.create_text(text);
            self.append_child(node, text_node);
        } else if let Some(data) = self.nodes.borrow_mut().get_mut(&node.0) {
            data.text = text.to_string();
        }
        self.touch();
    }

    fn set_html(&self, node: NodeId, html: &str) {
        for child in self.children(node) {
            self.remove(child);
        }
        if let Some(data) = self.nodes.borrow_mut().get_mut(&node.0) {
            data.html = Some(html.to_string());
        }
        self.touch();
    }

    fn text(&self, node: NodeId) -> String {
        let (kind, text, children) = {
            let nodes = self.nodes.borrow();
            let Some(data) = nodes.get(&node.0) else {
                return String::new();
            };
            (data.kind.clone(), data.text.clone(), data.children.clone())
        };
        match kind {
            NodeKind::Text => text,
            NodeKind::Comment => String::new(),
            NodeKind::Element(_) => children.into_iter().map(|c| self.text(c)).collect(),
        }
    }

    fn append_child(&self, parent: NodeId, child: NodeId) {
        self.insert_before(parent, child, None);
    }

    fn insert_before(&self, parent: NodeId, child: NodeId, reference: Option<NodeId>) {
        self.unlink(child);
        let mut nodes = self.nodes.borrow_mut();
        if !nodes.contains_key(&child.0) {
            return;
        }
        let Some(parent_data) = nodes.get_mut(&parent.0) else {
            return;
        };
        let position = reference
            .and_then(|r| parent_data.children.iter().position(|c| *c == r))
            .unwrap_or(parent_data.children.len());
        parent_data.children.insert(position, child);
        if let Some(child_data) = nodes.get_mut(&child.0) {
            child_data.parent = Some(parent);
        }
        drop(nodes);
        self.touch();
    }

    fn remove(&self, node: NodeId) {
        if node == self.root {
            return;
        }
        self.unlink(node);
        self.release(node);
        self.touch();
    }

    fn detach(&self, node: NodeId) {
        self.unlink(node);
        self.touch();
    }

    fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.nodes.borrow().get(&node.0).and_then(|data| data.parent)
    }

    fn next_sibling(&self, node: NodeId) -> Option<NodeId> {
        let nodes = self.nodes.borrow();
        let parent = nodes.get(&node.0)?.parent?;
        let siblings = &nodes.get(&parent.0)?.children;
        let index = siblings.iter().position(|c| *c == node)?;
        siblings.get(index + 1).copied()
    }

    fn children(&self, node: NodeId) -> Vec<NodeId> {
        self.nodes
            .borrow()
            .get(&node.0)
            .map(|data| data.children.clone())
            .unwrap_or_default()
    }

    fn is_attached(&self, node: NodeId) -> bool {
        let nodes = self.nodes.borrow();
        let mut cursor = Some(node);
        while let Some(current) = cursor {
            if current == self.root {
                return true;
            }
            cursor = nodes.get(&current.0).and_then(|data| data.parent);
        }
        false
    }

    fn subscribe(&self, node: NodeId, event: &str, listener: Listener) {
        if let Some(data) = self.nodes.borrow_mut().get_mut(&node.0) {
            data.listeners.insert(event.to_string(), listener);
        }
    }

    fn unsubscribe(&self, node: NodeId, event: &str) {
        if let Some(data) = self.nodes.borrow_mut().get_mut(&node.0) {
            data.listeners.shift_remove(event);
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surface::{clear_between, insert_all_before, nodes_between, Boundaries};
    use std::rc::Rc;

    #[test]
    fn builds_and_serializes_a_tree() {
        let surface = MemorySurface::new();
        let div = surface.create_element("div");
        let marker = surface.create_comment("s:x");
        let text = surface.create_text("hi");
        surface.set_attribute(div, "id", "main");
        surface.append_child(div, marker);
        surface.append_child(div, text);
        surface.append_child(surface.root(), div);

        assert_eq!(surface.html(), "<div id=\"main\">hi</div>");
        assert!(surface.is_attached(text));
        assert_eq!(surface.find_by_attribute("id", "main"), Some(div));
    }

    #[test]
    fn boundaries_delimit_replaceable_content() {
        let surface = MemorySurface::new();
        let root = surface.root();
        let start = surface.create_comment("s");
        let end = surface.create_comment("e");
        surface.append_child(root, start);
        surface.append_child(root, end);

        let a = surface.create_text("a");
        let b = surface.create_text("b");
        assert!(insert_all_before(&surface, &[a, b], end));
        let region = Boundaries { start, end };
        assert_eq!(nodes_between(&surface, region), vec![a, b]);

        clear_between(&surface, region);
        assert!(nodes_between(&surface, region).is_empty());
        assert!(!surface.is_attached(a));
        assert!(surface.is_attached(end));
    }

    #[test]
    fn detached_nodes_are_not_attached() {
        let surface = MemorySurface::new();
        let div = surface.create_element("div");
        assert!(!surface.is_attached(div));
        surface.append_child(surface.root(), div);
        surface.detach(div);
        assert!(!surface.is_attached(div));
    }

    #[test]
    fn dispatch_reaches_the_listener() {
        let surface = MemorySurface::new();
        let button = surface.create_element("button");
        let clicks = Rc::new(Cell::new(0));
        let clicks_clone = clicks.clone();
        surface.subscribe(
            button,
            "click",
            Rc::new(move |_| clicks_clone.set(clicks_clone.get() + 1)),
        );

        assert!(surface.dispatch(button, "click", &[]));
        surface.unsubscribe(button, "click");
        assert!(!surface.dispatch(button, "click", &[]));
        assert_eq!(clicks.get(), 1);
    }
}
