//! Node Addresses
//!
//! Every render-tree position gets a string address relative to its owning
//! component. Addresses encode ancestry:
//!
//! - `/` separates a node from its parent (`0:app/2/0`),
//! - `:` joins a component to the address it was rendered at
//!   (`0:app/c1:counter`),
//! - `.` appends a binding key or a mesh partial (`0:app/x3.r[2]`).
//!
//! "Is X a descendant of Y" is therefore a separator-aware prefix test, and
//! the tree depth of a node is the number of `/` separators.

/// What kind of node an address is generated for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathKind {
    /// Elements, text nodes and scope declarations.
    Node,
    Component,
    /// Built-in control-flow constructs.
    Syntax,
    Macro,
    Dynamic,
}

impl PathKind {
    fn prefix(self) -> &'static str {
        match self {
            PathKind::Node => "",
            PathKind::Component => "c",
            PathKind::Syntax => "x",
            PathKind::Macro => "m",
            PathKind::Dynamic => "d",
        }
    }
}

/// Hands out sibling addresses under one base.
///
/// Counters are per frame, so the same structural position gets the same
/// address every time its parent is rendered.
#[derive(Debug, Clone)]
pub struct PathAddressor {
    base: String,
    counter: usize,
}

impl PathAddressor {
    pub fn new(base: impl Into<String>) -> Self {
        Self {
            base: base.into(),
            counter: 0,
        }
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    /// Address of the next sibling.
    pub fn next(&mut self, kind: PathKind) -> String {
        let path = format!("{}/{}{}", self.base, kind.prefix(), self.counter);
        self.counter += 1;
        path
    }
}

/// Address of a component instance rendered at `prepath`.
pub fn component_path(prepath: &str, name: &str) -> String {
    format!("{prepath}:{name}")
}

/// Address of a binding anchored at `node_path`.
pub fn dep_path(node_path: &str, key: &str) -> String {
    format!("{node_path}.{key}")
}

/// Address of a mesh partial: `{fragment}.{mesh or r}{suffix}`.
pub fn partial_path(fragment_path: &str, mesh_path: Option<&str>, suffix: Option<&str>) -> String {
    format!(
        "{fragment_path}.{}{}",
        mesh_path.unwrap_or("r"),
        suffix.unwrap_or("")
    )
}

/// Loop item suffix, `[index]`.
pub fn item_suffix(index: usize) -> String {
    format!("[{index}]")
}

pub fn depth(path: &str) -> usize {
    path.matches('/').count()
}

/// Whether `path` lies strictly under `ancestor`.
pub fn is_descendant(path: &str, ancestor: &str) -> bool {
    path.len() > ancestor.len()
        && path.starts_with(ancestor)
        && matches!(path.as_bytes()[ancestor.len()], b'/' | b'.' | b'[' | b':')
}

/// Whether `path` is `ancestor` itself or lies under it.
pub fn is_within(path: &str, ancestor: &str) -> bool {
    path == ancestor || is_descendant(path, ancestor)
}

/// Parent address: everything before the last `/`.
pub fn parent(path: &str) -> &str {
    path.rfind('/').map_or("", |i| &path[..i])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sibling_addresses_are_sequential_per_frame() {
        let mut addressor = PathAddressor::new("0:app");
        assert_eq!(addressor.next(PathKind::Node), "0:app/0");
        assert_eq!(addressor.next(PathKind::Component), "0:app/c1");
        assert_eq!(addressor.next(PathKind::Syntax), "0:app/x2");

        let mut child = PathAddressor::new("0:app/0");
        assert_eq!(child.next(PathKind::Node), "0:app/0/0");
    }

    #[test]
    fn descendant_test_respects_separators() {
        assert!(is_descendant("0:app/1/0", "0:app/1"));
        assert!(is_descendant("0:app/x2.r[1]", "0:app/x2.r"));
        assert!(is_descendant("0:app/1.width", "0:app/1"));
        assert!(!is_descendant("0:app/10", "0:app/1"));
        assert!(!is_descendant("0:app/1", "0:app/1"));
        assert!(is_within("0:app/1", "0:app/1"));
    }

    #[test]
    fn depth_and_parent() {
        assert_eq!(depth("0:app"), 0);
        assert_eq!(depth("0:app/1/0"), 2);
        assert_eq!(parent("0:app/1/0"), "0:app/1");
        assert_eq!(
            partial_path("0:app/x2", None, Some(&item_suffix(3))),
            "0:app/x2.r[3]"
        );
        assert_eq!(partial_path("0:app/x2", Some("else"), None), "0:app/x2.else");
    }
}
