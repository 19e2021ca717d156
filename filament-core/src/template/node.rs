//! Template nodes and their builders.

use std::rc::Rc;

use super::attributes::{Attribute, SyntaxAttributes};
use crate::expr::Expression;

/// A reference counted list of sibling nodes.
pub type Fragment = Rc<[Node]>;

pub fn fragment(nodes: Vec<Node>) -> Fragment {
    Rc::from(nodes)
}

#[derive(Debug, Clone)]
pub enum Node {
    Text(Rc<TextNode>),
    Element(Rc<ElementNode>),
    Dynamic(Rc<DynamicNode>),
}

impl Node {
    /// Tag name of an element node.
    pub fn tag(&self) -> Option<&str> {
        match self {
            Node::Element(el) => Some(&el.tag),
            _ => None,
        }
    }

    pub fn as_element(&self) -> Option<&Rc<ElementNode>> {
        match self {
            Node::Element(el) => Some(el),
            _ => None,
        }
    }
}

#[derive(Debug)]
pub struct TextNode {
    pub content: Expression,
}

#[derive(Debug)]
pub struct ElementNode {
    pub tag: String,
    pub attrs: SyntaxAttributes,
    pub children: Fragment,
}

/// `<{expr} ...>`: the tag is decided at render time.
#[derive(Debug)]
pub struct DynamicNode {
    pub tag: Expression,
    pub attrs: SyntaxAttributes,
    pub children: Fragment,
}

/// Interpolated text node.
pub fn text(source: &str) -> Node {
    Node::Text(Rc::new(TextNode {
        content: Expression::template(source),
    }))
}

/// Start an element node.
pub fn el(tag: &str) -> ElementBuilder {
    ElementBuilder::new(tag, None)
}

/// Start a dynamic-tag node.
pub fn dynamic(tag_expr: &str) -> ElementBuilder {
    ElementBuilder::new("", Some(tag_expr))
}

/// Fluent builder standing in for compiler output.
///
/// ```rust,ignore
/// let node = el("button")
///     .bind("disabled", "state.busy")
///     .on("click", "submit, state.form")
///     .text("Send {input.label}")
///     .build();
/// ```
#[derive(Debug, Clone)]
pub struct ElementBuilder {
    tag: String,
    dynamic: Option<String>,
    attrs: Vec<Attribute>,
    children: Vec<Node>,
}

impl ElementBuilder {
    fn new(tag: &str, dynamic: Option<&str>) -> Self {
        Self {
            tag: tag.to_string(),
            dynamic: dynamic.map(str::to_string),
            attrs: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Raw `name=value` as written in source; classified like the compiler.
    pub fn raw(mut self, name: &str, value: Option<&str>) -> Self {
        self.attrs.push(Attribute::parse(name, value));
        self
    }

    pub fn attr(mut self, name: &str, value: &str) -> Self {
        self.attrs
            .push(Attribute::Literal(strip(name), value.to_string()));
        self
    }

    pub fn bind(mut self, name: &str, code: &str) -> Self {
        self.attrs.push(Attribute::Expr(strip(name), code.to_string()));
        self
    }

    pub fn interp(mut self, name: &str, source: &str) -> Self {
        self.attrs
            .push(Attribute::Interpolated(strip(name), source.to_string()));
        self
    }

    pub fn flag(mut self, name: &str) -> Self {
        self.attrs.push(Attribute::Flag(strip(name)));
        self
    }

    pub fn spread(mut self, code: &str) -> Self {
        self.attrs.push(Attribute::Spread(code.to_string()));
        self
    }

    pub fn on(mut self, event: &str, instruction: &str) -> Self {
        self.attrs
            .push(Attribute::Event(event.to_string(), instruction.to_string()));
        self
    }

    pub fn func(mut self, name: &str, instruction: &str) -> Self {
        self.attrs
            .push(Attribute::Function(name.to_string(), instruction.to_string()));
        self
    }

    pub fn args(mut self, names: &[&str]) -> Self {
        self.attrs
            .push(Attribute::Args(names.iter().map(|n| n.to_string()).collect()));
        self
    }

    pub fn child(mut self, node: impl Into<Node>) -> Self {
        self.children.push(node.into());
        self
    }

    pub fn children<I, N>(mut self, nodes: I) -> Self
    where
        I: IntoIterator<Item = N>,
        N: Into<Node>,
    {
        self.children.extend(nodes.into_iter().map(Into::into));
        self
    }

    pub fn text(self, source: &str) -> Self {
        self.child(text(source))
    }

    pub fn build(self) -> Node {
        let attrs = SyntaxAttributes::from_list(&self.attrs);
        let children = fragment(self.children);
        match self.dynamic {
            Some(tag) => Node::Dynamic(Rc::new(DynamicNode {
                tag: Expression::code(&tag),
                attrs,
                children,
            })),
            None => Node::Element(Rc::new(ElementNode {
                tag: self.tag,
                attrs,
                children,
            })),
        }
    }
}

fn strip(name: &str) -> String {
    name.trim_start_matches(':').to_string()
}

impl From<ElementBuilder> for Node {
    fn from(builder: ElementBuilder) -> Self {
        builder.build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_produces_classified_attributes() {
        let node = el("div")
            .attr(":id", "main")
            .bind("width", "state.w")
            .on("click", "pick")
            .child(el("span").text("{state.label}"))
            .build();

        let element = node.as_element().unwrap();
        assert_eq!(element.tag, "div");
        assert_eq!(element.attrs.literal("id"), Some("main"));
        assert!(element.attrs.expression("width").is_some());
        assert!(element.attrs.events.contains_key("click"));
        assert_eq!(element.children.len(), 1);
    }

    #[test]
    fn dynamic_nodes_keep_their_tag_expression() {
        let node = dynamic("input.renderer").raw("#", Some("{state.args}")).build();
        match node {
            Node::Dynamic(d) => {
                assert_eq!(d.tag.source(), "input.renderer");
                assert!(d.attrs.expression("#").is_some());
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
