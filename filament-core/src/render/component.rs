//! Child components.
//!
//! A component tag becomes a child instance delimited by two comment
//! markers. Its input is assembled from the tag's attributes; a body, when
//! present, is wired as a mesh renderer under `renderer`, and each
//! declared sub-tag (`else`, `case`, `then`, ...) as a wire object holding
//! its own renderer plus its evaluated attributes. Reactive attributes
//! become tracked entries that merge-patch the child's input.

use std::rc::{Rc, Weak};

use super::events::{function_value, EventSource, PendingEvent};
use super::RenderPass;
use crate::component::{Component, ComponentInner};
use crate::error::{Error, Result};
use crate::expr::{Env, Expression};
use crate::graph::path::{dep_path, PathAddressor, PathKind};
use crate::graph::{Binding, DependentKind, Target, UpdateFn};
use crate::mesh::{MeshConfig, MeshRenderer};
use crate::surface::{Boundaries, NodeId};
use crate::template::{Declaration, ElementNode, Fragment, Instruction, Node, SyntaxAttributes, TagKind, Template};
use crate::value::{Object, Scope, Value};

/// Render a catalog component tag found at `nodes[index]`.
pub(super) fn render_tag(
    pass: &mut RenderPass,
    nodes: &[Node],
    index: usize,
    el: &ElementNode,
    template: Rc<Template>,
    addr: &mut PathAddressor,
    scope: &Scope,
) -> Result<(Vec<NodeId>, usize)> {
    let kind = if template.is_syntax() {
        PathKind::Syntax
    } else {
        PathKind::Component
    };
    let path = addr.next(kind);
    let (siblings, consumed) = nexted_siblings(nodes, index, template.declaration());
    let site = ChildSite {
        name: &el.tag,
        path,
        attrs: &el.attrs,
        children: &el.children,
        siblings: &siblings,
    };
    let out = mount_child(pass, template, site, scope)?;
    Ok((out, consumed))
}

/// Where and how a child component is used.
pub(super) struct ChildSite<'a> {
    pub name: &'a str,
    pub path: String,
    pub attrs: &'a SyntaxAttributes,
    pub children: &'a Fragment,
    pub siblings: &'a [Rc<ElementNode>],
}

/// Following element siblings that are nexted declaration tags. Blank
/// text between them is skipped.
fn nexted_siblings(nodes: &[Node], index: usize, declaration: Option<&Declaration>) -> (Vec<Rc<ElementNode>>, usize) {
    let Some(declaration) = declaration else {
        return (Vec::new(), 0);
    };
    let nexted: Vec<&str> = declaration
        .tags
        .iter()
        .filter(|(_, spec)| spec.kind == TagKind::Sibling)
        .map(|(tag, _)| tag.as_str())
        .collect();
    if nexted.is_empty() {
        return (Vec::new(), 0);
    }

    let mut found = Vec::new();
    let mut consumed = 0;
    let mut cursor = index + 1;
    while let Some(node) = nodes.get(cursor) {
        match node {
            Node::Text(text) if text.content.source().trim().is_empty() => {}
            Node::Element(el) if nexted.contains(&el.tag.as_str()) => {
                found.push(el.clone());
                consumed = cursor - index;
            }
            _ => break,
        }
        cursor += 1;
    }
    (found, consumed)
}

pub(super) fn mount_child(pass: &mut RenderPass, template: Rc<Template>, site: ChildSite<'_>, scope: &Scope) -> Result<Vec<NodeId>> {
    let host = pass.host().clone();
    if Rc::ptr_eq(&template, &host.template) {
        return Err(Error::structural(site.name, "rendering a component within itself is forbidden"));
    }

    let surface = pass.surface();
    let syntax = template.is_syntax();
    let path = site.path.clone();
    let start = surface.create_comment(&format!("s:{path}"));
    let end = surface.create_comment(&format!("e:{path}"));
    let boundaries = Boundaries { start, end };
    let attrs = site.attrs;

    let mut input = Object::new();
    {
        let env = pass.env(scope);
        for (name, value) in &attrs.literals {
            if name != "key" {
                input.insert(name.clone(), Value::string(value));
            }
        }
        for (name, instruction) in &attrs.functions {
            input.insert(name.clone(), function_value(&host, instruction, scope));
        }
        for (name, expr) in &attrs.expressions {
            input.insert(name.clone(), expr.evaluate(&env));
        }
        for spread in &attrs.spreads {
            for (name, value) in spread_object(site.name, &spread.evaluate(&env))? {
                if !attrs.is_explicit(&name) {
                    input.insert(name, value);
                }
            }
        }
    }

    if !site.children.is_empty() {
        let renderer = MeshRenderer::new(MeshConfig {
            host: Rc::downgrade(&host),
            fragment_path: path.clone(),
            mesh_path: None,
            boundaries,
            argv: attrs.argv.clone(),
            contents: site.children.clone(),
            scope: scope.clone(),
        });
        input.insert("renderer".into(), renderer.into());
    }

    let mut trackables: Vec<(String, Expression)> = Vec::new();
    if let Some(declaration) = template.declaration() {
        for (tag, spec) in &declaration.tags {
            let found: Vec<Rc<ElementNode>> = match spec.kind {
                TagKind::Sibling => site.siblings.iter().filter(|s| s.tag == *tag).cloned().collect(),
                TagKind::Child => site
                    .children
                    .iter()
                    .filter_map(Node::as_element)
                    .filter(|c| c.tag == *tag)
                    .cloned()
                    .collect(),
            };
            if found.is_empty() {
                if spec.optional {
                    continue;
                }
                return Err(Error::structural(site.name, format!("missing <{tag}> declaration")));
            }
            let mut wires = Vec::with_capacity(found.len());
            for (i, decl) in found.iter().enumerate() {
                let mesh_path = if spec.many {
                    format!("{tag}[{i}]")
                } else {
                    tag.clone()
                };
                wires.push(wire(pass, &path, &mesh_path, boundaries, decl, scope, &mut trackables));
            }
            let value = if spec.many {
                Value::array(wires)
            } else {
                wires.into_iter().next().unwrap_or_default()
            };
            input.insert(tag.clone(), value);
        }
    }

    let existing = host.children.borrow().get(&path).cloned();
    let child = match existing {
        Some(child) if Rc::ptr_eq(&child.inner.template, &template) => {
            child.inner.boundaries.set(Some(boundaries));
            child.set_input(Value::object(input));
            child
        }
        other => {
            if let Some(stale) = other {
                host.children.borrow_mut().shift_remove(&path);
                stale.destroy();
            }
            let child = Component::create(&host.engine, site.name, template, Value::object(input), &path, Some(boundaries))?;
            host.children.borrow_mut().insert(path.clone(), child.clone());
            child
        }
    };

    for (event, instruction) in &attrs.events {
        pass.listen(PendingEvent {
            node_path: path.clone(),
            source: EventSource::Component(child.clone()),
            event: event.clone(),
            instruction: instruction.clone(),
            scope: scope.clone(),
            syntax,
            boundaries: Some(boundaries),
        });
    }

    track_input(pass, &child, &path, boundaries, syntax, site.name, attrs, &trackables, scope);

    let mut out = Vec::with_capacity(child.nodes().len() + 2);
    out.push(start);
    out.extend(child.nodes());
    out.push(end);
    Ok(out)
}

/// Build the wire object of one declaration tag.
fn wire(
    pass: &RenderPass,
    fragment_path: &str,
    mesh_path: &str,
    boundaries: Boundaries,
    decl: &ElementNode,
    scope: &Scope,
    trackables: &mut Vec<(String, Expression)>,
) -> Value {
    let renderer = MeshRenderer::new(MeshConfig {
        host: Rc::downgrade(pass.host()),
        fragment_path: fragment_path.to_string(),
        mesh_path: Some(mesh_path.to_string()),
        boundaries,
        argv: decl.attrs.argv.clone(),
        contents: decl.children.clone(),
        scope: scope.clone(),
    });
    let env = pass.env(scope);
    let mut wire = Object::new();
    wire.insert("renderer".into(), renderer.into());
    for (name, value) in &decl.attrs.literals {
        wire.insert(name.clone(), Value::string(value));
    }
    for (name, expr) in &decl.attrs.expressions {
        wire.insert(name.clone(), expr.evaluate(&env));
        if expr.is_reactive(scope) {
            trackables.push((format!("{mesh_path}.{name}"), expr.clone()));
        }
    }
    Value::object(wire)
}

fn spread_object(tag: &str, value: &Value) -> Result<Object> {
    value
        .as_object()
        .cloned()
        .ok_or_else(|| Error::structural(tag, "spread operator expects an object"))
}

#[allow(clippy::too_many_arguments)]
fn track_input(
    pass: &mut RenderPass,
    child: &Component,
    path: &str,
    boundaries: Boundaries,
    syntax: bool,
    tag: &str,
    attrs: &SyntaxAttributes,
    trackables: &[(String, Expression)],
    scope: &Scope,
) {
    let host = Rc::downgrade(pass.host());
    let child_ref = child.downgrade();
    let binding = |key: &str, target: Target| {
        Binding::new(path, &dep_path(path, key), DependentKind::Component, target)
            .attr(key)
            .boundaries(boundaries)
            .syntax(syntax)
    };

    let keyed = attrs
        .expressions
        .iter()
        .map(|(name, expr)| (name.clone(), expr.clone()))
        .chain(trackables.iter().cloned());
    for (key, expr) in keyed {
        let deps = expr.dependencies(scope);
        if deps.is_empty() {
            continue;
        }
        let has_let = expr.reads_let(scope);
        let update = input_update(host.clone(), child_ref.clone(), InputSource::Expr(key.clone(), expr));
        for dep in deps {
            pass.track(&dep, binding(&key, Target::Attr), has_let, scope, update.clone());
        }
    }

    for (name, instruction) in &attrs.functions {
        let deps = instruction.dependencies(scope);
        if deps.is_empty() {
            continue;
        }
        let update = input_update(host.clone(), child_ref.clone(), InputSource::Function(name.clone(), instruction.clone()));
        for dep in deps {
            pass.track(&dep, binding(name, Target::Attr), false, scope, update.clone());
        }
    }

    for (index, spread) in attrs.spreads.iter().enumerate() {
        let deps = spread.dependencies(scope);
        if deps.is_empty() {
            continue;
        }
        let explicit: Vec<String> = attrs.before_spread.iter().chain(attrs.after_spread.iter()).cloned().collect();
        let source = InputSource::Spread {
            tag: tag.to_string(),
            expr: spread.clone(),
            explicit,
        };
        let has_let = spread.reads_let(scope);
        let update = input_update(host.clone(), child_ref.clone(), source);
        for dep in deps {
            pass.track(&dep, binding(&format!("...{index}"), Target::SpreadAttr), has_let, scope, update.clone());
        }
    }
}

enum InputSource {
    Expr(String, Expression),
    Function(String, Instruction),
    Spread {
        tag: String,
        expr: Expression,
        explicit: Vec<String>,
    },
}

fn input_update(host: Weak<ComponentInner>, child: Weak<ComponentInner>, source: InputSource) -> UpdateFn {
    Rc::new(move |memo: &Scope| {
        let (Some(host), Some(child)) = (host.upgrade(), child.upgrade()) else {
            return Ok(None);
        };
        let mut patch = Object::new();
        match &source {
            InputSource::Expr(key, expr) => {
                patch.insert(key.clone(), expr.evaluate(&Env::new(host.clone(), memo)));
            }
            InputSource::Function(name, instruction) => {
                patch.insert(name.clone(), function_value(&host, instruction, memo));
            }
            InputSource::Spread { tag, expr, explicit } => {
                let value = expr.evaluate(&Env::new(host.clone(), memo));
                for (name, value) in spread_object(tag, &value)? {
                    if !explicit.contains(&name) {
                        patch.insert(name, value);
                    }
                }
            }
        }
        Component::from_inner(child).sub_input(Value::object(patch))?;
        Ok(None)
    })
}
