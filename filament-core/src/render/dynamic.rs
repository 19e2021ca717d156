//! `<{expr}>` tags.
//!
//! The tag expression may yield a mesh renderer, a template, or a string
//! naming a registered component or a plain element. Whatever it yields is
//! rendered between two markers; when the expression changes, the old
//! content is untracked and replaced. The `#` attribute passes every key of
//! its object along as if spread.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use tracing::debug;

use super::component::{mount_child, ChildSite};
use super::element;
use super::RenderPass;
use crate::component::ComponentInner;
use crate::error::Result;
use crate::expr::Env;
use crate::graph::path::{dep_path, PathAddressor, PathKind};
use crate::graph::{Binding, DependentKind, Target, UpdateFn};
use crate::mesh::MeshRenderer;
use crate::surface::{clear_between, insert_all_before, Boundaries, NodeId};
use crate::template::{DynamicNode, ElementNode, SyntaxAttributes, Template};
use crate::value::{Object, Scope, Value};

const PASS_ALL_ATTR: &str = "#";

/// What a dynamic tag currently renders.
#[derive(Clone)]
pub(crate) enum DynamicTarget {
    Renderer(MeshRenderer),
    Component { name: String, template: Rc<Template> },
    Element(String),
    Empty,
}

impl DynamicTarget {
    fn resolve(host: &ComponentInner, value: &Value) -> Result<Self> {
        Ok(match value {
            Value::Renderer(renderer) => DynamicTarget::Renderer(renderer.clone()),
            Value::Template(template) => DynamicTarget::Component {
                name: "dynamic".into(),
                template: template.clone(),
            },
            Value::String(name) if !name.is_empty() => {
                if host.engine.has(name) {
                    DynamicTarget::Component {
                        name: name.to_string(),
                        template: host.engine.import(name)?,
                    }
                } else {
                    DynamicTarget::Element(name.to_string())
                }
            }
            _ => DynamicTarget::Empty,
        })
    }

    fn same(&self, other: &DynamicTarget) -> bool {
        match (self, other) {
            (DynamicTarget::Renderer(a), DynamicTarget::Renderer(b)) => a.ptr_eq(b),
            (DynamicTarget::Component { template: a, .. }, DynamicTarget::Component { template: b, .. }) => {
                Rc::ptr_eq(a, b)
            }
            (DynamicTarget::Element(a), DynamicTarget::Element(b)) => a == b,
            (DynamicTarget::Empty, DynamicTarget::Empty) => true,
            _ => false,
        }
    }
}

/// The tag's current target and where its content was addressed.
struct Mounted {
    target: DynamicTarget,
    content: Option<String>,
}

/// Attributes with `#` turned into a spread.
fn normalize(attrs: &SyntaxAttributes) -> SyntaxAttributes {
    let mut attrs = attrs.clone();
    if let Some(all) = attrs.expressions.shift_remove(PASS_ALL_ATTR) {
        attrs.before_spread.retain(|k| k != PASS_ALL_ATTR);
        attrs.after_spread.retain(|k| k != PASS_ALL_ATTR);
        attrs.spreads.push(all);
    }
    attrs
}

pub(super) fn render(pass: &mut RenderPass, node: &Rc<DynamicNode>, addr: &mut PathAddressor, scope: &Scope) -> Result<Vec<NodeId>> {
    let host = pass.host().clone();
    let surface = pass.surface();
    let path = addr.next(PathKind::Dynamic);
    let start = surface.create_comment(&format!("s:{path}"));
    let end = surface.create_comment(&format!("e:{path}"));
    let boundaries = Boundaries { start, end };
    let attrs = Rc::new(normalize(&node.attrs));

    let value = node.tag.evaluate(&pass.env(scope));
    let target = DynamicTarget::resolve(&host, &value)?;
    let (content, content_path) = render_target(pass, node, &attrs, &path, &target, scope)?;
    let mounted = Rc::new(RefCell::new(Mounted {
        target,
        content: content_path,
    }));

    let deps = node.tag.dependencies(scope);
    let has_let = !deps.is_empty() && node.tag.reads_let(scope);
    for dep in deps {
        let binding = Binding::new(&path, &dep_path(&path, "tag"), DependentKind::Dynamic, Target::Tag)
            .boundaries(boundaries)
            .syntax(true);
        let update = retarget(
            Rc::downgrade(&host),
            node.clone(),
            attrs.clone(),
            path.clone(),
            boundaries,
            mounted.clone(),
        );
        pass.track(&dep, binding, has_let, scope, update);
    }
    track_arguments(pass, &attrs, &path, boundaries, &mounted, scope);

    let mut out = Vec::with_capacity(content.len() + 2);
    out.push(start);
    out.extend(content);
    out.push(end);
    Ok(out)
}

/// Render one target. Also returns the address its content lives under,
/// when it has one of its own.
fn render_target(
    pass: &mut RenderPass,
    node: &DynamicNode,
    attrs: &SyntaxAttributes,
    path: &str,
    target: &DynamicTarget,
    scope: &Scope,
) -> Result<(Vec<NodeId>, Option<String>)> {
    let mut addr = PathAddressor::new(path);
    match target {
        DynamicTarget::Renderer(renderer) => {
            let args = renderer_args(pass.host(), attrs, scope)?;
            Ok((renderer.mesh(&args, None, None)?, None))
        }
        DynamicTarget::Component { name, template } => {
            let child_path = addr.next(PathKind::Component);
            let site = ChildSite {
                name,
                path: child_path.clone(),
                attrs,
                children: &node.children,
                siblings: &[],
            };
            Ok((mount_child(pass, template.clone(), site, scope)?, Some(child_path)))
        }
        DynamicTarget::Element(tag) => {
            let el = ElementNode {
                tag: tag.clone(),
                attrs: attrs.clone(),
                children: node.children.clone(),
            };
            let mut probe = addr.clone();
            let content_path = probe.next(PathKind::Node);
            let id = element::render(pass, &el, &mut addr, scope, false)?;
            Ok((vec![id], Some(content_path)))
        }
        DynamicTarget::Empty => Ok((Vec::new(), None)),
    }
}

/// Arguments handed to a renderer target.
fn renderer_args(host: &Rc<ComponentInner>, attrs: &SyntaxAttributes, scope: &Scope) -> Result<Object> {
    let env = Env::new(host.clone(), scope);
    let mut args = Object::new();
    for (name, value) in &attrs.literals {
        args.insert(name.clone(), Value::string(value));
    }
    for spread in &attrs.spreads {
        if let Some(object) = spread.evaluate(&env).as_object() {
            for (name, value) in object {
                if !attrs.is_explicit(name) {
                    args.insert(name.clone(), value.clone());
                }
            }
        }
    }
    for (name, expr) in &attrs.expressions {
        args.insert(name.clone(), expr.evaluate(&env));
    }
    Ok(args)
}

fn retarget(
    host: Weak<ComponentInner>,
    node: Rc<DynamicNode>,
    attrs: Rc<SyntaxAttributes>,
    path: String,
    boundaries: Boundaries,
    mounted: Rc<RefCell<Mounted>>,
) -> UpdateFn {
    Rc::new(move |memo: &Scope| {
        let Some(host) = host.upgrade() else {
            return Ok(None);
        };
        let value = node.tag.evaluate(&Env::new(host.clone(), memo));
        let next = DynamicTarget::resolve(&host, &value)?;
        if next.same(&mounted.borrow().target) {
            return Ok(None);
        }
        debug!(component = %host.path, node = %path, "dynamic tag retargeted");

        let previous = std::mem::replace(
            &mut *mounted.borrow_mut(),
            Mounted {
                target: DynamicTarget::Empty,
                content: None,
            },
        );
        if let DynamicTarget::Renderer(renderer) = &previous.target {
            renderer.release();
        }
        if let Some(content) = &previous.content {
            host.untrack_under(content);
        }
        let surface = host.surface();
        clear_between(surface.as_ref(), boundaries);

        let mut pass = RenderPass::new(host.clone());
        let (nodes, content) = render_target(&mut pass, &node, &attrs, &path, &next, memo)?;
        let deps = pass.finish();
        host.fgud.borrow_mut().merge(deps, None);
        insert_all_before(surface.as_ref(), &nodes, boundaries.end);
        *mounted.borrow_mut() = Mounted { target: next, content };
        Ok(None)
    })
}

/// Attribute bindings that only matter while the target is a renderer;
/// components and elements track their own.
fn track_arguments(
    pass: &mut RenderPass,
    attrs: &Rc<SyntaxAttributes>,
    path: &str,
    boundaries: Boundaries,
    mounted: &Rc<RefCell<Mounted>>,
    scope: &Scope,
) {
    let reactive = attrs
        .expressions
        .iter()
        .map(|(name, expr)| (Some(name.clone()), expr))
        .chain(attrs.spreads.iter().map(|expr| (None, expr)));
    for (index, (name, expr)) in reactive.enumerate() {
        let deps = expr.dependencies(scope);
        if deps.is_empty() {
            continue;
        }
        let key = name.clone().unwrap_or_else(|| format!("...{index}"));
        let has_let = expr.reads_let(scope);
        let update = argument_update(Rc::downgrade(pass.host()), attrs.clone(), name, mounted.clone());
        for dep in deps {
            let binding = Binding::new(path, &dep_path(path, &key), DependentKind::Dynamic, Target::Argument)
                .attr(&key)
                .boundaries(boundaries)
                .syntax(true);
            pass.track(&dep, binding, has_let, scope, update.clone());
        }
    }
}

fn argument_update(
    host: Weak<ComponentInner>,
    attrs: Rc<SyntaxAttributes>,
    name: Option<String>,
    mounted: Rc<RefCell<Mounted>>,
) -> UpdateFn {
    Rc::new(move |memo: &Scope| {
        let Some(host) = host.upgrade() else {
            return Ok(None);
        };
        let renderer = match &mounted.borrow().target {
            DynamicTarget::Renderer(renderer) => renderer.clone(),
            _ => return Ok(None),
        };
        let args = renderer_args(&host, &attrs, memo)?;
        let changed: Vec<String> = match &name {
            Some(name) => vec![name.clone()],
            None => args.keys().cloned().collect(),
        };
        renderer.update(&changed, &args, None, None)?;
        Ok(None)
    })
}
