//! Macro calls.
//!
//! A tag naming one of the host's macros renders the macro fragment as a
//! mesh partial. Declared arguments are bound as variables (missing ones
//! are `undefined`); every passed attribute, declared or not, is reachable
//! through `arguments`.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use super::RenderPass;
use crate::component::ComponentInner;
use crate::error::{Error, Result};
use crate::expr::{Env, Expression};
use crate::graph::path::{dep_path, PathAddressor, PathKind};
use crate::graph::{Binding, DependentKind, Target, UpdateFn};
use crate::mesh::{MeshConfig, MeshRenderer};
use crate::surface::{Boundaries, NodeId};
use crate::template::{ElementNode, Macro, SyntaxAttributes};
use crate::value::{Object, Scope, Value};

pub(super) fn render(
    pass: &mut RenderPass,
    el: &ElementNode,
    mac: &Macro,
    addr: &mut PathAddressor,
    scope: &Scope,
) -> Result<Vec<NodeId>> {
    let host = pass.host().clone();
    let surface = pass.surface();
    let path = addr.next(PathKind::Macro);
    let start = surface.create_comment(&format!("s:{path}"));
    let end = surface.create_comment(&format!("e:{path}"));
    let boundaries = Boundaries { start, end };

    let mut args = Object::new();
    for name in &mac.argv {
        args.insert(name.clone(), Value::Undefined);
    }
    collect_args(&host, &el.tag, &el.attrs, scope, &mut args)?;

    let renderer = MeshRenderer::new(MeshConfig {
        host: Rc::downgrade(&host),
        fragment_path: path.clone(),
        mesh_path: None,
        boundaries,
        argv: mac.argv.clone(),
        contents: mac.fragment.clone(),
        scope: scope.clone(),
    });
    let mut local = Scope::new();
    local.set_arguments(args.clone());
    let content = renderer.mesh(&args, Some(&local), None)?;

    let args = Rc::new(RefCell::new(args));
    let attrs = Rc::new(el.attrs.clone());
    let reactive = el
        .attrs
        .expressions
        .iter()
        .map(|(name, expr)| (name.clone(), expr.clone()))
        .chain(
            el.attrs
                .spreads
                .iter()
                .enumerate()
                .map(|(i, expr)| (format!("...{i}"), expr.clone())),
        );
    for (key, expr) in reactive {
        let deps = expr.dependencies(scope);
        if deps.is_empty() {
            continue;
        }
        let has_let = expr.reads_let(scope);
        let update = argument_update(
            Rc::downgrade(&host),
            el.tag.clone(),
            attrs.clone(),
            key.clone(),
            expr,
            renderer.clone(),
            args.clone(),
        );
        for dep in deps {
            let binding = Binding::new(&path, &dep_path(&path, &key), DependentKind::Macro, Target::Argument)
                .attr(&key)
                .boundaries(boundaries)
                .syntax(true);
            pass.track(&dep, binding, has_let, scope, update.clone());
        }
    }

    let mut out = Vec::with_capacity(content.len() + 2);
    out.push(start);
    out.extend(content);
    out.push(end);
    Ok(out)
}

fn collect_args(host: &Rc<ComponentInner>, tag: &str, attrs: &SyntaxAttributes, scope: &Scope, args: &mut Object) -> Result<()> {
    let env = Env::new(host.clone(), scope);
    for (name, value) in &attrs.literals {
        args.insert(name.clone(), Value::string(value));
    }
    for (name, expr) in &attrs.expressions {
        args.insert(name.clone(), expr.evaluate(&env));
    }
    for spread in &attrs.spreads {
        let value = spread.evaluate(&env);
        let Some(object) = value.as_object() else {
            return Err(Error::structural(tag, "spread operator expects an object"));
        };
        for (name, value) in object {
            if !attrs.is_explicit(name) {
                args.insert(name.clone(), value.clone());
            }
        }
    }
    Ok(())
}

fn argument_update(
    host: Weak<ComponentInner>,
    tag: String,
    attrs: Rc<SyntaxAttributes>,
    key: String,
    expr: Expression,
    renderer: MeshRenderer,
    args: Rc<RefCell<Object>>,
) -> UpdateFn {
    Rc::new(move |memo: &Scope| {
        let Some(host) = host.upgrade() else {
            return Ok(None);
        };
        let value = expr.evaluate(&Env::new(host.clone(), memo));
        let mut changed = Vec::new();
        {
            let mut args = args.borrow_mut();
            if key.starts_with("...") {
                let Some(object) = value.as_object() else {
                    return Err(Error::structural(&tag, "spread operator expects an object"));
                };
                for (name, value) in object {
                    if attrs.is_explicit(name) {
                        continue;
                    }
                    if args.get(name).map_or(true, |old| old.is_diff(value)) {
                        changed.push(name.clone());
                    }
                    args.insert(name.clone(), value.clone());
                }
            } else if args.get(&key).map_or(true, |old| old.is_diff(&value)) {
                changed.push(key.clone());
                args.insert(key.clone(), value);
            }
        }
        if changed.is_empty() {
            return Ok(None);
        }

        let all = args.borrow().clone();
        let mut local = Scope::new();
        local.set_arguments(all.clone());
        let declared: Vec<String> = changed
            .into_iter()
            .filter(|name| renderer.argv().contains(name))
            .collect();
        if !declared.is_empty() {
            renderer.update(&declared, &all, Some(&local), None)?;
        }
        host.update_arguments_dep_nodes(&renderer.partial_path(None), &all);
        Ok(None)
    })
}
