//! `<let>`, `<const>` and `<log>`.

use std::rc::{Rc, Weak};

use tracing::info;

use super::RenderPass;
use crate::component::ComponentInner;
use crate::error::{Error, Result};
use crate::expr::{Env, Expression};
use crate::graph::path::{dep_path, PathAddressor, PathKind};
use crate::graph::{Binding, DependentKind, Target, UpdateFn};
use crate::template::ElementNode;
use crate::value::{Scope, Value, VarKind};

/// Declare every attribute of the tag as a variable of the enclosing scope.
pub(super) fn declare(
    pass: &mut RenderPass,
    el: &ElementNode,
    addr: &mut PathAddressor,
    scope: &mut Scope,
    kind: VarKind,
) -> Result<()> {
    let path = addr.next(PathKind::Node);
    let attrs = &el.attrs;

    for (name, value) in &attrs.literals {
        scope.declare(name, Value::string(value), kind)?;
    }
    for spread in &attrs.spreads {
        let value = spread.evaluate(&pass.env(scope));
        let Some(object) = value.as_object() else {
            return Err(Error::structural(&el.tag, "spread operator expects an object"));
        };
        for (name, value) in object {
            if attrs.before_spread.contains(name) {
                continue;
            }
            scope.declare(name, value.clone(), kind)?;
        }
    }
    let mut reactive = Vec::new();
    for (name, expr) in &attrs.expressions {
        let value = expr.evaluate(&pass.env(scope));
        let deps = expr.dependencies(scope);
        scope.declare(name, value, kind)?;
        if kind == VarKind::Let && !deps.is_empty() {
            reactive.push((name.clone(), expr.clone(), deps));
        }
    }

    // Bindings are tracked once every variable of the tag exists, so the
    // memo holds all of them.
    let skip_before_spread = !attrs.spreads.is_empty();
    for (name, expr, deps) in reactive {
        if skip_before_spread && attrs.before_spread.contains(&name) {
            continue;
        }
        let has_let = expr.reads_let(scope);
        for dep in deps {
            let binding = Binding::new(&path, &dep_path(&path, &name), DependentKind::Let, Target::Value)
                .attr(&name)
                .syntax(true);
            let update = let_update(Rc::downgrade(pass.host()), path.clone(), name.clone(), expr.clone());
            pass.track(&dep, binding, has_let, scope, update);
        }
    }
    Ok(())
}

fn let_update(host: Weak<ComponentInner>, path: String, name: String, expr: Expression) -> UpdateFn {
    Rc::new(move |memo: &Scope| {
        let Some(host) = host.upgrade() else {
            return Ok(None);
        };
        let value = expr.evaluate(&Env::new(host.clone(), memo));
        if memo.value(&name) == Some(&value) {
            return Ok(None);
        }
        let mut next = memo.clone();
        next.assign(&name, value)?;
        host.update_var_dep_nodes(&name, &path, &next);
        Ok(Some(next))
    })
}

/// `<log args=[...]/>`: logs the evaluated arguments, again on change.
pub(super) fn log(pass: &mut RenderPass, el: &ElementNode, addr: &mut PathAddressor, scope: &Scope) {
    let path = addr.next(PathKind::Node);
    let Some(args) = el.attrs.expression("args").cloned() else {
        if let Some(message) = el.attrs.literal("args") {
            info!(target: "filament::template", node = %path, "{message}");
        }
        return;
    };
    let host = pass.host().clone();
    let update = log_update(Rc::downgrade(&host), path.clone(), args.clone());
    if let Err(err) = update(scope) {
        tracing::warn!(node = %path, error = %err, "log failed");
    }
    let has_let = args.reads_let(scope);
    for dep in args.dependencies(scope) {
        let binding = Binding::new(&path, &dep_path(&path, "args"), DependentKind::Log, Target::Argument).syntax(true);
        pass.track(&dep, binding, has_let, scope, update.clone());
    }
}

fn log_update(host: Weak<ComponentInner>, path: String, args: Expression) -> UpdateFn {
    Rc::new(move |memo: &Scope| {
        let Some(host) = host.upgrade() else {
            return Ok(None);
        };
        let value = args.evaluate(&Env::new(host, memo));
        let line = match &value {
            Value::Array(items) => items.iter().map(Value::to_display).collect::<Vec<_>>().join(" "),
            other => other.to_display(),
        };
        info!(target: "filament::template", node = %path, "{line}");
        Ok(None)
    })
}
