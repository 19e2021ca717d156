//! Dependency extraction over expression trees.

use super::{ArrayItem, Expr, Property};
use crate::value::Scope;

/// Roots whose member paths are tracked.
pub(crate) const OBSERVABLE_ROOTS: [&str; 5] = ["state", "input", "context", "arguments", "self"];

pub(crate) fn collect(expr: &Expr, scope: &Scope, bound: &mut Vec<String>, out: &mut Vec<String>) {
    match expr {
        Expr::Literal(_) => {}
        Expr::Ident(name) => root(name, &[], scope, bound, out),
        Expr::Member { object, .. } => match chain(expr) {
            Some((name, props)) => root(name, &props, scope, bound, out),
            None => collect(object, scope, bound, out),
        },
        Expr::Index { object, index } => {
            collect(object, scope, bound, out);
            collect(index, scope, bound, out);
        }
        Expr::Call { callee, args } => {
            match chain(callee) {
                // `state.name.trim()` reads `state.name`; `self.fn()` reads `self.fn`.
                Some((name, props)) if name != "self" && !props.is_empty() => {
                    root(name, &props[..props.len() - 1], scope, bound, out)
                }
                _ => collect(callee, scope, bound, out),
            }
            for arg in args {
                collect(arg, scope, bound, out);
            }
        }
        Expr::Unary { operand, .. } => collect(operand, scope, bound, out),
        Expr::Binary { left, right, .. } | Expr::Logical { left, right, .. } => {
            collect(left, scope, bound, out);
            collect(right, scope, bound, out);
        }
        Expr::Conditional {
            test,
            consequent,
            alternate,
        } => {
            collect(test, scope, bound, out);
            collect(consequent, scope, bound, out);
            collect(alternate, scope, bound, out);
        }
        Expr::Array(items) => {
            for item in items {
                let (ArrayItem::Item(e) | ArrayItem::Spread(e)) = item;
                collect(e, scope, bound, out);
            }
        }
        Expr::Object(props) => {
            for prop in props {
                let (Property::Pair(_, e) | Property::Spread(e)) = prop;
                collect(e, scope, bound, out);
            }
        }
        Expr::Arrow { params, body } => {
            let mark = bound.len();
            bound.extend(params.iter().cloned());
            collect(body, scope, bound, out);
            bound.truncate(mark);
        }
    }
}

/// `a.b.c` as (`a`, [`b`, `c`]) when the chain is plain identifiers.
fn chain(expr: &Expr) -> Option<(&str, Vec<&str>)> {
    match expr {
        Expr::Ident(name) => Some((name.as_str(), Vec::new())),
        Expr::Member {
            object, property, ..
        } => {
            let (name, mut props) = chain(object)?;
            props.push(property.as_str());
            Some((name, props))
        }
        _ => None,
    }
}

fn root(name: &str, props: &[&str], scope: &Scope, bound: &[String], out: &mut Vec<String>) {
    if bound.iter().any(|b| b == name) {
        return;
    }
    let path = if scope.contains(name) {
        name.to_string()
    } else if OBSERVABLE_ROOTS.contains(&name) {
        std::iter::once(name)
            .chain(props.iter().copied())
            .collect::<Vec<_>>()
            .join(".")
    } else {
        return;
    };
    if !out.contains(&path) {
        out.push(path);
    }
}
