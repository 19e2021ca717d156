//! Plain elements and text nodes.
//!
//! Attributes are written in three passes: literals, then spreads, then
//! explicit expressions. Spreads never override a key the node binds
//! explicitly, wherever that key sits relative to the spread.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use super::events::{EventSource, PendingEvent};
use super::RenderPass;
use crate::component::ComponentInner;
use crate::error::{Error, Result};
use crate::expr::{Env, Expression};
use crate::graph::path::{dep_path, PathAddressor, PathKind};
use crate::graph::{Binding, DependentKind, Target, UpdateFn};
use crate::i18n::TRANSLATABLE_ATTRS;
use crate::surface::NodeId;
use crate::template::{split_top_level, ElementNode, SyntaxAttributes, TextNode};
use crate::value::{Scope, Value};

pub(super) fn render(
    pass: &mut RenderPass,
    el: &ElementNode,
    addr: &mut PathAddressor,
    scope: &Scope,
    i18n: bool,
) -> Result<NodeId> {
    let host = pass.host().clone();
    let surface = pass.surface();
    let path = addr.next(PathKind::Node);
    let node = surface.create_element(&el.tag);
    host.engine.metrics().element_created();

    let attrs = &el.attrs;
    let translate = attrs.i18n;

    for (name, value) in &attrs.literals {
        let text = if translate && is_translatable(name) {
            host.translate(value)
        } else {
            value.clone()
        };
        surface.set_attribute(node, name, &text);
    }

    let explicit: Rc<Vec<String>> = Rc::new(
        attrs
            .before_spread
            .iter()
            .chain(attrs.after_spread.iter())
            .cloned()
            .collect(),
    );
    for (index, spread) in attrs.spreads.iter().enumerate() {
        let value = spread.evaluate(&pass.env(scope));
        let written = apply_spread(&host, node, &el.tag, &explicit, &value, &[])?;
        let deps = spread.dependencies(scope);
        if deps.is_empty() {
            continue;
        }
        let written = Rc::new(RefCell::new(written));
        let has_let = spread.reads_let(scope);
        for dep in deps {
            let binding = Binding::new(&path, &dep_path(&path, &format!("...{index}")), DependentKind::Element, Target::SpreadAttr)
                .fragment(node);
            let update = spread_update(
                Rc::downgrade(&host),
                node,
                el.tag.clone(),
                spread.clone(),
                explicit.clone(),
                written.clone(),
            );
            pass.track(&dep, binding, has_let, scope, update);
        }
    }

    for (name, expr) in &attrs.expressions {
        if name == "@format" {
            format_attr(pass, &path, node, expr, scope);
            continue;
        }
        let value = expr.evaluate(&pass.env(scope));
        write_attr(&host, node, name, &value, translate);

        let deps = expr.dependencies(scope);
        let has_let = !deps.is_empty() && expr.reads_let(scope);
        let target = if name.starts_with('@') {
            Target::MetaAttr
        } else {
            Target::Attr
        };
        for dep in deps {
            let binding = Binding::new(&path, &dep_path(&path, name), DependentKind::Element, target)
                .attr(name)
                .fragment(node);
            let update = attr_update(Rc::downgrade(&host), node, name.clone(), expr.clone(), translate);
            pass.track(&dep, binding, has_let, scope, update);
        }
    }

    if translate && has_translatable(attrs) {
        let update = retranslate(Rc::downgrade(&host), node, attrs.clone());
        pass.translatable(&path, node, scope, update);
    }

    let mut child_scope = scope.clone();
    let mut child_addr = PathAddressor::new(path.clone());
    let children = pass.render_fragment(&el.children, &mut child_addr, &mut child_scope, translate || i18n)?;
    for child in children {
        surface.append_child(node, child);
    }

    for (event, instruction) in &attrs.events {
        pass.listen(PendingEvent {
            node_path: path.clone(),
            source: EventSource::Node(node),
            event: event.clone(),
            instruction: instruction.clone(),
            scope: scope.clone(),
            syntax: false,
            boundaries: None,
        });
    }

    Ok(node)
}

pub(super) fn render_text(
    pass: &mut RenderPass,
    text: &TextNode,
    addr: &mut PathAddressor,
    scope: &Scope,
    i18n: bool,
) -> NodeId {
    let host = pass.host().clone();
    let path = addr.next(PathKind::Node);
    let content = text.content.clone();
    let initial = display_text(&host, &content, scope, i18n);
    let node = pass.surface().create_text(&initial);

    let deps = content.dependencies(scope);
    let has_let = !deps.is_empty() && content.reads_let(scope);
    for dep in deps {
        let binding = Binding::new(&path, &dep_path(&path, &dep), DependentKind::Text, Target::Value).fragment(node);
        let update = text_update(Rc::downgrade(&host), node, content.clone(), i18n);
        pass.track(&dep, binding, has_let, scope, update);
    }
    if i18n {
        let update = text_update(Rc::downgrade(&host), node, content, true);
        pass.translatable(&path, node, scope, update);
    }
    node
}

fn display_text(host: &Rc<ComponentInner>, content: &Expression, memo: &Scope, i18n: bool) -> String {
    let text = content.evaluate(&Env::new(host.clone(), memo)).to_display();
    if i18n {
        host.translate(&text)
    } else {
        text
    }
}

fn text_update(host: Weak<ComponentInner>, node: NodeId, content: Expression, i18n: bool) -> UpdateFn {
    Rc::new(move |memo: &Scope| {
        let Some(host) = host.upgrade() else {
            return Ok(None);
        };
        let text = display_text(&host, &content, memo, i18n);
        host.surface().set_text(node, &text);
        Ok(None)
    })
}

fn attr_update(host: Weak<ComponentInner>, node: NodeId, name: String, expr: Expression, translate: bool) -> UpdateFn {
    Rc::new(move |memo: &Scope| {
        let Some(host) = host.upgrade() else {
            return Ok(None);
        };
        let value = expr.evaluate(&Env::new(host.clone(), memo));
        write_attr(&host, node, &name, &value, translate);
        Ok(None)
    })
}

fn spread_update(
    host: Weak<ComponentInner>,
    node: NodeId,
    tag: String,
    spread: Expression,
    explicit: Rc<Vec<String>>,
    written: Rc<RefCell<Vec<String>>>,
) -> UpdateFn {
    Rc::new(move |memo: &Scope| {
        let Some(host) = host.upgrade() else {
            return Ok(None);
        };
        let value = spread.evaluate(&Env::new(host.clone(), memo));
        let previous = written.borrow().clone();
        let keys = apply_spread(&host, node, &tag, &explicit, &value, &previous)?;
        *written.borrow_mut() = keys;
        Ok(None)
    })
}

/// Write the keys of a spread object, skipping explicit ones, and remove
/// the keys a previous application wrote that are gone now.
fn apply_spread(
    host: &ComponentInner,
    node: NodeId,
    tag: &str,
    explicit: &[String],
    value: &Value,
    previous: &[String],
) -> Result<Vec<String>> {
    let Some(object) = value.as_object() else {
        return Err(Error::structural(
            tag,
            format!("spread operator expects an object, got {}", value.type_name()),
        ));
    };
    let surface = host.surface();
    let mut written = Vec::new();
    for (key, value) in object {
        if explicit.iter().any(|k| k == key) {
            continue;
        }
        write_attr(host, node, key, value, false);
        written.push(key.clone());
    }
    for key in previous {
        if !written.contains(key) {
            surface.remove_attribute(node, key);
        }
    }
    Ok(written)
}

/// Write one attribute value.
///
/// `undefined`, `null` and `false` remove the attribute; a style object is
/// serialized; `@html` and `@text` write content instead of an attribute.
fn write_attr(host: &ComponentInner, node: NodeId, name: &str, value: &Value, translate: bool) {
    let surface = host.surface();
    match name {
        "@html" => surface.set_html(node, &value.to_display()),
        "@text" => surface.set_text(node, &value.to_display()),
        _ => match value {
            Value::Undefined | Value::Null | Value::Bool(false) => surface.remove_attribute(node, name),
            Value::Object(style) if name == "style" => {
                let css = style
                    .iter()
                    .map(|(k, v)| format!("{k}:{}", v.to_display()))
                    .collect::<Vec<_>>()
                    .join(";");
                surface.set_attribute(node, name, &css);
            }
            value => {
                let text = value.to_display();
                let text = if translate && is_translatable(name) {
                    host.translate(&text)
                } else {
                    text
                };
                surface.set_attribute(node, name, &text);
            }
        },
    }
}

fn is_translatable(name: &str) -> bool {
    TRANSLATABLE_ATTRS.contains(&name)
}

fn has_translatable(attrs: &SyntaxAttributes) -> bool {
    attrs.literals.keys().chain(attrs.expressions.keys()).any(|name| is_translatable(name))
}

fn retranslate(host: Weak<ComponentInner>, node: NodeId, attrs: SyntaxAttributes) -> UpdateFn {
    Rc::new(move |memo: &Scope| {
        let Some(host) = host.upgrade() else {
            return Ok(None);
        };
        let surface = host.surface();
        for (name, value) in attrs.literals.iter().filter(|(name, _)| is_translatable(name)) {
            surface.set_attribute(node, name, &host.translate(value));
        }
        for (name, expr) in attrs.expressions.iter().filter(|(name, _)| is_translatable(name)) {
            let value = expr.evaluate(&Env::new(host.clone(), memo));
            write_attr(&host, node, name, &value, true);
        }
        Ok(None)
    })
}

/// `@format="reference, params"`: translator formatting into the node's
/// text, refreshed when the params or the language change.
fn format_attr(pass: &mut RenderPass, path: &str, node: NodeId, expr: &Expression, scope: &Scope) {
    let mut parts = split_top_level(expr.source()).into_iter();
    let reference = parts
        .next()
        .unwrap_or_default()
        .trim_matches(|c| c == '\'' || c == '"' || c == '`')
        .to_string();
    let params = parts
        .next()
        .map(|source| Expression::code(&source))
        .unwrap_or_else(|| Expression::literal(Value::empty_object()));

    let host = pass.host().clone();
    let update = format_update(Rc::downgrade(&host), node, reference, params.clone());
    if let Err(err) = update(scope) {
        tracing::warn!(node = %path, error = %err, "format failed");
    }

    let deps = params.dependencies(scope);
    let has_let = !deps.is_empty() && params.reads_let(scope);
    for dep in deps {
        let binding = Binding::new(path, &dep_path(path, "@format"), DependentKind::Element, Target::MetaAttr)
            .attr("@format")
            .fragment(node);
        pass.track(&dep, binding, has_let, scope, update.clone());
    }
    pass.translatable(path, node, scope, update);
}

fn format_update(host: Weak<ComponentInner>, node: NodeId, reference: String, params: Expression) -> UpdateFn {
    Rc::new(move |memo: &Scope| {
        let Some(host) = host.upgrade() else {
            return Ok(None);
        };
        let params = params.evaluate(&Env::new(host.clone(), memo));
        let text = host.format(&reference, &params).unwrap_or_else(|| reference.clone());
        host.surface().set_text(node, &text);
        Ok(None)
    })
}
