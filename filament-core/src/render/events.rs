//! Event bindings.
//!
//! `on-<event>` attributes subscribe to the surface node (elements) or to
//! the child's emitter (components). The listener evaluates its
//! instruction against a scope cell; when the instruction's arguments read
//! observable paths, a tier-3 dependency entry refreshes that cell so the
//! next event sees current values.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use tracing::warn;

use super::RenderPass;
use crate::component::{Component, ComponentInner};
use crate::error::EvalError;
use crate::events::ListenerId;
use crate::expr::{Env, Expression, Host};
use crate::graph::path::dep_path;
use crate::graph::{Binding, DependentKind, Target};
use crate::surface::{Boundaries, Listener, NodeId, Surface};
use crate::template::Instruction;
use crate::value::{Scope, Value, VarKind};

pub(crate) enum EventSource {
    Node(NodeId),
    Component(Component),
}

/// An event collected during a pass, attached once the output exists.
pub(crate) struct PendingEvent {
    pub node_path: String,
    pub source: EventSource,
    pub event: String,
    pub instruction: Instruction,
    pub scope: Scope,
    pub syntax: bool,
    pub boundaries: Option<Boundaries>,
}

enum BoundTarget {
    Node(NodeId),
    Component(Weak<ComponentInner>, ListenerId),
}

/// A live subscription owned by the host component.
pub(crate) struct EventBinding {
    node_path: String,
    event: String,
    target: BoundTarget,
}

impl EventBinding {
    pub(crate) fn node_path(&self) -> &str {
        &self.node_path
    }

    pub(crate) fn detach(&self, surface: &dyn Surface) {
        match &self.target {
            BoundTarget::Node(node) => surface.unsubscribe(*node, &self.event),
            BoundTarget::Component(child, id) => {
                if let Some(child) = child.upgrade() {
                    child.emitter.off(&self.event, Some(*id));
                }
            }
        }
    }
}

pub(super) fn attach(pass: &mut RenderPass, pending: PendingEvent) {
    let host = pass.host().clone();
    let PendingEvent {
        node_path,
        source,
        event,
        instruction,
        scope,
        syntax,
        boundaries,
    } = pending;

    let cell = Rc::new(RefCell::new(scope.clone()));
    let listener: Listener = {
        let weak = Rc::downgrade(&host);
        let instruction = instruction.clone();
        let cell = cell.clone();
        let event = event.clone();
        Rc::new(move |payload: &[Value]| {
            let Some(host) = weak.upgrade() else {
                return;
            };
            let memo = cell.borrow().clone();
            if let Err(err) = dispatch(&host, &instruction, &memo, payload) {
                warn!(component = %host.path, event = %event, error = %err, "event handler failed");
            }
        })
    };

    let (target, fragment) = match source {
        EventSource::Node(node) => {
            pass.surface().subscribe(node, &event, listener);
            (BoundTarget::Node(node), Some(node))
        }
        EventSource::Component(child) => {
            let id = child.inner.emitter.on(&event, listener);
            (BoundTarget::Component(child.downgrade(), id), None)
        }
    };
    host.events.borrow_mut().push(EventBinding {
        node_path: node_path.clone(),
        event: event.clone(),
        target,
    });

    let deps = instruction.dependencies(&scope);
    let has_let = deps
        .iter()
        .any(|dep| scope.get(dep).is_some_and(|var| var.kind == VarKind::Let));
    for dep in deps {
        let mut binding = Binding::new(
            &node_path,
            &dep_path(&node_path, &format!("on-{event}.{dep}")),
            DependentKind::Event,
            Target::Handler,
        )
        .attr(&event)
        .syntax(syntax);
        if let Some(node) = fragment {
            binding = binding.fragment(node);
        }
        if let Some(boundaries) = boundaries {
            binding = binding.boundaries(boundaries);
        }
        let cell = cell.clone();
        pass.track(
            &dep,
            binding,
            has_let,
            &scope,
            Rc::new(move |memo: &Scope| {
                *cell.borrow_mut() = memo.clone();
                Ok(None)
            }),
        );
    }
}

/// Run an instruction. Arguments come first, then the event payload.
pub(crate) fn dispatch(
    host: &Rc<ComponentInner>,
    instruction: &Instruction,
    scope: &Scope,
    payload: &[Value],
) -> Result<Value, EvalError> {
    let env = Env::new(host.clone(), scope);
    match instruction {
        Instruction::Call { handler, args } => {
            let mut values: Vec<Value> = args.iter().map(|arg| arg.evaluate(&env)).collect();
            values.extend_from_slice(payload);
            if host.has_method(handler) {
                return host.call_method(handler, &values);
            }
            match Expression::code(handler).try_evaluate(&env)? {
                Value::Function(f) => f.call(&values),
                _ => Err(EvalError::NotCallable(handler.clone())),
            }
        }
        Instruction::Expr(expr) => match expr.try_evaluate(&env)? {
            Value::Function(f) => f.call(payload),
            _ => Err(EvalError::NotCallable(expr.source().to_string())),
        },
    }
}

/// The function value a `fn:` attribute passes down to a child.
pub(crate) fn function_value(host: &Rc<ComponentInner>, instruction: &Instruction, scope: &Scope) -> Value {
    let weak = Rc::downgrade(host);
    let instruction = instruction.clone();
    let scope = scope.clone();
    Value::function(move |args| {
        let host = weak.upgrade().ok_or(EvalError::HostGone)?;
        dispatch(&host, &instruction, &scope, args)
    })
}
