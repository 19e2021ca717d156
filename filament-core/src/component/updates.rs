//! Fine-grained update propagation.
//!
//! A metavariable change never re-renders a template. The registry maps
//! every observable path to the bindings that read it; only those whose
//! path actually changed are queued, and the scheduler flushes them in a
//! microtask, most urgent first.

use std::rc::Rc;

use tracing::{debug, error, trace, warn};

use super::{Component, ComponentInner, Metavars};
use crate::graph::path::{is_descendant, is_within, parent};
use crate::graph::{Dependent, QueueEntry};
use crate::mesh::MeshRenderer;
use crate::syntax::renderer_of;
use crate::value::{Object, Scope, Value, VarKind};

impl ComponentInner {
    /// Queue every dependent whose observable path changed between two
    /// metavariable snapshots.
    pub(crate) fn update_dep_nodes(self: &Rc<Self>, current: &Metavars, previous: &Metavars) {
        let snapshot = self.fgud.borrow().snapshot();
        for (dep, dependents) in snapshot {
            if !should_update(&dep, current, previous) {
                continue;
            }
            for dependent in dependents {
                if self.is_stale(&dependent) {
                    warn!(component = %self.path, dep = %dep, address = %dependent.address(), "dropping stale dependency");
                    self.drop_dependent(&dep, &dependent);
                    continue;
                }
                self.queue_update(&dep, dependent);
            }
        }
    }

    pub(crate) fn queue_update(self: &Rc<Self>, dep: &str, dependent: Rc<Dependent>) {
        let needs_flush = self
            .scheduler
            .borrow_mut()
            .queue(QueueEntry::new(dep, dependent));
        if needs_flush {
            self.schedule_flush();
        }
    }

    fn schedule_flush(self: &Rc<Self>) {
        let weak = Rc::downgrade(self);
        self.engine.queue_microtask(move || {
            if let Some(inner) = weak.upgrade() {
                inner.flush_updates();
            }
        });
    }

    /// Run one batch.
    pub(crate) fn flush_updates(self: &Rc<Self>) {
        let batch = self.scheduler.borrow_mut().begin_flush();
        self.engine.metrics().batch_flushed(batch.len());
        trace!(component = %self.path, size = batch.len(), "flushing update batch");

        for entry in batch {
            if self.destroyed.get() {
                break;
            }
            let dependent = entry.dependent;
            if dependent.is_garbage() {
                continue;
            }
            if self.is_stale(&dependent) {
                warn!(component = %self.path, address = %dependent.address(), "dropping stale dependency");
                self.drop_dependent(&entry.dep, &dependent);
                continue;
            }
            let memo = self.memory.borrow().memo(dependent.node_path()).cloned();
            let Some(memo) = memo else {
                warn!(component = %self.path, node = %dependent.node_path(), "no memo for dependency; dropping it");
                self.drop_dependent(&entry.dep, &dependent);
                continue;
            };
            match dependent.update(&memo) {
                Ok(Some(next)) => {
                    self.memory.borrow_mut().set_memo(dependent.node_path(), next);
                }
                Ok(None) => {}
                Err(err) => {
                    error!(component = %self.path, address = %dependent.address(), error = %err, "dependency update failed");
                }
            }
            self.engine.metrics().dependency_updated();
        }

        if self.scheduler.borrow_mut().end_flush() {
            self.schedule_flush();
        }
    }

    /// An entry is stale once its output left the tree. Syntax bindings
    /// are only judged by their fragment.
    pub(crate) fn is_stale(&self, dependent: &Dependent) -> bool {
        let surface = self.surface();
        if let Some(boundaries) = dependent.boundaries() {
            if !dependent.is_syntax() && !surface.is_attached(boundaries.start) {
                return true;
            }
        }
        if let Some(node) = dependent.fragment() {
            if !surface.is_attached(node) {
                return true;
            }
        }
        false
    }

    fn drop_dependent(&self, dep: &str, dependent: &Dependent) {
        self.fgud.borrow_mut().remove(dep, dependent.address());
        self.memory
            .borrow_mut()
            .unbind(dependent.node_path(), dependent.address());
    }

    /// A `let` variable changed: re-run the dependents reading it under
    /// the same parent, with the new value patched into their memo.
    pub(crate) fn update_var_dep_nodes(self: &Rc<Self>, key: &str, var_path: &str, scope: &Scope) {
        let Some(value) = scope.value(key).cloned() else {
            return;
        };
        let parent_path = parent(var_path);
        self.refresh_renderers_under(parent_path, &[key.to_string()], |captured, names| {
            for name in names {
                if captured.get(name).is_some_and(|var| var.kind == VarKind::Let) {
                    if let Err(err) = captured.assign(name, value.clone()) {
                        debug!(variable = %name, error = %err, "variable not reassigned in renderer scope");
                    }
                }
            }
        });
        let dependents = self.fgud.borrow().get(key);
        for dependent in dependents {
            if !dependent.has_let()
                || dependent.node_path() == var_path
                || !is_descendant(dependent.node_path(), parent_path)
            {
                continue;
            }
            self.memory.borrow_mut().patch(dependent.node_path(), |memo| {
                if let Err(err) = memo.assign(key, value.clone()) {
                    debug!(variable = %key, error = %err, "variable not reassigned in memo");
                }
            });
            self.queue_update(key, dependent);
        }
    }

    /// Update the captured scope of every renderer held by a child at or
    /// under `prefix`.
    ///
    /// `refresh` receives the subset of `names` the renderer still sees: a
    /// child nested in another child whose renderers bind one of them as an
    /// argument keeps that inner binding.
    pub(crate) fn refresh_renderers_under(&self, prefix: &str, names: &[String], refresh: impl Fn(&mut Scope, &[&str])) {
        let children: Vec<(String, Vec<MeshRenderer>)> = self
            .children
            .borrow()
            .iter()
            .filter(|(path, _)| is_within(path, prefix))
            .map(|(path, child)| (path.clone(), held_renderers(&child.inner.input.get_untracked())))
            .collect();

        for (path, renderers) in &children {
            let visible: Vec<&str> = names
                .iter()
                .map(String::as_str)
                .filter(|name| {
                    !children.iter().any(|(outer, held)| {
                        is_descendant(path, outer)
                            && is_descendant(outer, prefix)
                            && held.iter().any(|r| r.argv().iter().any(|arg| arg.as_str() == *name))
                    })
                })
                .collect();
            for renderer in renderers {
                renderer.refresh_scope(|captured| refresh(captured, &visible));
            }
        }
    }

    /// Macro arguments changed: refresh `arguments` in the memos under
    /// `prefix` and queue the bindings that read it.
    pub(crate) fn update_arguments_dep_nodes(self: &Rc<Self>, prefix: &str, arguments: &Object) {
        let snapshot = self.fgud.borrow().snapshot();
        for (dep, dependents) in snapshot {
            if dep != "arguments" && !dep.starts_with("arguments.") {
                continue;
            }
            for dependent in dependents {
                if !is_within(dependent.node_path(), prefix) {
                    continue;
                }
                self.memory
                    .borrow_mut()
                    .patch(dependent.node_path(), |memo| memo.set_arguments(arguments.clone()));
                self.queue_update(&dep, dependent);
            }
        }
    }

    /// Re-translate every `i18n` binding after a language change.
    pub(crate) fn update_i18n_dep_nodes(self: &Rc<Self>) {
        let surface = self.surface();
        let bindings: Vec<_> = self
            .i18n
            .borrow()
            .iter()
            .map(|(key, binding)| (key.clone(), binding.clone()))
            .collect();
        for (key, binding) in bindings {
            if !surface.is_attached(binding.node) {
                self.i18n.borrow_mut().shift_remove(&key);
                self.memory.borrow_mut().unbind(&binding.node_path, &key);
                continue;
            }
            let memo = self.memory.borrow().memo(&binding.node_path).cloned();
            let Some(memo) = memo else {
                continue;
            };
            if let Err(err) = (binding.update)(&memo) {
                error!(component = %self.path, node = %binding.node_path, error = %err, "translation update failed");
            }
        }
    }

    /// Forget everything rendered at or under `prefix`: dependency entries,
    /// memo slots, event and translation bindings, preserved children.
    pub(crate) fn untrack_under(self: &Rc<Self>, prefix: &str) {
        let removed = self.fgud.borrow_mut().remove_under(prefix);
        {
            let mut memory = self.memory.borrow_mut();
            for dependent in &removed {
                memory.unbind(dependent.node_path(), dependent.address());
            }
        }

        let surface = self.surface();
        let detached: Vec<_> = {
            let mut events = self.events.borrow_mut();
            let (gone, kept) = std::mem::take(&mut *events)
                .into_iter()
                .partition(|binding| is_within(binding.node_path(), prefix));
            *events = kept;
            gone
        };
        for binding in &detached {
            binding.detach(surface.as_ref());
        }

        let stale_i18n: Vec<(String, String)> = self
            .i18n
            .borrow()
            .iter()
            .filter(|(_, binding)| is_within(&binding.node_path, prefix))
            .map(|(key, binding)| (key.clone(), binding.node_path.clone()))
            .collect();
        for (key, node_path) in stale_i18n {
            self.i18n.borrow_mut().shift_remove(&key);
            self.memory.borrow_mut().unbind(&node_path, &key);
        }

        let children: Vec<Component> = {
            let mut pcc = self.children.borrow_mut();
            let keys: Vec<String> = pcc
                .keys()
                .filter(|path| is_within(path, prefix))
                .cloned()
                .collect();
            keys.iter().filter_map(|key| pcc.shift_remove(key)).collect()
        };
        for child in children {
            child.destroy();
        }
        trace!(component = %self.path, prefix, removed = removed.len(), "untracked subtree");
    }
}

/// Renderers passed in a child's input, directly or inside wire objects.
fn held_renderers(input: &Value) -> Vec<MeshRenderer> {
    let Some(fields) = input.as_object() else {
        return Vec::new();
    };
    let mut out = Vec::new();
    for value in fields.values() {
        match value {
            Value::Array(wires) => out.extend(wires.iter().filter_map(renderer_of)),
            other => out.extend(renderer_of(other)),
        }
    }
    out
}

/// Whether a dependency path changed between two snapshots.
///
/// `self.*` bindings (handler calls) re-run on every change. Paths outside
/// the observable roots never do.
fn should_update(dep: &str, current: &Metavars, previous: &Metavars) -> bool {
    let (root, rest) = match dep.split_once('.') {
        Some((root, rest)) => (root, rest),
        None => (dep, ""),
    };
    let pick = |vars: &Metavars| -> Value {
        let value = match root {
            "input" => &vars.input,
            "state" => &vars.state,
            "context" => &vars.context,
            _ => return Value::Undefined,
        };
        if rest.is_empty() {
            value.clone()
        } else {
            value.at(rest)
        }
    };
    match root {
        "self" => true,
        "input" | "state" | "context" => pick(current).is_diff(&pick(previous)),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn vars(state: serde_json::Value) -> Metavars {
        Metavars {
            input: Value::empty_object(),
            state: state.into(),
            context: Value::empty_object(),
        }
    }

    #[test]
    fn only_changed_paths_update() {
        let before = vars(json!({"user": {"name": "ada", "age": 36}, "n": 1}));
        let after = vars(json!({"user": {"name": "ada", "age": 37}, "n": 1}));

        assert!(should_update("state.user.age", &after, &before));
        assert!(should_update("state.user", &after, &before));
        assert!(should_update("state", &after, &before));
        assert!(!should_update("state.user.name", &after, &before));
        assert!(!should_update("state.n", &after, &before));
    }

    #[test]
    fn self_bindings_always_update_and_locals_never_do() {
        let same = vars(json!({"n": 1}));
        assert!(should_update("self.total", &same, &same));
        assert!(!should_update("item", &same, &same));
        assert!(!should_update("arguments.label", &same, &same));
    }
}
