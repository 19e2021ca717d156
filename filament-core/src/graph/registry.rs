//! Dependency Registry
//!
//! Maps an observable path (`state.user.name`, a scope variable name, ...)
//! to the dependents that read it, keyed by dependent address. At most one
//! entry exists per (path, address) pair; tracking the same pair again
//! replaces the old entry and marks it garbage.

use std::rc::Rc;

use indexmap::IndexMap;

use super::node::Dependent;
use super::path;

#[derive(Debug, Default)]
pub struct DependencyRegistry {
    entries: IndexMap<String, IndexMap<String, Rc<Dependent>>>,
}

impl DependencyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn track(&mut self, dep: &str, dependent: Rc<Dependent>) {
        let previous = self
            .entries
            .entry(dep.to_string())
            .or_default()
            .insert(dependent.address().to_string(), dependent);
        if let Some(previous) = previous {
            previous.mark_garbage();
        }
    }

    /// Dependents of `dep`, cloned out of the registry.
    pub fn get(&self, dep: &str) -> Vec<Rc<Dependent>> {
        self.entries
            .get(dep)
            .map(|map| map.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn contains(&self, dep: &str) -> bool {
        self.entries.contains_key(dep)
    }

    /// Every (path, dependents) pair in registration order.
    pub fn snapshot(&self) -> Vec<(String, Vec<Rc<Dependent>>)> {
        self.entries
            .iter()
            .map(|(dep, map)| (dep.clone(), map.values().cloned().collect()))
            .collect()
    }

    pub fn deps(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    pub fn remove(&mut self, dep: &str, address: &str) -> Option<Rc<Dependent>> {
        let map = self.entries.get_mut(dep)?;
        let removed = map.shift_remove(address);
        if map.is_empty() {
            self.entries.shift_remove(dep);
        }
        if let Some(dependent) = &removed {
            dependent.mark_garbage();
        }
        removed
    }

    /// Remove every dependent anchored at or under `prefix`.
    pub fn remove_under(&mut self, prefix: &str) -> Vec<Rc<Dependent>> {
        let mut removed = Vec::new();
        self.entries.retain(|_, map| {
            map.retain(|_, dependent| {
                let keep = !path::is_within(dependent.node_path(), prefix);
                if !keep {
                    dependent.mark_garbage();
                    removed.push(dependent.clone());
                }
                keep
            });
            !map.is_empty()
        });
        removed
    }

    /// Absorb the entries of a sub-render, tagging them with `partial`.
    pub fn merge(&mut self, other: DependencyRegistry, partial: Option<&str>) {
        for (dep, map) in other.entries {
            for (_, dependent) in map {
                if let Some(partial) = partial {
                    dependent.tag_partial(partial);
                }
                self.track(&dep, dependent);
            }
        }
    }

    /// Total number of (path, address) entries.
    pub fn len(&self) -> usize {
        self.entries.values().map(IndexMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drain everything, marking every entry garbage.
    pub fn clear(&mut self) -> Vec<Rc<Dependent>> {
        let mut removed = Vec::new();
        for (_, map) in self.entries.drain(..) {
            for (_, dependent) in map {
                dependent.mark_garbage();
                removed.push(dependent);
            }
        }
        removed
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::node::{Binding, DependentKind, Target};

    fn dependent(node: &str, address: &str) -> Rc<Dependent> {
        let binding = Binding::new(node, address, DependentKind::Element, Target::Attr);
        Rc::new(Dependent::new("state.x", binding, false, Rc::new(|_| Ok(None))))
    }

    #[test]
    fn one_entry_per_path_and_address() {
        let mut registry = DependencyRegistry::new();
        let first = dependent("0:app/0", "0:app/0.title");
        registry.track("state.x", first.clone());
        registry.track("state.x", dependent("0:app/0", "0:app/0.title"));
        registry.track("state.x", dependent("0:app/0", "0:app/0.alt"));

        assert_eq!(registry.get("state.x").len(), 2);
        assert!(first.is_garbage());
    }

    #[test]
    fn remove_under_prunes_a_subtree() {
        let mut registry = DependencyRegistry::new();
        registry.track("state.a", dependent("0:app/1", "0:app/1.a"));
        registry.track("state.a", dependent("0:app/1/0", "0:app/1/0.a"));
        registry.track("state.b", dependent("0:app/10", "0:app/10.b"));

        let removed = registry.remove_under("0:app/1");
        assert_eq!(removed.len(), 2);
        assert!(removed.iter().all(|d| d.is_garbage()));
        assert!(!registry.contains("state.a"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn merge_tags_partials() {
        let mut registry = DependencyRegistry::new();
        let mut local = DependencyRegistry::new();
        local.track("item", dependent("0:app/x0.r[0]/0", "0:app/x0.r[0]/0.item"));

        registry.merge(local, Some("0:app/x0.r[0]"));
        let entries = registry.get("item");
        assert_eq!(entries.len(), 1);
        assert!(entries[0].in_partial("0:app/x0.r"));
    }
}
