//! Memo Store
//!
//! Every dependent anchored at one node shares a single evaluation context,
//! the node's memo slot. A slot remembers which dependency addresses track
//! it; it is created by the first bind and deleted when the last tracker
//! unbinds.

use indexmap::IndexMap;

use crate::value::Scope;

/// Shared evaluation context of one node.
#[derive(Debug, Clone, Default)]
pub struct MemoSlot {
    /// Dependency address → scheduling priority.
    tracks: IndexMap<String, u32>,
    memo: Scope,
}

impl MemoSlot {
    pub fn memo(&self) -> &Scope {
        &self.memo
    }

    pub fn tracker_count(&self) -> usize {
        self.tracks.len()
    }

    pub fn tracks(&self, dep_path: &str) -> bool {
        self.tracks.contains_key(dep_path)
    }
}

#[derive(Debug, Default)]
pub struct MemoStore {
    slots: IndexMap<String, MemoSlot>,
}

impl MemoStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tracker on the node's slot. The memo is last-write-wins.
    pub fn bind(&mut self, node_path: &str, dep_path: &str, priority: u32, memo: &Scope) {
        let slot = self.slots.entry(node_path.to_string()).or_default();
        slot.tracks.insert(dep_path.to_string(), priority);
        slot.memo = memo.clone();
    }

    /// Drop a tracker; the slot goes with its last tracker.
    pub fn unbind(&mut self, node_path: &str, dep_path: &str) {
        let Some(slot) = self.slots.get_mut(node_path) else {
            return;
        };
        if slot.tracks.shift_remove(dep_path).is_none() {
            return;
        }
        if slot.tracks.is_empty() {
            self.slots.shift_remove(node_path);
        }
    }

    pub fn slot(&self, node_path: &str) -> Option<&MemoSlot> {
        self.slots.get(node_path)
    }

    pub fn memo(&self, node_path: &str) -> Option<&Scope> {
        self.slots.get(node_path).map(|slot| &slot.memo)
    }

    /// Replace the memo of an existing slot.
    pub fn set_memo(&mut self, node_path: &str, memo: Scope) -> bool {
        match self.slots.get_mut(node_path) {
            Some(slot) => {
                slot.memo = memo;
                true
            }
            None => false,
        }
    }

    /// Mutate the memo of an existing slot in place.
    pub fn patch(&mut self, node_path: &str, f: impl FnOnce(&mut Scope)) -> bool {
        match self.slots.get_mut(node_path) {
            Some(slot) => {
                f(&mut slot.memo);
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn clear(&mut self) {
        self.slots.clear();
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{Value, VarKind};

    fn scope_with(name: &str, value: i32) -> Scope {
        let mut scope = Scope::new();
        scope.declare(name, Value::from(value), VarKind::Let).unwrap();
        scope
    }

    #[test]
    fn trackers_share_one_slot() {
        let mut store = MemoStore::new();
        store.bind("0:app/1", "0:app/1.width", 100, &scope_with("a", 1));
        store.bind("0:app/1", "0:app/1.title", 102, &scope_with("a", 2));

        assert_eq!(store.len(), 1);
        let slot = store.slot("0:app/1").unwrap();
        assert_eq!(slot.tracker_count(), 2);
        assert_eq!(slot.memo().value("a"), Some(&Value::from(2)));
    }

    #[test]
    fn slot_is_deleted_with_its_last_tracker() {
        let mut store = MemoStore::new();
        store.bind("n", "n.a", 2, &Scope::new());
        store.bind("n", "n.b", 2, &Scope::new());

        store.unbind("n", "n.a");
        assert!(store.memo("n").is_some());
        store.unbind("n", "n.a");
        assert!(store.memo("n").is_some());
        store.unbind("n", "n.b");
        assert!(store.is_empty());
    }
}
