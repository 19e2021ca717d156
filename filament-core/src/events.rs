//! Component event emitter.
//!
//! Components emit lifecycle events (`component:mount`, ...) and whatever
//! their handlers emit. Parents bind `on-<event>` attributes of a child
//! component tag to the child's emitter.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use indexmap::IndexMap;

use crate::value::Value;

pub type EventListener = Rc<dyn Fn(&[Value])>;

/// Handle returned by [`Emitter::on`], used to remove one listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListenerId(u64);

struct Registration {
    id: ListenerId,
    once: bool,
    listener: EventListener,
}

#[derive(Default)]
pub struct Emitter {
    listeners: RefCell<IndexMap<String, Vec<Registration>>>,
    next_id: Cell<u64>,
}

impl Emitter {
    pub fn new() -> Self {
        Self::default()
    }

    fn register(&self, event: &str, listener: EventListener, once: bool) -> ListenerId {
        let id = ListenerId(self.next_id.get());
        self.next_id.set(id.0 + 1);
        self.listeners
            .borrow_mut()
            .entry(event.to_string())
            .or_default()
            .push(Registration { id, once, listener });
        id
    }

    pub fn on(&self, event: &str, listener: EventListener) -> ListenerId {
        self.register(event, listener, false)
    }

    pub fn once(&self, event: &str, listener: EventListener) -> ListenerId {
        self.register(event, listener, true)
    }

    /// Remove one listener, or every listener of `event` when `id` is `None`.
    pub fn off(&self, event: &str, id: Option<ListenerId>) {
        let mut listeners = self.listeners.borrow_mut();
        match id {
            Some(id) => {
                if let Some(list) = listeners.get_mut(event) {
                    list.retain(|r| r.id != id);
                }
            }
            None => {
                listeners.shift_remove(event);
            }
        }
    }

    /// Call every listener of `event`. Returns how many ran.
    pub fn emit(&self, event: &str, payload: &[Value]) -> usize {
        let batch: Vec<EventListener> = {
            let mut listeners = self.listeners.borrow_mut();
            let Some(list) = listeners.get_mut(event) else {
                return 0;
            };
            let batch = list.iter().map(|r| r.listener.clone()).collect();
            list.retain(|r| !r.once);
            batch
        };
        for listener in &batch {
            listener(payload);
        }
        batch.len()
    }

    pub fn listener_count(&self, event: &str) -> usize {
        self.listeners.borrow().get(event).map_or(0, Vec::len)
    }

    pub fn clear(&self) {
        self.listeners.borrow_mut().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn once_listeners_fire_a_single_time() {
        let emitter = Emitter::new();
        let hits = Rc::new(Cell::new(0));
        let (a, b) = (hits.clone(), hits.clone());
        emitter.on("ping", Rc::new(move |_| a.set(a.get() + 1)));
        emitter.once("ping", Rc::new(move |_| b.set(b.get() + 10)));

        assert_eq!(emitter.emit("ping", &[]), 2);
        assert_eq!(emitter.emit("ping", &[]), 1);
        assert_eq!(hits.get(), 12);
    }

    #[test]
    fn off_removes_listeners() {
        let emitter = Emitter::new();
        let id = emitter.on("a", Rc::new(|_| {}));
        emitter.on("a", Rc::new(|_| {}));
        emitter.off("a", Some(id));
        assert_eq!(emitter.listener_count("a"), 1);
        emitter.off("a", None);
        assert_eq!(emitter.emit("a", &[]), 0);
    }
}
