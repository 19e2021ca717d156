//! Update Scheduler
//!
//! The scheduler batches dependent updates triggered by a mutation and
//! hands them back in priority order.
//!
//! # Algorithm
//!
//! 1. `queue` drops the entry into a bucket keyed by its priority. Entries
//!    are keyed by dependent address inside a bucket, so a dependent
//!    reached through several changed paths runs once.
//! 2. The first `queue` of a quiet scheduler reports that a flush must be
//!    scheduled; the caller defers it to the next microtask.
//! 3. `begin_flush` snapshots and clears the buckets, lowest priority
//!    number (most urgent) first.
//! 4. Entries queued while the flush runs land in fresh buckets.
//!    `end_flush` reports whether another flush is needed, so cascades
//!    never recurse synchronously.
//!
//! A closed scheduler (its component was destroyed) accepts nothing.

use std::collections::BTreeMap;
use std::rc::Rc;

use indexmap::IndexMap;
use serde::Serialize;

use super::node::Dependent;

/// One pending update.
#[derive(Debug, Clone)]
pub struct QueueEntry {
    /// The observable path whose change queued the entry.
    pub dep: String,
    pub dependent: Rc<Dependent>,
}

impl QueueEntry {
    pub fn new(dep: &str, dependent: Rc<Dependent>) -> Self {
        Self {
            dep: dep.to_string(),
            dependent,
        }
    }
}

/// Batch statistics of one scheduler.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchStats {
    pub batches: usize,
    pub total_updates: usize,
    pub last_batch_size: usize,
    pub average_batch_size: f64,
    /// Dependent addresses of the last flush, in execution order.
    pub last_batch: Vec<String>,
}

#[derive(Default)]
pub struct UpdateScheduler {
    buckets: BTreeMap<u32, IndexMap<String, QueueEntry>>,
    scheduled: bool,
    flushing: bool,
    closed: bool,
    stats: BatchStats,
}

impl UpdateScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an entry. Returns `true` when the caller must schedule a flush.
    pub fn queue(&mut self, entry: QueueEntry) -> bool {
        if self.closed {
            return false;
        }
        let priority = entry.dependent.priority();
        let address = entry.dependent.address().to_string();
        self.buckets
            .entry(priority)
            .or_default()
            .entry(address)
            .or_insert(entry);

        if self.scheduled || self.flushing {
            return false;
        }
        self.scheduled = true;
        true
    }

    /// Take the pending batch in priority order.
    pub fn begin_flush(&mut self) -> Vec<QueueEntry> {
        self.scheduled = false;
        self.flushing = true;

        let batch: Vec<QueueEntry> = std::mem::take(&mut self.buckets)
            .into_values()
            .flat_map(IndexMap::into_values)
            .collect();

        self.stats.batches += 1;
        self.stats.total_updates += batch.len();
        self.stats.last_batch_size = batch.len();
        self.stats.average_batch_size =
            self.stats.total_updates as f64 / self.stats.batches as f64;
        self.stats.last_batch = batch
            .iter()
            .map(|entry| entry.dependent.address().to_string())
            .collect();
        batch
    }

    /// Finish a flush. Returns `true` when more work arrived meanwhile.
    pub fn end_flush(&mut self) -> bool {
        self.flushing = false;
        if self.closed || self.buckets.is_empty() {
            return false;
        }
        self.scheduled = true;
        true
    }

    pub fn pending(&self) -> usize {
        self.buckets.values().map(IndexMap::len).sum()
    }

    pub fn is_scheduled(&self) -> bool {
        self.scheduled
    }

    /// Drop everything and refuse further entries.
    pub fn close(&mut self) {
        self.closed = true;
        self.scheduled = false;
        self.buckets.clear();
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn stats(&self) -> &BatchStats {
        &self.stats
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::node::{Binding, DependentKind, Target};

    fn entry(node: &str, address: &str, kind: DependentKind, target: Target, attr: &str) -> QueueEntry {
        let binding = Binding::new(node, address, kind, target).attr(attr);
        let dependent = Dependent::new("state.w", binding, false, Rc::new(|_| Ok(None)));
        QueueEntry::new("state.w", Rc::new(dependent))
    }

    #[test]
    fn first_queue_requests_a_flush() {
        let mut scheduler = UpdateScheduler::new();
        assert!(scheduler.queue(entry("0:a/0", "0:a/0.title", DependentKind::Element, Target::Attr, "title")));
        assert!(!scheduler.queue(entry("0:a/1", "0:a/1.title", DependentKind::Element, Target::Attr, "title")));
        assert_eq!(scheduler.pending(), 2);
    }

    #[test]
    fn duplicate_addresses_collapse() {
        let mut scheduler = UpdateScheduler::new();
        scheduler.queue(entry("0:a/0", "0:a/0.title", DependentKind::Element, Target::Attr, "title"));
        scheduler.queue(entry("0:a/0", "0:a/0.title", DependentKind::Element, Target::Attr, "title"));
        assert_eq!(scheduler.begin_flush().len(), 1);
    }

    #[test]
    fn flush_runs_layout_then_text_then_events() {
        let mut scheduler = UpdateScheduler::new();
        scheduler.queue(entry("0:a/0/2", "0:a/0/2.click", DependentKind::Event, Target::Handler, "click"));
        scheduler.queue(entry("0:a/0/1", "0:a/0/1.state.w", DependentKind::Text, Target::Value, ""));
        scheduler.queue(entry("0:a/0", "0:a/0.width", DependentKind::Element, Target::Attr, "width"));
        scheduler.queue(entry("0:a/0/0/0", "0:a/0/0/0.title", DependentKind::Element, Target::Attr, "title"));

        let order: Vec<String> = scheduler
            .begin_flush()
            .into_iter()
            .map(|e| e.dependent.address().to_string())
            .collect();
        assert_eq!(
            order,
            ["0:a/0.width", "0:a/0/1.state.w", "0:a/0/2.click", "0:a/0/0/0.title"]
        );
        assert!(!scheduler.end_flush());
    }

    #[test]
    fn work_queued_during_a_flush_needs_another_flush() {
        let mut scheduler = UpdateScheduler::new();
        scheduler.queue(entry("0:a/0", "0:a/0.title", DependentKind::Element, Target::Attr, "title"));
        let _ = scheduler.begin_flush();
        assert!(!scheduler.queue(entry("0:a/1", "0:a/1.title", DependentKind::Element, Target::Attr, "title")));
        assert!(scheduler.end_flush());
        assert_eq!(scheduler.stats().batches, 1);
    }

    #[test]
    fn closed_scheduler_ignores_entries() {
        let mut scheduler = UpdateScheduler::new();
        scheduler.close();
        assert!(!scheduler.queue(entry("0:a/0", "0:a/0.title", DependentKind::Element, Target::Attr, "title")));
        assert_eq!(scheduler.pending(), 0);
    }
}
