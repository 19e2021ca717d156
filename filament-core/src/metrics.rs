//! Engine Metrics
//!
//! Counters shared by every component of one engine. They are plain cells;
//! [`Metrics::snapshot`] copies them into a serializable struct.

use std::cell::Cell;
use std::time::Duration;

use serde::Serialize;

/// Point-in-time copy of the engine counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    pub components: usize,
    pub elements: usize,
    pub renders: usize,
    pub render_failures: usize,
    pub dependencies_tracked: usize,
    pub dependency_updates: usize,
    pub partial_renders: usize,
    pub partial_updates: usize,
    pub mesh_cleanups: usize,
    pub batches: usize,
    pub last_batch_size: usize,
    pub average_batch_size: f64,
    pub total_batched_updates: usize,
    pub last_render_micros: u64,
}

#[derive(Debug, Default)]
pub struct Metrics {
    components: Cell<usize>,
    elements: Cell<usize>,
    renders: Cell<usize>,
    render_failures: Cell<usize>,
    dependencies_tracked: Cell<usize>,
    dependency_updates: Cell<usize>,
    partial_renders: Cell<usize>,
    partial_updates: Cell<usize>,
    mesh_cleanups: Cell<usize>,
    batches: Cell<usize>,
    last_batch_size: Cell<usize>,
    total_batched_updates: Cell<usize>,
    last_render_micros: Cell<u64>,
}

fn bump(cell: &Cell<usize>) {
    cell.set(cell.get() + 1);
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn component_created(&self) {
        bump(&self.components);
    }

    pub fn element_created(&self) {
        bump(&self.elements);
    }

    pub fn render_completed(&self, elapsed: Duration) {
        bump(&self.renders);
        self.last_render_micros.set(elapsed.as_micros() as u64);
    }

    pub fn render_failed(&self) {
        bump(&self.render_failures);
    }

    pub fn dependency_tracked(&self) {
        bump(&self.dependencies_tracked);
    }

    pub fn dependency_updated(&self) {
        bump(&self.dependency_updates);
    }

    pub fn partial_rendered(&self) {
        bump(&self.partial_renders);
    }

    pub fn partial_updated(&self) {
        bump(&self.partial_updates);
    }

    pub fn mesh_cleaned(&self) {
        bump(&self.mesh_cleanups);
    }

    pub fn batch_flushed(&self, size: usize) {
        bump(&self.batches);
        self.last_batch_size.set(size);
        self.total_batched_updates
            .set(self.total_batched_updates.get() + size);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let batches = self.batches.get();
        let total = self.total_batched_updates.get();
        MetricsSnapshot {
            components: self.components.get(),
            elements: self.elements.get(),
            renders: self.renders.get(),
            render_failures: self.render_failures.get(),
            dependencies_tracked: self.dependencies_tracked.get(),
            dependency_updates: self.dependency_updates.get(),
            partial_renders: self.partial_renders.get(),
            partial_updates: self.partial_updates.get(),
            mesh_cleanups: self.mesh_cleanups.get(),
            batches,
            last_batch_size: self.last_batch_size.get(),
            average_batch_size: if batches == 0 {
                0.0
            } else {
                total as f64 / batches as f64
            },
            total_batched_updates: total,
            last_render_micros: self.last_render_micros.get(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_average_is_derived() {
        let metrics = Metrics::new();
        metrics.batch_flushed(2);
        metrics.batch_flushed(4);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.batches, 2);
        assert_eq!(snapshot.last_batch_size, 4);
        assert_eq!(snapshot.average_batch_size, 3.0);
    }

    #[test]
    fn snapshot_serializes() {
        let metrics = Metrics::new();
        metrics.component_created();
        let json = serde_json::to_value(metrics.snapshot()).unwrap();
        assert_eq!(json["components"], 1);
    }
}
