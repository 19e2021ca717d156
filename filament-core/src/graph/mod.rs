//! Dependency Graph
//!
//! This module implements the fine-grained bookkeeping that lets a mutation
//! touch only the bindings that read the mutated path.
//!
//! # Overview
//!
//! - [`path`] gives every render position a hierarchical address.
//! - [`MemoStore`] holds one shared evaluation context per node.
//! - [`DependencyRegistry`] maps observable paths to [`Dependent`] entries.
//! - [`UpdateScheduler`] batches queued dependents and releases them in
//!   priority order.
//!
//! # Design Decisions
//!
//! 1. Addresses are strings. Hierarchy checks are separator-aware prefix
//!    tests, cheap enough outside the flush loop.
//!
//! 2. Each component owns its own registry, memo store and scheduler.
//!    Mesh partials rendered on behalf of a construct merge into the
//!    registry of the component whose template they come from.
//!
//! 3. Entries are reference counted. A removed entry is marked garbage so a
//!    copy already sitting in a scheduler bucket is skipped at flush time.

mod memo;
mod node;
pub mod path;
mod registry;
mod scheduler;

pub use memo::{MemoSlot, MemoStore};
pub use node::{
    Binding, Dependent, DependentKind, Target, Tier, UpdateFn, LAYOUT_AFFECTING_ATTRS,
    MAX_PRIORITY_TYPES,
};
pub use path::{PathAddressor, PathKind};
pub use registry::DependencyRegistry;
pub use scheduler::{BatchStats, QueueEntry, UpdateScheduler};
