//! Reactive Primitives
//!
//! This module implements the reactive core the engine is built on:
//! signals and effects.
//!
//! # Concepts
//!
//! ## Signals
//!
//! A Signal is a container for mutable state. When a signal's value is read
//! within a tracking context (an effect), the signal automatically registers
//! that context as a dependent. When the signal is written, all dependents
//! are notified.
//!
//! ## Effects
//!
//! An Effect is a side-effecting computation that runs whenever its
//! dependencies change. Each component owns an effect over its input, state
//! and context signals; that effect is what turns a write into a targeted
//! set of surface updates.
//!
//! # Implementation Notes
//!
//! Everything here is single-threaded (`Rc` + `RefCell`). A rendering engine
//! owns one surface and runs on one thread; the tracking stack is
//! thread-local.

mod context;
mod effect;
mod signal;
mod subscriber;

pub use context::{untrack, ReactiveContext, Source};
pub use effect::{Effect, DEFAULT_MAX_EFFECT_RERUNS};
pub use signal::Signal;
pub use subscriber::{Reactive, SubscriberId};
