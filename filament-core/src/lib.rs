//! Filament Core
//!
//! This crate provides the rendering engine of the Filament UI framework.
//! It implements:
//!
//! - Reactive primitives (signals, effects) driving each component
//! - A fine-grained dependency registry mapping observable paths to the
//!   exact output nodes that read them
//! - A priority-ordered, deduplicated update scheduler
//! - Control-flow constructs (`if`, `switch`, `for`, `async`, `router`)
//!   rendered through mesh partials
//! - Macros, dynamic tags and nested components with declaration tags
//!
//! Output goes to a [`Surface`], a small tree abstraction. [`MemorySurface`]
//! is an in-memory implementation used by tests and server-side rendering.
//!
//! # Architecture
//!
//! - `reactive`: signals, effects and dependency tracking
//! - `graph`: dependency registry, memo store, paths and the scheduler
//! - `expr`: the template expression language
//! - `template`: template definitions and builders
//! - `render`: the render pass turning fragments into surface nodes
//! - `mesh`: re-renderable partials handed to constructs
//! - `syntax`: the built-in constructs
//! - `component`: the component host
//! - `engine`: the catalog, shared context and microtask queue
//!
//! # Example
//!
//! ```rust,ignore
//! use std::rc::Rc;
//! use filament_core::{el, Engine, MemorySurface, Surface, Template};
//! use serde_json::json;
//!
//! let surface = Rc::new(MemorySurface::new());
//! let engine = Engine::new(surface.clone());
//!
//! engine.register(
//!     "greeting",
//!     Template::new([el("p").text("Hello {input.name}")]),
//! )?;
//!
//! let greeting = engine.mount("greeting", json!({"name": "Ada"}), surface.root())?;
//! assert_eq!(surface.html(), "<p>Hello Ada</p>");
//!
//! greeting.set_input(json!({"name": "Grace"}));
//! engine.run_until_idle();
//! assert_eq!(surface.html(), "<p>Hello Grace</p>");
//! ```

pub mod reactive;
pub mod graph;
pub mod value;
pub mod expr;
pub mod template;
pub mod surface;
pub(crate) mod render;
pub mod mesh;
pub mod syntax;
pub mod component;
pub mod engine;
pub mod i18n;
pub mod events;
pub mod metrics;
pub mod config;
pub mod error;

pub use component::{Component, ComponentStats};
pub use config::EngineConfig;
pub use engine::{Engine, WeakEngine};
pub use error::{Error, EvalError, Result};
pub use events::ListenerId;
pub use graph::BatchStats;
pub use i18n::{Dictionary, IdentityTranslator, Translator};
pub use mesh::MeshRenderer;
pub use metrics::MetricsSnapshot;
pub use surface::{Boundaries, MemorySurface, NodeId, Surface};
pub use syntax::{Construct, ConstructSignal};
pub use template::{dynamic, el, text, Compiler, Declaration, Handler, Lifecycle, TagSpec, Template};
pub use value::{Object, Promise, PromiseState, Scope, Value};
