//! Control-Flow Constructs
//!
//! `if`, `switch`, `for`, `async` and `router` are ordinary catalog
//! templates whose rendering is taken over by a [`Construct`]. The render
//! pass hands them their sub-tags as wire objects (`{renderer, ...attrs}`),
//! and the construct decides which renderers to mesh, when to fill their
//! output in, and when to clean it up.
//!
//! Constructs keep their state between input changes; the owning component
//! calls [`Construct::on_input`] after each effective input write and
//! [`Construct::on_signal`] for deferred events (promise settlement,
//! navigation).

mod awaiting;
mod conditional;
mod looping;
mod router;
mod switch;

pub use awaiting::Awaiting;
pub use conditional::Conditional;
pub use looping::Loop;
pub use router::Router;
pub use switch::Switch;

use crate::component::Component;
use crate::error::Result;
use crate::mesh::MeshRenderer;
use crate::surface::NodeId;
use crate::template::{Declaration, TagSpec, Template};
use crate::value::{Object, PromiseState, Value};

/// Deferred events delivered to a construct.
#[derive(Debug, Clone)]
pub enum ConstructSignal {
    /// A promise the construct waits on settled. `token` identifies which
    /// wait it belongs to; stale tokens are ignored.
    Settled { token: u64, state: PromiseState },
    Navigate(String),
}

/// A self-rendering component.
pub trait Construct {
    /// First render. The returned nodes are placed by the caller.
    fn self_render(&mut self, cx: &Component) -> Result<Vec<NodeId>>;

    /// The input changed after the first render.
    fn on_input(&mut self, cx: &Component) -> Result<()>;

    fn on_signal(&mut self, _cx: &Component, _signal: ConstructSignal) -> Result<()> {
        Ok(())
    }

    fn on_destroy(&mut self, _cx: &Component) {}
}

/// The renderer of a wire object, or the value itself if it is one.
pub(crate) fn renderer_of(wire: &Value) -> Option<MeshRenderer> {
    match wire {
        Value::Renderer(renderer) => Some(renderer.clone()),
        other => other.get("renderer").as_renderer().cloned(),
    }
}

/// The renderers a branching construct currently shows.
#[derive(Default)]
pub(crate) struct Branch {
    shown: Vec<MeshRenderer>,
}

impl Branch {
    pub(crate) fn is_showing(&self, renderers: &[MeshRenderer]) -> bool {
        self.shown.len() == renderers.len() && self.shown.iter().zip(renderers).all(|(a, b)| a.ptr_eq(b))
    }

    /// Mesh `renderers` in order and remember them.
    pub(crate) fn render(&mut self, renderers: Vec<(MeshRenderer, Object)>) -> Result<Vec<NodeId>> {
        let mut out = Vec::new();
        self.shown.clear();
        for (renderer, args) in renderers {
            out.extend(renderer.mesh(&args, None, None)?);
            self.shown.push(renderer);
        }
        Ok(out)
    }

    /// Clean up what is shown, then mesh and fill the replacement.
    pub(crate) fn switch(&mut self, renderers: Vec<(MeshRenderer, Object)>) -> Result<()> {
        self.clear();
        let Some(anchor) = renderers.first().map(|(r, _)| r.clone()) else {
            return Ok(());
        };
        let nodes = self.render(renderers)?;
        anchor.fill(&nodes, None);
        Ok(())
    }

    pub(crate) fn clear(&mut self) {
        for renderer in self.shown.drain(..) {
            renderer.cleanup(None, None);
        }
    }

    /// Forget the bindings of what is shown, leaving the surface alone.
    pub(crate) fn release(&mut self) {
        for renderer in self.shown.drain(..) {
            renderer.release();
        }
    }
}

/// Arguments for a renderer: each declared name bound to the matching value.
pub(crate) fn positional_args(renderer: &MeshRenderer, values: &[Value]) -> Object {
    renderer
        .argv()
        .iter()
        .zip(values.iter().cloned().chain(std::iter::repeat(Value::Undefined)))
        .map(|(name, value)| (name.clone(), value))
        .collect()
}

/// The built-in construct templates, by tag name.
pub fn builtins() -> Vec<(&'static str, Template)> {
    vec![
        (
            "if",
            Template::construct(
                Declaration::syntax()
                    .tag("else-if", TagSpec::nexted().many().optional())
                    .tag("else", TagSpec::nexted().optional()),
                || Box::<Conditional>::default(),
            ),
        ),
        (
            "switch",
            Template::construct(
                Declaration::syntax()
                    .tag("case", TagSpec::child().many().optional())
                    .tag("default", TagSpec::child().optional()),
                || Box::<Switch>::default(),
            ),
        ),
        (
            "for",
            Template::construct(Declaration::syntax(), || Box::<Loop>::default()),
        ),
        (
            "async",
            Template::construct(
                Declaration::syntax()
                    .tag("loading", TagSpec::child().optional())
                    .tag("then", TagSpec::child())
                    .tag("catch", TagSpec::child().optional())
                    .tag("finally", TagSpec::child().optional()),
                || Box::<Awaiting>::default(),
            ),
        ),
        (
            "router",
            Template::construct(Declaration::syntax(), || Box::<Router>::default()),
        ),
    ]
}
