//! `<if by=...>` with optional `<else-if by=...>` siblings and an `<else>`.

use tracing::trace;

use super::{renderer_of, Branch, Construct};
use crate::component::Component;
use crate::error::Result;
use crate::mesh::MeshRenderer;
use crate::surface::NodeId;
use crate::value::{Object, Value};

#[derive(Default)]
pub struct Conditional {
    branch: Branch,
}

/// The first branch whose condition holds.
fn select(input: &Value) -> Option<MeshRenderer> {
    if input.get("by").is_truthy() {
        return renderer_of(&input.get("renderer"));
    }
    if let Some(chain) = input.get("else-if").as_array() {
        if let Some(wire) = chain.iter().find(|wire| wire.get("by").is_truthy()) {
            return renderer_of(wire);
        }
    }
    renderer_of(&input.get("else"))
}

impl Construct for Conditional {
    fn self_render(&mut self, cx: &Component) -> Result<Vec<NodeId>> {
        let selected = select(&cx.input());
        self.branch.render(selected.into_iter().map(|r| (r, Object::new())).collect())
    }

    fn on_input(&mut self, cx: &Component) -> Result<()> {
        let selected: Vec<MeshRenderer> = select(&cx.input()).into_iter().collect();
        if self.branch.is_showing(&selected) {
            return Ok(());
        }
        trace!(component = %cx.path(), "branch switched");
        self.branch.switch(selected.into_iter().map(|r| (r, Object::new())).collect())
    }

    fn on_destroy(&mut self, _cx: &Component) {
        self.branch.release();
    }
}
