//! `<switch by=...>` over child `<case is=...>` tags and an optional
//! `<default>`.

use super::{renderer_of, Branch, Construct};
use crate::component::Component;
use crate::error::Result;
use crate::mesh::MeshRenderer;
use crate::surface::NodeId;
use crate::value::{Object, Value};

#[derive(Default)]
pub struct Switch {
    branch: Branch,
}

/// Case values compare by value, falling back to their display text so
/// that `is="1"` matches the number 1. An array matches any of its items.
fn matches(by: &Value, is: &Value) -> bool {
    match is {
        Value::Array(options) => options.iter().any(|option| matches(by, option)),
        is => by == is || (!by.is_undefined() && by.to_display() == is.to_display()),
    }
}

fn select(input: &Value) -> Option<MeshRenderer> {
    let by = input.get("by");
    if let Some(cases) = input.get("case").as_array() {
        if let Some(wire) = cases.iter().find(|wire| matches(&by, &wire.get("is"))) {
            return renderer_of(wire);
        }
    }
    renderer_of(&input.get("default"))
}

impl Construct for Switch {
    fn self_render(&mut self, cx: &Component) -> Result<Vec<NodeId>> {
        let selected = select(&cx.input());
        self.branch.render(selected.into_iter().map(|r| (r, Object::new())).collect())
    }

    fn on_input(&mut self, cx: &Component) -> Result<()> {
        let selected: Vec<MeshRenderer> = select(&cx.input()).into_iter().collect();
        if self.branch.is_showing(&selected) {
            return Ok(());
        }
        self.branch.switch(selected.into_iter().map(|r| (r, Object::new())).collect())
    }

    fn on_destroy(&mut self, _cx: &Component) {
        self.branch.release();
    }
}
