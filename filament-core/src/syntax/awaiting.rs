//! `<async await=...>` with `<loading>`, `<then args=[value]>`,
//! `<catch args=[error]>` and `<finally>` children.
//!
//! While the promise is pending the `loading` branch is shown. Settlement
//! is delivered back through the engine microtask queue and swaps in
//! `then` or `catch`, followed by `finally`. Each wait carries a token; a
//! promise replaced before it settles is ignored when it does.

use tracing::{debug, trace};

use super::{positional_args, renderer_of, Branch, Construct, ConstructSignal};
use crate::component::Component;
use crate::error::Result;
use crate::mesh::MeshRenderer;
use crate::surface::NodeId;
use crate::value::{Object, Promise, PromiseState, Value};

#[derive(Default)]
pub struct Awaiting {
    branch: Branch,
    awaited: Option<Value>,
    token: u64,
}

/// A non-promise value is treated as already fulfilled.
fn as_promise(value: &Value) -> Promise {
    match value {
        Value::Promise(promise) => promise.clone(),
        other => Promise::resolved(other.clone()),
    }
}

/// The renderers to show for a promise state.
fn branches(input: &Value, state: &PromiseState) -> Vec<(MeshRenderer, Object)> {
    let mut out = Vec::new();
    let (tag, value) = match state {
        PromiseState::Pending => {
            if let Some(loading) = renderer_of(&input.get("loading")) {
                out.push((loading, Object::new()));
            }
            return out;
        }
        PromiseState::Fulfilled(value) => ("then", value),
        PromiseState::Rejected(reason) => ("catch", reason),
    };
    if let Some(renderer) = renderer_of(&input.get(tag)) {
        let args = positional_args(&renderer, std::slice::from_ref(value));
        out.push((renderer, args));
    }
    if let Some(finally) = renderer_of(&input.get("finally")) {
        out.push((finally, Object::new()));
    }
    out
}

impl Awaiting {
    /// Start waiting on `promise` under a fresh token. Returns its current
    /// state so a settled promise renders without a round trip.
    fn wait(&mut self, cx: &Component, awaited: Value) -> PromiseState {
        self.token += 1;
        let promise = as_promise(&awaited);
        self.awaited = Some(awaited);
        let state = promise.state();
        if !matches!(state, PromiseState::Pending) {
            return state;
        }

        let token = self.token;
        let engine = cx.engine().downgrade();
        let component = cx.downgrade();
        promise.on_settle(move |state| {
            let Some(engine) = engine.upgrade() else {
                return;
            };
            let state = state.clone();
            engine.queue_microtask(move || {
                if let Some(inner) = component.upgrade() {
                    Component::from_inner(inner).signal_construct(ConstructSignal::Settled { token, state });
                }
            });
        });
        state
    }
}

impl Construct for Awaiting {
    fn self_render(&mut self, cx: &Component) -> Result<Vec<NodeId>> {
        let input = cx.input();
        let state = self.wait(cx, input.get("await"));
        self.branch.render(branches(&input, &state))
    }

    fn on_input(&mut self, cx: &Component) -> Result<()> {
        let input = cx.input();
        let awaited = input.get("await");
        if self.awaited.as_ref().is_some_and(|current| current.same_ref(&awaited)) {
            return Ok(());
        }
        debug!(component = %cx.path(), "awaiting a new promise");
        let state = self.wait(cx, awaited);
        self.branch.switch(branches(&input, &state))
    }

    fn on_signal(&mut self, cx: &Component, signal: ConstructSignal) -> Result<()> {
        let ConstructSignal::Settled { token, state } = signal else {
            return Ok(());
        };
        if token != self.token {
            trace!(component = %cx.path(), token, "ignoring a superseded promise");
            return Ok(());
        }
        self.branch.switch(branches(&cx.input(), &state))
    }

    fn on_destroy(&mut self, _cx: &Component) {
        self.branch.release();
    }
}
