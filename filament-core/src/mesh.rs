//! Mesh Renderers
//!
//! A [`MeshRenderer`] is a deferred, re-entrant renderer for one template
//! fragment: a component body, or the contents of a declaration sub-tag such
//! as `<then>` or `<case>`. Control-flow constructs receive renderers in
//! their input and decide when, where and how often to render them.
//!
//! Every rendering is a *partial*, addressed as
//! `{fragment}.{mesh or r}{suffix}`. Loop items use the suffix `[i]`, which
//! keeps their bindings separable: a partial can be updated in place (only
//! bindings reading a changed argument re-run) or cleaned up (its bindings
//! untracked and its nodes removed) without touching its siblings.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use tracing::{debug, trace};

use crate::component::ComponentInner;
use crate::error::{Error, Result};
use crate::graph::path::{partial_path, PathAddressor};
use crate::render::RenderPass;
use crate::surface::{clear_between, insert_all_before, nodes_between, Boundaries, NodeId};
use crate::template::Fragment;
use crate::value::{Object, Scope};

/// Everything a renderer is built from.
pub(crate) struct MeshConfig {
    pub host: Weak<ComponentInner>,
    pub fragment_path: String,
    pub mesh_path: Option<String>,
    pub boundaries: Boundaries,
    pub argv: Vec<String>,
    pub contents: Fragment,
    pub scope: Scope,
}

struct MeshInner {
    host: Weak<ComponentInner>,
    fragment_path: String,
    mesh_path: Option<String>,
    boundaries: Boundaries,
    argv: Vec<String>,
    contents: Fragment,
    /// Variables visible where the fragment sits. Kept current as loop
    /// items, macro arguments and `let` values change.
    scope: RefCell<Scope>,
    updating: Cell<bool>,
}

/// Renders one fragment on demand, any number of times.
#[derive(Clone)]
pub struct MeshRenderer {
    inner: Rc<MeshInner>,
}

impl MeshRenderer {
    pub(crate) fn new(config: MeshConfig) -> Self {
        Self {
            inner: Rc::new(MeshInner {
                host: config.host,
                fragment_path: config.fragment_path,
                mesh_path: config.mesh_path,
                boundaries: config.boundaries,
                argv: config.argv,
                contents: config.contents,
                scope: RefCell::new(config.scope),
                updating: Cell::new(false),
            }),
        }
    }

    /// Declared argument names, in order.
    pub fn argv(&self) -> &[String] {
        &self.inner.argv
    }

    /// Address of the fragment this renderer belongs to.
    pub fn path(&self) -> &str {
        &self.inner.fragment_path
    }

    /// Markers delimiting the owning region.
    pub fn boundaries(&self) -> Boundaries {
        self.inner.boundaries
    }

    pub fn partial_path(&self, suffix: Option<&str>) -> String {
        partial_path(&self.inner.fragment_path, self.inner.mesh_path.as_deref(), suffix)
    }

    pub fn ptr_eq(&self, other: &MeshRenderer) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// The scope partials are rendered against, before arguments.
    pub fn scope(&self) -> Scope {
        self.inner.scope.borrow().clone()
    }

    pub(crate) fn refresh_scope(&self, f: impl FnOnce(&mut Scope)) {
        f(&mut self.inner.scope.borrow_mut());
    }

    fn host(&self) -> Result<Rc<ComponentInner>> {
        self.inner
            .host
            .upgrade()
            .ok_or_else(|| Error::Detached(self.inner.fragment_path.clone()))
    }

    /// Render the fragment with `args` bound to the declared argument
    /// names. `scope` adds variables on top of the captured scope.
    ///
    /// The returned nodes are not inserted anywhere; see [`fill`](Self::fill).
    pub fn mesh(&self, args: &Object, scope: Option<&Scope>, suffix: Option<&str>) -> Result<Vec<NodeId>> {
        let host = self.host()?;
        let partial = self.partial_path(suffix);
        let mut local = self.inner.scope.borrow().clone();
        if let Some(extra) = scope {
            local.extend(extra);
        }
        for name in &self.inner.argv {
            local.bind_arg(name, args.get(name).cloned().unwrap_or_default());
        }

        let mut pass = RenderPass::new(host.clone());
        let mut addr = PathAddressor::new(partial.clone());
        let nodes = pass.render_fragment(&self.inner.contents, &mut addr, &mut local, false)?;
        let deps = pass.finish();
        host.fgud.borrow_mut().merge(deps, Some(&partial));
        host.engine.metrics().partial_rendered();
        trace!(partial = %partial, nodes = nodes.len(), "partial rendered");
        Ok(nodes)
    }

    /// Re-run the bindings of a rendered partial that read one of the
    /// `changed` arguments.
    ///
    /// Re-entrant calls while an update is running are ignored.
    pub fn update(&self, changed: &[String], args: &Object, scope: Option<&Scope>, suffix: Option<&str>) -> Result<()> {
        if self.inner.updating.get() {
            return Ok(());
        }
        let host = self.host()?;
        self.inner.updating.set(true);

        let partial = self.partial_path(suffix);
        let arguments = scope.and_then(Scope::arguments).cloned();

        // Renderers handed to children of the partial captured the old
        // values; branches they mesh later must see the new ones.
        let bound: Vec<String> = self.inner.argv.iter().filter(|name| args.contains_key(*name)).cloned().collect();
        host.refresh_renderers_under(&partial, &bound, |captured, names| {
            for name in names {
                if let Some(value) = args.get(*name) {
                    captured.bind_arg(name, value.clone());
                }
            }
            if let Some(arguments) = &arguments {
                captured.set_arguments((**arguments).clone());
            }
        });

        let snapshot = host.fgud.borrow().snapshot();
        let mut queued = 0;
        for (dep, dependents) in snapshot {
            let root = dep.split(['.', '[']).next().unwrap_or_default();
            if !changed.iter().any(|name| name == root) {
                continue;
            }
            for dependent in dependents {
                if !dependent.in_partial(&partial) {
                    continue;
                }
                host.memory.borrow_mut().patch(dependent.node_path(), |memo| {
                    for name in &self.inner.argv {
                        if let Some(value) = args.get(name) {
                            memo.bind_arg(name, value.clone());
                        }
                    }
                    if let Some(arguments) = &arguments {
                        memo.set_arguments((**arguments).clone());
                    }
                });
                host.queue_update(&dep, dependent);
                queued += 1;
            }
        }

        self.inner.updating.set(false);
        host.engine.metrics().partial_updated();
        trace!(partial = %partial, queued, "partial updated");
        Ok(())
    }

    /// Insert rendered nodes before the end marker of `boundaries`, or of
    /// the owning region when `None`.
    pub fn fill(&self, nodes: &[NodeId], boundaries: Option<Boundaries>) {
        let Some(host) = self.inner.host.upgrade() else {
            return;
        };
        let anchor = boundaries.unwrap_or(self.inner.boundaries).end;
        if !insert_all_before(host.surface().as_ref(), nodes, anchor) {
            debug!(path = %self.inner.fragment_path, "region is not mounted; nothing filled");
        }
    }

    /// Tear down a rendered partial.
    ///
    /// With a suffix, the item's own markers go too; without one the whole
    /// region between `boundaries` (or the owning markers) is cleared.
    pub fn cleanup(&self, boundaries: Option<Boundaries>, suffix: Option<&str>) {
        let Some(host) = self.inner.host.upgrade() else {
            return;
        };
        let partial = self.partial_path(suffix);
        host.untrack_under(&partial);

        let surface = host.surface();
        match (suffix, boundaries) {
            (Some(_), Some(item)) => {
                for node in nodes_between(surface.as_ref(), item) {
                    surface.remove(node);
                }
                surface.remove(item.start);
                surface.remove(item.end);
            }
            (_, region) => clear_between(surface.as_ref(), region.unwrap_or(self.inner.boundaries)),
        }
        host.engine.metrics().mesh_cleaned();
        trace!(partial = %partial, "partial cleaned up");
    }

    /// Forget every partial of this renderer without touching the surface.
    pub(crate) fn release(&self) {
        if let Some(host) = self.inner.host.upgrade() {
            host.untrack_under(&self.partial_path(None));
        }
    }

    /// Wrap rendered nodes in their own item markers.
    pub fn demarcate(&self, nodes: Vec<NodeId>, suffix: Option<&str>) -> Result<(Boundaries, Vec<NodeId>)> {
        let host = self.host()?;
        let surface = host.surface();
        let partial = self.partial_path(suffix);
        let start = surface.create_comment(&format!("s:{partial}"));
        let end = surface.create_comment(&format!("e:{partial}"));
        let mut out = Vec::with_capacity(nodes.len() + 2);
        out.push(start);
        out.extend(nodes);
        out.push(end);
        Ok((Boundaries { start, end }, out))
    }
}

impl fmt::Debug for MeshRenderer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MeshRenderer")
            .field("partial", &self.partial_path(None))
            .field("argv", &self.inner.argv)
            .finish()
    }
}
