//! One layout session: layout workspace, data workspace, store and renderer tree.

use crate::binding::binding_path;
use crate::error::{LayoutError, LayoutResult};
use crate::renderer::{AreaRenderer, RenderContext, RendererRegistry};
use crate::store::ControlModelStore;
use meshsync_state::{apply_patch, resolve_path, Op, Patch};
use meshsync_workspace::{Value, Workspace};
use std::sync::Arc;

/// Renders the descriptor tree rooted at one area into a [`ControlModelStore`].
///
/// Descriptors are read from `layout` at `/areas/<id>`; bindings resolve
/// against `data`, which is usually the workspace bound to the remote.
///
/// ```
/// use meshsync_layout::{LayoutHost, RendererRegistry};
/// use meshsync_workspace::Workspace;
/// use serde_json::json;
///
/// let layout = Workspace::new("layout", json!({"areas": {"main": {
///     "component": "Label",
///     "props": {"text": {"$binding": "$.greeting"}}
/// }}}));
/// let data = Workspace::new("data", json!({"greeting": "hello"}));
/// let host = LayoutHost::new(layout, data, RendererRegistry::with_defaults(), "main");
///
/// let model = host.store().get("main").unwrap();
/// assert_eq!(model.component_type_name, "Label");
/// assert_eq!(model.props["text"], json!("hello"));
/// ```
pub struct LayoutHost {
    context: RenderContext,
    data: Workspace,
    root: AreaRenderer,
}

impl LayoutHost {
    pub fn new(
        layout: Workspace,
        data: Workspace,
        registry: RendererRegistry,
        root_area: impl Into<String>,
    ) -> Self {
        let context = RenderContext::new(layout, ControlModelStore::new(), Arc::new(registry));
        let root = AreaRenderer::bind(root_area, data.clone(), context.clone());
        Self {
            context,
            data,
            root,
        }
    }

    pub fn store(&self) -> &ControlModelStore {
        self.context.store()
    }

    pub fn layout(&self) -> &Workspace {
        self.context.layout()
    }

    pub fn data(&self) -> &Workspace {
        &self.data
    }

    pub fn root(&self) -> &AreaRenderer {
        &self.root
    }

    /// Ids of every mounted area, sorted.
    pub fn mounted_areas(&self) -> Vec<String> {
        self.context.index().areas()
    }

    /// Data context of a mounted area.
    pub fn data_context(&self, area: &str) -> Option<Workspace> {
        self.context.index().get(area).map(|m| m.data_context)
    }

    /// Write a UI edit to the value bound by `prop` of `area`.
    ///
    /// The value is written through the area's data context, so it reaches
    /// the data workspace (and anything syncing it) like any other slice
    /// edit. Returns whether anything changed.
    pub fn update_binding(&self, area: &str, prop: &str, value: Value) -> LayoutResult<bool> {
        let mounted = self
            .context
            .index()
            .get(area)
            .ok_or_else(|| LayoutError::UnknownArea(area.to_owned()))?;
        let path = mounted
            .descriptor
            .props
            .get(prop)
            .and_then(binding_path)
            .ok_or_else(|| LayoutError::NotBound {
                area: area.to_owned(),
                prop: prop.to_owned(),
            })?;

        tracing::debug!(area, prop, path = %path, "binding edited");
        Ok(mounted.data_context.update_with(|current| {
            let op = if resolve_path(&path, current).is_some() {
                Op::replace(path.clone(), value)
            } else {
                Op::add(path.clone(), value)
            };
            apply_patch(current, &Patch::new().with_op(op))
        }))
    }

    /// Unmount everything and clear the store.
    pub fn dispose(&self) {
        self.root.dispose();
    }
}
