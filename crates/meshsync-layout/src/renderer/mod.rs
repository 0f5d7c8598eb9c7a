//! Renderer tree.
//!
//! Every mounted area is an [`AreaRenderer`]: it watches one descriptor,
//! decides between updating in place and remounting by [`MountKey`], and
//! owns the data-context slice of the control it mounted. The renderer for
//! a given kind comes from the [`RendererRegistry`].
//!
//! [`MountKey`]: crate::MountKey

mod area;
mod generic;
mod item_template;
mod registry;
mod stack;

pub use area::AreaRenderer;
pub use generic::{GenericRenderer, ModelPublisher};
pub use item_template::ItemTemplateRenderer;
pub use registry::{RendererFactory, RendererRegistry};
pub use stack::StackRenderer;

use crate::descriptor::ControlDescriptor;
use crate::store::ControlModelStore;
use meshsync_workspace::Workspace;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// A mounted control.
///
/// `update` is only called with descriptors whose mount key equals the one
/// the renderer was created with. `dispose` is called once, before any
/// replacement renderer for the same area is created, and must release
/// children, subscriptions and published models.
pub trait ControlRenderer: Send {
    fn update(&mut self, descriptor: &ControlDescriptor);
    fn dispose(&mut self);
}

/// Everything a factory needs to mount one control.
pub struct Mount {
    pub area: String,
    pub descriptor: ControlDescriptor,
    /// The nearest data context: a slice owned by the area, or inherited.
    pub data_context: Workspace,
    pub context: RenderContext,
}

/// Shared services of one renderer tree.
#[derive(Clone)]
pub struct RenderContext {
    layout: Workspace,
    store: ControlModelStore,
    registry: Arc<RendererRegistry>,
    index: Arc<AreaIndex>,
}

impl RenderContext {
    pub fn new(layout: Workspace, store: ControlModelStore, registry: Arc<RendererRegistry>) -> Self {
        Self {
            layout,
            store,
            registry,
            index: Arc::new(AreaIndex::default()),
        }
    }

    /// Workspace holding the descriptors, under `/areas/<id>`.
    pub fn layout(&self) -> &Workspace {
        &self.layout
    }

    pub fn store(&self) -> &ControlModelStore {
        &self.store
    }

    pub fn registry(&self) -> &RendererRegistry {
        &self.registry
    }

    pub(crate) fn index(&self) -> &AreaIndex {
        &self.index
    }
}

/// Descriptor and data context of every mounted area.
#[derive(Default)]
pub(crate) struct AreaIndex {
    areas: Mutex<HashMap<String, MountedArea>>,
}

#[derive(Clone)]
pub(crate) struct MountedArea {
    pub(crate) descriptor: ControlDescriptor,
    pub(crate) data_context: Workspace,
}

impl AreaIndex {
    fn lock(&self) -> MutexGuard<'_, HashMap<String, MountedArea>> {
        self.areas.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn record(&self, area: &str, descriptor: ControlDescriptor, data_context: Workspace) {
        self.lock().insert(
            area.to_owned(),
            MountedArea {
                descriptor,
                data_context,
            },
        );
    }

    pub(crate) fn set_descriptor(&self, area: &str, descriptor: ControlDescriptor) {
        if let Some(mounted) = self.lock().get_mut(area) {
            mounted.descriptor = descriptor;
        }
    }

    pub(crate) fn forget(&self, area: &str) {
        self.lock().remove(area);
    }

    pub(crate) fn get(&self, area: &str) -> Option<MountedArea> {
        self.lock().get(area).cloned()
    }

    pub(crate) fn areas(&self) -> Vec<String> {
        let mut areas: Vec<String> = self.lock().keys().cloned().collect();
        areas.sort();
        areas
    }
}
