use super::{AreaRenderer, ControlRenderer, ModelPublisher, Mount, RenderContext};
use crate::descriptor::ControlDescriptor;
use meshsync_workspace::{Subscription, Workspace};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// A container of nested areas.
///
/// Children are keyed by area id: a new id mounts a child bound to
/// `/areas/<id>`, a vanished id disposes its child, and reordering touches
/// only the published `areas` list.
pub struct StackRenderer {
    model: Arc<ModelPublisher>,
    data: Subscription,
    data_context: Workspace,
    context: RenderContext,
    children: BTreeMap<String, AreaRenderer>,
}

impl StackRenderer {
    pub fn mount(mount: Mount) -> Self {
        let model = ModelPublisher::new(&mount);
        let areas = mount.descriptor.areas.clone();
        let mut stack = Self {
            data: Subscription::empty(),
            model,
            data_context: mount.data_context,
            context: mount.context,
            children: BTreeMap::new(),
        };
        stack.sync_children(&areas);
        stack.model.set_areas(areas);
        stack.data = stack.model.watch();
        stack
    }

    /// Ids of the mounted children, sorted.
    pub fn child_areas(&self) -> Vec<String> {
        self.children.keys().cloned().collect()
    }

    fn sync_children(&mut self, areas: &[String]) {
        let wanted: BTreeSet<&str> = areas.iter().map(String::as_str).collect();

        let removed: Vec<String> = self
            .children
            .keys()
            .filter(|id| !wanted.contains(id.as_str()))
            .cloned()
            .collect();
        for id in removed {
            if let Some(child) = self.children.remove(&id) {
                child.dispose();
            }
        }

        for id in wanted {
            if !self.children.contains_key(id) {
                let child = AreaRenderer::bind(id, self.data_context.clone(), self.context.clone());
                self.children.insert(id.to_owned(), child);
            }
        }
    }
}

impl ControlRenderer for StackRenderer {
    fn update(&mut self, descriptor: &ControlDescriptor) {
        self.sync_children(&descriptor.areas);
        self.model
            .set_descriptor_with_areas(descriptor, descriptor.areas.clone());
    }

    fn dispose(&mut self) {
        self.data.dispose();
        for (_, child) in std::mem::take(&mut self.children) {
            child.dispose();
        }
        self.model.retract();
    }
}
