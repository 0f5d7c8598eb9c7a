use super::{AreaRenderer, ControlRenderer, ModelPublisher, Mount, RenderContext};
use crate::descriptor::ControlDescriptor;
use meshsync_state::{resolve_path, Path};
use meshsync_workspace::{Subscription, Value, Workspace};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Repeats the `view` descriptor once per element of the `data` array.
///
/// Child `i` lives in area `<area>/<i>` with a data context sliced to
/// `<data>[i]`. Children are keyed by index: growing mounts new trailing
/// children, shrinking disposes them, and a changed element only updates
/// the child's slice.
pub struct ItemTemplateRenderer {
    items: Arc<Items>,
    model: Arc<ModelPublisher>,
    data: Subscription,
    model_data: Subscription,
}

struct Items {
    area: String,
    context: RenderContext,
    data_context: Workspace,
    state: Mutex<ItemsState>,
}

struct ItemsState {
    data: Option<Path>,
    view: Option<ControlDescriptor>,
    children: Vec<ItemChild>,
}

struct ItemChild {
    renderer: AreaRenderer,
    slice: Workspace,
}

impl ItemChild {
    fn dispose(self) {
        self.renderer.dispose();
        self.slice.dispose();
    }
}

fn data_path(area: &str, descriptor: &ControlDescriptor) -> Option<Path> {
    let raw = descriptor.data.as_deref()?;
    match Path::parse(raw) {
        Ok(path) => Some(path),
        Err(e) => {
            tracing::warn!(error = %e, area, "invalid item data path");
            None
        }
    }
}

impl ItemTemplateRenderer {
    pub fn mount(mount: Mount) -> Self {
        let model = ModelPublisher::new(&mount);
        let items = Arc::new(Items {
            state: Mutex::new(ItemsState {
                data: data_path(&mount.area, &mount.descriptor),
                view: mount.descriptor.view.as_deref().cloned(),
                children: Vec::new(),
            }),
            area: mount.area,
            context: mount.context,
            data_context: mount.data_context,
        });

        let data = {
            let weak = Arc::downgrade(&items);
            let model = model.clone();
            items.data_context.subscribe(move |value| {
                if let Some(items) = weak.upgrade() {
                    model.set_areas(items.sync(value));
                }
            })
        };
        let model_data = model.watch();

        Self {
            items,
            model,
            data,
            model_data,
        }
    }

    pub fn len(&self) -> usize {
        self.items.lock().children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Items {
    fn lock(&self) -> MutexGuard<'_, ItemsState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn child_area(&self, index: usize) -> String {
        format!("{}/{}", self.area, index)
    }

    /// Match the children to the array in `data`; returns their area ids.
    fn sync(&self, data: &Value) -> Vec<String> {
        let mut state = self.lock();
        let state = &mut *state;
        let len = state
            .data
            .as_ref()
            .and_then(|path| resolve_path(path, data))
            .and_then(Value::as_array)
            .map_or(0, Vec::len);

        while state.children.len() > len {
            if let Some(child) = state.children.pop() {
                child.dispose();
            }
        }
        if let Some(path) = &state.data {
            while state.children.len() < len {
                let index = state.children.len();
                let slice = self.data_context.slice(path.clone().index(index));
                let renderer =
                    AreaRenderer::new(self.child_area(index), slice.clone(), self.context.clone());
                renderer.set_descriptor(state.view.clone());
                state.children.push(ItemChild { renderer, slice });
            }
        }

        (0..state.children.len()).map(|i| self.child_area(i)).collect()
    }

    fn clear(&self) {
        let children = std::mem::take(&mut self.lock().children);
        for child in children {
            child.dispose();
        }
    }
}

impl ControlRenderer for ItemTemplateRenderer {
    fn update(&mut self, descriptor: &ControlDescriptor) {
        let data = data_path(&self.items.area, descriptor);
        let view = descriptor.view.as_deref().cloned();

        let rebuild = {
            let mut state = self.items.lock();
            let rebuild = state.data != data;
            if rebuild {
                state.data = data;
            }
            if state.view != view {
                state.view = view;
                if !rebuild {
                    for child in &state.children {
                        child.renderer.set_descriptor(state.view.clone());
                    }
                }
            }
            rebuild
        };
        if rebuild {
            self.items.clear();
        }

        let areas = self.items.sync(&self.items.data_context.current());
        self.model.set_descriptor_with_areas(descriptor, areas);
    }

    fn dispose(&mut self) {
        self.data.dispose();
        self.model_data.dispose();
        self.items.clear();
        self.model.retract();
    }
}
