use super::{ControlRenderer, Mount};
use crate::binding::resolve_props;
use crate::descriptor::ControlDescriptor;
use crate::store::{ControlModel, ControlModelStore};
use meshsync_workspace::{Subscription, Value, WeakWorkspace};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Keeps the control model of one area in the store.
///
/// The model is recomputed whenever the data context emits or the
/// descriptor changes; the store drops equal republishes.
pub struct ModelPublisher {
    area: String,
    store: ControlModelStore,
    data_context: WeakWorkspace,
    state: Mutex<PublisherState>,
}

struct PublisherState {
    descriptor: ControlDescriptor,
    /// Child area ids, published as the `areas` prop of containers.
    areas: Option<Vec<String>>,
}

impl ModelPublisher {
    pub fn new(mount: &Mount) -> Arc<Self> {
        Arc::new(Self {
            area: mount.area.clone(),
            store: mount.context.store().clone(),
            data_context: mount.data_context.downgrade(),
            state: Mutex::new(PublisherState {
                descriptor: mount.descriptor.clone(),
                areas: None,
            }),
        })
    }

    /// Publish now and on every data-context emission.
    pub fn watch(self: &Arc<Self>) -> Subscription {
        let Some(data_context) = self.data_context.upgrade() else {
            return Subscription::empty();
        };
        let publisher = self.clone();
        data_context.subscribe(move |data| publisher.publish_with(data))
    }

    pub fn set_descriptor(&self, descriptor: &ControlDescriptor) {
        self.lock().descriptor = descriptor.clone();
        self.publish();
    }

    /// Replace descriptor and child ids together, publishing once.
    pub fn set_descriptor_with_areas(&self, descriptor: &ControlDescriptor, areas: Vec<String>) {
        {
            let mut state = self.lock();
            state.descriptor = descriptor.clone();
            state.areas = Some(areas);
        }
        self.publish();
    }

    pub fn set_areas(&self, areas: Vec<String>) {
        self.lock().areas = Some(areas);
        self.publish();
    }

    /// Remove the model from the store.
    pub fn retract(&self) {
        self.store.remove(&self.area);
    }

    fn publish(&self) {
        if let Some(data_context) = self.data_context.upgrade() {
            self.publish_with(&data_context.current());
        }
    }

    fn publish_with(&self, data: &Value) {
        let model = {
            let state = self.lock();
            let mut props = resolve_props(&state.descriptor.props, data);
            if let Some(areas) = &state.areas {
                props.insert(
                    "areas".into(),
                    Value::Array(areas.iter().cloned().map(Value::String).collect()),
                );
            }
            ControlModel::new(state.descriptor.component.clone(), props)
        };
        self.store.publish(&self.area, &model);
    }

    fn lock(&self) -> MutexGuard<'_, PublisherState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A leaf control: publishes its model and nothing else.
pub struct GenericRenderer {
    model: Arc<ModelPublisher>,
    data: Subscription,
}

impl GenericRenderer {
    pub fn mount(mount: Mount) -> Self {
        let model = ModelPublisher::new(&mount);
        let data = model.watch();
        Self { model, data }
    }
}

impl ControlRenderer for GenericRenderer {
    fn update(&mut self, descriptor: &ControlDescriptor) {
        self.model.set_descriptor(descriptor);
    }

    fn dispose(&mut self) {
        self.data.dispose();
        self.model.retract();
    }
}
