use super::{ControlRenderer, Mount, RenderContext};
use crate::descriptor::{ControlDescriptor, MountKey};
use meshsync_state::{Path, Reference};
use meshsync_workspace::{Subscription, Value, Workspace};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// The renderer node of one area.
///
/// Transitions: an equal mount key updates the mounted renderer in place;
/// a different key, or no descriptor, disposes the mounted renderer (and
/// the data-context slice it owns) before anything new is mounted.
///
/// Dropping the node disposes it.
pub struct AreaRenderer {
    inner: Arc<AreaInner>,
}

struct AreaInner {
    area: String,
    parent_context: Workspace,
    context: RenderContext,
    state: Mutex<AreaState>,
}

#[derive(Default)]
struct AreaState {
    mounted: Option<Mounted>,
    source: Option<(Workspace, Subscription)>,
    disposed: bool,
}

struct Mounted {
    key: MountKey,
    renderer: Box<dyn ControlRenderer>,
    data_context: Workspace,
    owns_context: bool,
}

/// Where the layout keeps the descriptor of `area`.
pub(crate) fn area_reference(area: &str) -> Reference {
    Reference::path(Path::root().key("areas").key(area))
}

impl AreaRenderer {
    /// An unmounted node fed through [`set_descriptor`](Self::set_descriptor).
    pub fn new(area: impl Into<String>, parent_context: Workspace, context: RenderContext) -> Self {
        Self {
            inner: Arc::new(AreaInner {
                area: area.into(),
                parent_context,
                context,
                state: Mutex::new(AreaState::default()),
            }),
        }
    }

    /// A node following the descriptor stored in the layout at
    /// `/areas/<area>`.
    pub fn bind(area: impl Into<String>, parent_context: Workspace, context: RenderContext) -> Self {
        let node = Self::new(area, parent_context, context);
        let source = node
            .inner
            .context
            .layout()
            .slice(area_reference(&node.inner.area));
        let weak = Arc::downgrade(&node.inner);
        let watch = source.subscribe(move |value| {
            if let Some(inner) = weak.upgrade() {
                inner.on_source(value);
            }
        });

        let mut state = node.inner.lock();
        if state.disposed {
            watch.dispose();
            source.dispose();
        } else {
            state.source = Some((source, watch));
        }
        drop(state);
        node
    }

    pub fn area(&self) -> &str {
        &self.inner.area
    }

    /// Show `descriptor` in this area; `None` unmounts.
    pub fn set_descriptor(&self, descriptor: Option<ControlDescriptor>) {
        self.inner.apply(descriptor);
    }

    /// Key of the mounted renderer, if any.
    pub fn mount_key(&self) -> Option<MountKey> {
        self.inner.lock().mounted.as_ref().map(|m| m.key.clone())
    }

    /// Data context of the mounted control.
    pub fn data_context(&self) -> Option<Workspace> {
        self.inner
            .lock()
            .mounted
            .as_ref()
            .map(|m| m.data_context.clone())
    }

    pub fn is_mounted(&self) -> bool {
        self.inner.lock().mounted.is_some()
    }

    /// Unmount and stop following the layout. Idempotent.
    pub fn dispose(&self) {
        self.inner.dispose();
    }
}

impl Drop for AreaRenderer {
    fn drop(&mut self) {
        self.inner.dispose();
    }
}

impl AreaInner {
    fn lock(&self) -> MutexGuard<'_, AreaState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn on_source(&self, value: &Value) {
        let descriptor = match ControlDescriptor::from_value(&self.area, value) {
            Ok(descriptor) => descriptor,
            Err(e) => {
                tracing::warn!(error = %e, "unmounting area with invalid descriptor");
                None
            }
        };
        self.apply(descriptor);
    }

    fn apply(&self, next: Option<ControlDescriptor>) {
        let mut state = self.lock();
        if state.disposed {
            return;
        }

        if let (Some(mounted), Some(descriptor)) = (state.mounted.as_mut(), next.as_ref()) {
            if mounted.key == descriptor.mount_key() {
                tracing::trace!(area = %self.area, "updating mounted control");
                mounted.renderer.update(descriptor);
                self.context
                    .index()
                    .set_descriptor(&self.area, descriptor.clone());
                return;
            }
        }

        if let Some(old) = state.mounted.take() {
            self.unmount(old);
        }
        if let Some(descriptor) = next {
            state.mounted = self.mount(descriptor);
        }
    }

    fn mount(&self, descriptor: ControlDescriptor) -> Option<Mounted> {
        let (data_context, owns_context) = match &descriptor.data_context {
            Some(path) => match self.parent_context.slice_by_path(path) {
                Ok(slice) => (slice, true),
                Err(e) => {
                    tracing::warn!(error = %e, area = %self.area, "invalid data context");
                    return None;
                }
            },
            None => (self.parent_context.clone(), false),
        };

        let key = descriptor.mount_key();
        self.context
            .index()
            .record(&self.area, descriptor.clone(), data_context.clone());
        let created = self.context.registry().create(Mount {
            area: self.area.clone(),
            descriptor,
            data_context: data_context.clone(),
            context: self.context.clone(),
        });

        match created {
            Ok(renderer) => {
                tracing::debug!(
                    area = %self.area,
                    kind = %key.kind,
                    component = %key.component,
                    "control mounted"
                );
                Some(Mounted {
                    key,
                    renderer,
                    data_context,
                    owns_context,
                })
            }
            Err(e) => {
                tracing::warn!(error = %e, area = %self.area, "control not mounted");
                self.context.index().forget(&self.area);
                if owns_context {
                    data_context.dispose();
                }
                None
            }
        }
    }

    fn unmount(&self, mut old: Mounted) {
        old.renderer.dispose();
        if old.owns_context {
            old.data_context.dispose();
        }
        self.context.index().forget(&self.area);
        tracing::debug!(area = %self.area, component = %old.key.component, "control unmounted");
    }

    fn dispose(&self) {
        let (mounted, source) = {
            let mut state = self.lock();
            if state.disposed {
                return;
            }
            state.disposed = true;
            (state.mounted.take(), state.source.take())
        };
        if let Some((workspace, watch)) = source {
            watch.dispose();
            workspace.dispose();
        }
        if let Some(old) = mounted {
            self.unmount(old);
        }
    }
}
