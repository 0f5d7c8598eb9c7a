use super::{ControlRenderer, GenericRenderer, ItemTemplateRenderer, Mount, StackRenderer};
use crate::descriptor::ControlKind;
use crate::error::{LayoutError, LayoutResult};
use std::collections::HashMap;
use std::sync::Arc;

/// Creates the renderer for one mounted control.
pub trait RendererFactory: Send + Sync {
    fn create(&self, mount: Mount) -> Box<dyn ControlRenderer>;
}

impl<F> RendererFactory for F
where
    F: Fn(Mount) -> Box<dyn ControlRenderer> + Send + Sync,
{
    fn create(&self, mount: Mount) -> Box<dyn ControlRenderer> {
        self(mount)
    }
}

/// Renderer factories by [`ControlKind`].
#[derive(Clone, Default)]
pub struct RendererRegistry {
    factories: HashMap<ControlKind, Arc<dyn RendererFactory>>,
}

impl std::fmt::Debug for RendererRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RendererRegistry")
            .field("kinds", &self.kinds())
            .finish()
    }
}

impl RendererRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// The built-in generic, stack and item-template renderers.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(ControlKind::Generic, |mount: Mount| -> Box<dyn ControlRenderer> {
            Box::new(GenericRenderer::mount(mount))
        });
        registry.register(ControlKind::Stack, |mount: Mount| -> Box<dyn ControlRenderer> {
            Box::new(StackRenderer::mount(mount))
        });
        registry.register(
            ControlKind::ItemTemplate,
            |mount: Mount| -> Box<dyn ControlRenderer> {
                Box::new(ItemTemplateRenderer::mount(mount))
            },
        );
        registry
    }

    /// Register `factory` for `kind`, returning the factory it replaces.
    pub fn register(
        &mut self,
        kind: impl Into<ControlKind>,
        factory: impl RendererFactory + 'static,
    ) -> Option<Arc<dyn RendererFactory>> {
        self.factories.insert(kind.into(), Arc::new(factory))
    }

    pub fn get(&self, kind: &ControlKind) -> Option<Arc<dyn RendererFactory>> {
        self.factories.get(kind).cloned()
    }

    pub fn contains(&self, kind: &ControlKind) -> bool {
        self.factories.contains_key(kind)
    }

    /// Registered kind names, sorted.
    pub fn kinds(&self) -> Vec<String> {
        let mut kinds: Vec<String> = self
            .factories
            .keys()
            .map(|k| k.as_str().to_owned())
            .collect();
        kinds.sort();
        kinds
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }

    pub(crate) fn create(&self, mount: Mount) -> LayoutResult<Box<dyn ControlRenderer>> {
        let kind = &mount.descriptor.kind;
        let factory = self
            .factories
            .get(kind)
            .ok_or_else(|| LayoutError::UnregisteredKind(kind.to_string()))?;
        Ok(factory.create(mount))
    }
}
