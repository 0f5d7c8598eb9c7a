//! Control descriptor rendering over meshsync workspaces.
//!
//! A layout workspace stores control descriptors under `/areas/<id>`. The
//! renderer tree mounts one renderer per area, resolves `$binding`
//! placeholders against the nearest data context and publishes the
//! resulting [`ControlModel`]s to a [`ControlModelStore`] that the rendering
//! layer observes.
//!
//! # Descriptor kinds
//!
//! - `generic`: a leaf control
//! - `stack`: nested areas listed in `areas`, one child per id
//! - `itemTemplate`: `view` repeated for each element of the `data` array
//!
//! Other kinds are mounted through factories added to the
//! [`RendererRegistry`].

pub mod binding;
mod descriptor;
mod error;
mod host;
pub mod renderer;
mod store;

pub use descriptor::{ControlDescriptor, ControlKind, MountKey};
pub use error::{LayoutError, LayoutResult};
pub use host::LayoutHost;
pub use renderer::{
    AreaRenderer, ControlRenderer, GenericRenderer, ItemTemplateRenderer, ModelPublisher, Mount,
    RenderContext, RendererFactory, RendererRegistry, StackRenderer,
};
pub use store::{ControlModel, ControlModelStore};
