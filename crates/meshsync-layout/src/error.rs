//! Error types for the layout pipeline.

use meshsync_state::StateError;
use meshsync_workspace::SyncError;
use thiserror::Error;

/// Errors surfaced by [`LayoutHost`](crate::LayoutHost) and descriptor parsing.
///
/// Rendering itself never fails: a descriptor that cannot be mounted is
/// logged and the area stays unmounted.
#[derive(Debug, Error)]
pub enum LayoutError {
    #[error("invalid control descriptor at {area}: {source}")]
    InvalidDescriptor {
        area: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("no renderer registered for kind `{0}`")]
    UnregisteredKind(String),

    #[error("area `{0}` is not mounted")]
    UnknownArea(String),

    #[error("property `{prop}` of area `{area}` is not a binding")]
    NotBound { area: String, prop: String },

    #[error(transparent)]
    State(#[from] StateError),

    #[error(transparent)]
    Sync(#[from] SyncError),
}

pub type LayoutResult<T> = Result<T, LayoutError>;
