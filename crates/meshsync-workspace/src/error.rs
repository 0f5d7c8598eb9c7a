//! Error types for workspace synchronization.

use crate::transport::TransportError;
use meshsync_state::StateError;
use thiserror::Error;

/// Errors surfaced by the synchronization layer.
///
/// Patch and resolution misses never show up here; they are absorbed by the
/// workspace. Only setup problems and transport failures are reported.
#[derive(Debug, Error)]
pub enum SyncError {
    /// A reference or path could not be parsed.
    #[error(transparent)]
    State(#[from] StateError),

    /// The transport failed.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Reading a configuration file failed.
    #[error("failed to read config {path}: {source}")]
    ConfigIo {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// A configuration document is malformed.
    #[error("invalid config: {0}")]
    ConfigParse(#[from] serde_json::Error),

    /// The remote binding gave up reconnecting.
    #[error("remote unreachable after {attempts} attempts")]
    Unreachable { attempts: u32 },

    /// The remote binding was closed before it went live.
    #[error("remote sync closed")]
    Closed,
}

/// Result type for synchronization operations.
pub type SyncResult<T> = Result<T, SyncError>;
