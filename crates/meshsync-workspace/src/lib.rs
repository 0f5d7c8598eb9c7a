//! Reactive workspaces kept in sync with each other and with a remote store.
//!
//! # Core Concepts
//!
//! - **Workspace**: a shared container of one JSON snapshot with ordered,
//!   synchronous change notification
//! - **Slice**: a workspace derived from a sub-tree of another, synced both ways
//! - **RemoteSync**: a binding between a workspace and a reference on an
//!   authoritative remote, speaking the subscribe/patch protocol over an
//!   [`Endpoint`]
//! - **LoopbackHost**: an in-process remote, useful for tests and demos
//!
//! # Quick Start
//!
//! ```
//! use meshsync_workspace::Workspace;
//! use serde_json::json;
//!
//! let root = Workspace::new("app", json!({"user": {"name": "Ann"}}));
//! let user = root.slice_by_path("$.user").unwrap();
//!
//! user.update(json!({"name": "Bea"}));
//! assert_eq!(root.current(), json!({"user": {"name": "Bea"}}));
//! ```

mod config;
mod error;
mod loopback;
pub mod protocol;
pub mod remote;
mod slice;
mod subscription;
pub mod transport;
mod workspace;

pub use config::SyncConfig;
pub use error::{SyncError, SyncResult};
pub use loopback::LoopbackHost;
pub use protocol::{ChangeType, ClientMessage, CommitStatus, RemoteMessage, RequestId};
pub use remote::{RemoteEvent, RemoteStream, RemoteSync, SyncStatus};
pub use subscription::Subscription;
pub use transport::{
    BoxStream, ChannelEndpoint, ClientEndpoint, Connector, Endpoint, TransportError,
};
pub use workspace::{WeakWorkspace, Workspace};

pub use meshsync_state::{Patch, Reference, Value};
