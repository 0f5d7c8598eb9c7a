//! Bridge between a workspace and a remote authoritative store.
//!
//! [`RemoteStream`] is the protocol adapter for one reference on one
//! endpoint. [`RemoteSync`] binds it to a [`Workspace`](crate::Workspace):
//! inbound changes are applied locally, local edits are sent out, failed or
//! timed-out commits trigger a full-state reconcile, and a lost transport is
//! reconnected.

mod pending;
mod stream;
mod sync;

pub use stream::{RemoteEvent, RemoteStream};
pub use sync::{RemoteSync, SyncStatus};
