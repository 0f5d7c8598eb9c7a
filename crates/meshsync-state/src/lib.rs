//! References and the JSON Patch engine behind meshsync workspaces.
//!
//! `meshsync-state` works on plain `serde_json::Value` snapshots. Snapshots
//! are never mutated in place: every change is expressed as a [`Patch`] and
//! applying it produces a new value.
//!
//! # Core Concepts
//!
//! - **Path**: a sequence of key/index segments with a `$`-rooted JSONPath
//!   form and an RFC 6901 pointer form
//! - **Reference**: a path, an entity in a named collection, or a whole collection
//! - **Patch**: an ordered list of `add`/`remove`/`replace` operations
//! - **diff / apply**: `apply_patch(&a, &diff(&a, &b)) == b`
//!
//! # Quick Start
//!
//! ```
//! use meshsync_state::{apply_patch, diff, resolve, Reference};
//! use serde_json::json;
//!
//! let before = json!({"items": [{"x": 1}]});
//! let after = json!({"items": [{"x": 2}]});
//!
//! let patch = diff(&before, &after);
//! assert_eq!(apply_patch(&before, &patch), after);
//!
//! let first = Reference::parse_path("$.items[0]").unwrap();
//! assert_eq!(resolve(&first, &after), Some(&json!({"x": 2})));
//! ```

mod apply;
mod conflict;
mod diff;
mod error;
mod op;
mod patch;
mod path;
mod reference;

pub use apply::{apply_patch, apply_patches, try_apply_patch};
pub use conflict::{compute_touched, detect_conflicts, Conflict, ConflictKind, PatchExt};
pub use diff::diff;
pub use error::{value_type_name, StateError, StateResult};
pub use op::Op;
pub use patch::Patch;
pub use path::{Path, Seg};
pub use reference::{resolve, resolve_path, Reference};

// Re-export serde_json::Value for convenience
pub use serde_json::Value;
