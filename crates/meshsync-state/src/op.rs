//! Patch operations for modifying JSON snapshots.
//!
//! Each operation describes a single atomic change. The wire form is the
//! RFC 6902 subset `{"op": "add"|"remove"|"replace", "path": "/a/0", "value"?: …}`.

use crate::Path;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single patch operation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum Op {
    /// Insert a value.
    ///
    /// On an object key this inserts or overwrites; on an array index it
    /// inserts before that index (`len` or `-` appends).
    Add {
        /// Target path.
        path: Path,
        /// Value to add.
        value: Value,
    },

    /// Remove the value at the path.
    ///
    /// Tolerated as a no-op when the path does not exist.
    Remove {
        /// Target path.
        path: Path,
    },

    /// Replace the value at the path.
    Replace {
        /// Target path.
        path: Path,
        /// Replacement value.
        value: Value,
    },
}

impl Op {
    /// Create an Add operation.
    #[inline]
    pub fn add(path: Path, value: impl Into<Value>) -> Self {
        Op::Add {
            path,
            value: value.into(),
        }
    }

    /// Create a Remove operation.
    #[inline]
    pub fn remove(path: Path) -> Self {
        Op::Remove { path }
    }

    /// Create a Replace operation.
    #[inline]
    pub fn replace(path: Path, value: impl Into<Value>) -> Self {
        Op::Replace {
            path,
            value: value.into(),
        }
    }

    /// Get the path this operation targets.
    #[inline]
    pub fn path(&self) -> &Path {
        match self {
            Op::Add { path, .. } => path,
            Op::Remove { path } => path,
            Op::Replace { path, .. } => path,
        }
    }

    /// Get a mutable reference to the path.
    #[inline]
    pub fn path_mut(&mut self) -> &mut Path {
        match self {
            Op::Add { path, .. } => path,
            Op::Remove { path } => path,
            Op::Replace { path, .. } => path,
        }
    }

    /// Get the operation name as it appears on the wire.
    #[inline]
    pub fn name(&self) -> &'static str {
        match self {
            Op::Add { .. } => "add",
            Op::Remove { .. } => "remove",
            Op::Replace { .. } => "replace",
        }
    }
}
