//! Patch container for grouping operations.
//!
//! A `Patch` is an ordered list of operations applied as one unit. Its wire
//! form is the bare JSON array of operations.

use crate::{Op, Path};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// An ordered collection of operations.
///
/// # Examples
///
/// ```
/// use meshsync_state::{path, Op, Patch};
/// use serde_json::json;
///
/// let patch = Patch::new()
///     .with_op(Op::replace(path!("name"), json!("Alice")))
///     .with_op(Op::add(path!("age"), json!(30)));
///
/// assert_eq!(patch.len(), 2);
/// ```
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Patch {
    ops: Vec<Op>,
}

impl Patch {
    /// Create an empty patch.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a patch with the given operations.
    #[inline]
    pub fn with_ops(ops: Vec<Op>) -> Self {
        Self { ops }
    }

    /// A patch replacing the whole document.
    #[inline]
    pub fn replace_root(value: Value) -> Self {
        Self::with_ops(vec![Op::replace(Path::root(), value)])
    }

    /// Add an operation to this patch (builder pattern).
    #[inline]
    pub fn with_op(mut self, op: Op) -> Self {
        self.ops.push(op);
        self
    }

    /// Push an operation onto this patch.
    #[inline]
    pub fn push(&mut self, op: Op) {
        self.ops.push(op);
    }

    /// Get the operations in this patch.
    #[inline]
    pub fn ops(&self) -> &[Op] {
        &self.ops
    }

    /// Consume this patch and return the operations.
    #[inline]
    pub fn into_ops(self) -> Vec<Op> {
        self.ops
    }

    /// Check if this patch is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Get the number of operations in this patch.
    #[inline]
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// Append the operations of a later patch.
    ///
    /// Applying the merged patch equals applying `self` then `other`; on a
    /// shared path the later operation wins.
    #[inline]
    pub fn merge(&mut self, other: Patch) {
        self.ops.extend(other.ops);
    }

    /// Rebase every operation under `prefix`.
    ///
    /// Used to lift a patch computed against a slice into its parent.
    pub fn prefixed(self, prefix: &Path) -> Patch {
        if prefix.is_empty() {
            return self;
        }
        self.ops
            .into_iter()
            .map(|mut op| {
                let rebased = prefix.join(op.path());
                *op.path_mut() = rebased;
                op
            })
            .collect()
    }

    /// Iterate over the operations.
    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = &Op> {
        self.ops.iter()
    }
}

impl FromIterator<Op> for Patch {
    fn from_iter<I: IntoIterator<Item = Op>>(iter: I) -> Self {
        Self {
            ops: iter.into_iter().collect(),
        }
    }
}

impl IntoIterator for Patch {
    type Item = Op;
    type IntoIter = std::vec::IntoIter<Op>;

    fn into_iter(self) -> Self::IntoIter {
        self.ops.into_iter()
    }
}

impl<'a> IntoIterator for &'a Patch {
    type Item = &'a Op;
    type IntoIter = std::slice::Iter<'a, Op>;

    fn into_iter(self) -> Self::IntoIter {
        self.ops.iter()
    }
}

impl Extend<Op> for Patch {
    fn extend<I: IntoIterator<Item = Op>>(&mut self, iter: I) {
        self.ops.extend(iter);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path;
    use serde_json::json;

    #[test]
    fn test_patch_builder() {
        let patch = Patch::new()
            .with_op(Op::add(path!("a"), json!(1)))
            .with_op(Op::add(path!("b"), json!(2)));

        assert_eq!(patch.len(), 2);
    }

    #[test]
    fn test_patch_merge_keeps_order() {
        let mut p1 = Patch::new().with_op(Op::replace(path!("a"), json!(1)));
        let p2 = Patch::new().with_op(Op::replace(path!("a"), json!(2)));

        p1.merge(p2);
        assert_eq!(p1.len(), 2);
        assert_eq!(p1.ops()[1], Op::replace(path!("a"), json!(2)));
    }

    #[test]
    fn test_prefixed() {
        let patch = Patch::new()
            .with_op(Op::replace(path!("x"), json!(2)))
            .with_op(Op::remove(path!("y")))
            .prefixed(&path!("items", 0));

        assert_eq!(patch.ops()[0].path(), &path!("items", 0, "x"));
        assert_eq!(patch.ops()[1].path(), &path!("items", 0, "y"));
    }

    #[test]
    fn test_patch_wire_is_array() {
        let patch = Patch::new().with_op(Op::replace(path!("count"), json!(2)));
        assert_eq!(
            serde_json::to_value(&patch).unwrap(),
            json!([{"op": "replace", "path": "/count", "value": 2}])
        );
        let parsed: Patch = serde_json::from_value(json!([])).unwrap();
        assert!(parsed.is_empty());
    }
}
