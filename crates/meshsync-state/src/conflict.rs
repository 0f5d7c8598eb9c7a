//! Touched path computation and conflict detection.
//!
//! The synchronization loop resolves concurrent local and remote edits by
//! last-writer-wins. These helpers make such overwrites visible: given two
//! patches they report where one would clobber the other.

use crate::{Op, Patch, Path, Seg};
use std::collections::BTreeSet;

/// Conflict information between two patches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conflict {
    /// The path where the conflict occurs.
    pub path: Path,
    /// The type of conflict.
    pub kind: ConflictKind,
}

/// Types of conflicts that can occur between patches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictKind {
    /// Both patches modify the exact same path.
    ExactMatch,
    /// One patch modifies a parent of the other's path.
    /// E.g., patch A replaces `/user` while patch B replaces `/user/name`.
    PrefixConflict,
    /// An array insert or removal shifts elements the other patch addresses
    /// by a later index of the same array.
    IndexShift,
}

/// Compute the set of paths touched by a patch.
///
/// With `include_parents`, every ancestor of a touched path is included too:
/// a patch modifying `/a/b/c` yields `/a`, `/a/b` and `/a/b/c`.
///
/// # Examples
///
/// ```
/// use meshsync_state::{compute_touched, path, Op, Patch};
/// use serde_json::json;
///
/// let patch = Patch::new()
///     .with_op(Op::replace(path!("user", "name"), json!("Alice")))
///     .with_op(Op::remove(path!("user", "age")));
///
/// let touched = compute_touched(&patch, false);
/// assert!(touched.contains(&path!("user", "name")));
/// assert!(!touched.contains(&path!("user")));
///
/// let with_parents = compute_touched(&patch, true);
/// assert!(with_parents.contains(&path!("user")));
/// ```
pub fn compute_touched(patch: &Patch, include_parents: bool) -> BTreeSet<Path> {
    let mut touched = BTreeSet::new();

    for op in patch.ops() {
        let path = op.path();

        if include_parents {
            let mut current = Path::root();
            for seg in path.segments() {
                current.push(seg.clone());
                touched.insert(current.clone());
            }
        } else {
            touched.insert(path.clone());
        }
    }

    touched
}

/// Detect conflicts between two sets of touched paths.
///
/// A conflict is reported when both sets hold the same path
/// ([`ConflictKind::ExactMatch`]) or one path is a prefix of another
/// ([`ConflictKind::PrefixConflict`], reported at the shorter path).
pub fn detect_conflicts(a: &BTreeSet<Path>, b: &BTreeSet<Path>) -> Vec<Conflict> {
    let mut conflicts = Vec::new();

    for path_a in a {
        for path_b in b {
            if path_a == path_b {
                conflicts.push(Conflict {
                    path: path_a.clone(),
                    kind: ConflictKind::ExactMatch,
                });
            } else if path_a.is_prefix_of(path_b) || path_b.is_prefix_of(path_a) {
                let conflict_path = if path_a.len() < path_b.len() {
                    path_a.clone()
                } else {
                    path_b.clone()
                };
                conflicts.push(Conflict {
                    path: conflict_path,
                    kind: ConflictKind::PrefixConflict,
                });
            }
        }
    }

    conflicts
}

/// Array positions shifted by the structural ops of a patch.
///
/// Returns `(array path, first shifted index)` for every `add` or `remove`
/// addressing an array element by index.
fn shifted_ranges(patch: &Patch) -> Vec<(Path, usize)> {
    patch
        .ops()
        .iter()
        .filter(|op| matches!(op, Op::Add { .. } | Op::Remove { .. }))
        .filter_map(|op| {
            let path = op.path();
            let index = match path.last()? {
                Seg::Index(i) => *i,
                Seg::Key(_) => return None,
            };
            Some((path.parent()?, index))
        })
        .collect()
}

fn detect_index_shifts(shifting: &Patch, other: &Patch, out: &mut Vec<Conflict>) {
    for (array, from) in shifted_ranges(shifting) {
        for op in other.ops() {
            let path = op.path();
            if path.len() <= array.len() || !array.is_prefix_of(path) {
                continue;
            }
            let Some(Seg::Index(index)) = path.segments().get(array.len()) else {
                continue;
            };
            if *index > from {
                out.push(Conflict {
                    path: array.with_segment(Seg::Index(*index)),
                    kind: ConflictKind::IndexShift,
                });
            }
        }
    }
}

/// Extension trait for Patch to compute touched paths.
pub trait PatchExt {
    /// Compute the paths touched by this patch.
    fn touched(&self, include_parents: bool) -> BTreeSet<Path>;

    /// Check if this patch conflicts with another patch.
    fn conflicts_with(&self, other: &Patch) -> Vec<Conflict>;
}

impl PatchExt for Patch {
    fn touched(&self, include_parents: bool) -> BTreeSet<Path> {
        compute_touched(self, include_parents)
    }

    fn conflicts_with(&self, other: &Patch) -> Vec<Conflict> {
        let touched_self = compute_touched(self, false);
        let touched_other = compute_touched(other, false);
        let mut conflicts = detect_conflicts(&touched_self, &touched_other);
        detect_index_shifts(self, other, &mut conflicts);
        detect_index_shifts(other, self, &mut conflicts);
        conflicts
    }
}
