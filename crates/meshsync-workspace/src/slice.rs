//! Workspace slices: derived workspaces kept bidirectionally in sync with a
//! sub-tree of their parent.

use crate::error::SyncResult;
use crate::subscription::Subscription;
use crate::workspace::Workspace;
use meshsync_state::{apply_patch, diff, resolve, Op, Patch, Reference, Value};

/// The two one-way links between a parent and one slice.
///
/// Owned by the slice workspace: disposing the slice (or dropping its last
/// handle) drops the link, which detaches from the parent. The link keeps
/// the parent alive; the parent only reaches the slice weakly.
///
/// Echo gate: the slice-to-parent side compares the slice's latest value
/// with the parent's value at the reference and pushes nothing when they are
/// equal, which is always the case for values that came from the parent.
pub(crate) struct SliceLink {
    _parent: Workspace,
    _reference: Reference,
    _to_parent: Subscription,
    _from_parent: Subscription,
}

impl SliceLink {
    pub(crate) fn attach(parent: &Workspace, reference: Reference) -> Workspace {
        let initial = resolve_owned(&reference, &parent.current());
        let slice = Workspace::new(format!("{}:{}", parent.name(), reference), initial);

        let to_parent = {
            let parent = parent.clone();
            let reference = reference.clone();
            let weak_slice = slice.downgrade();
            slice.subscribe(move |_| {
                let Some(slice) = weak_slice.upgrade() else {
                    return;
                };
                // The latest slice value, not the notified one: a queued
                // notification may be older than what the slice holds now.
                let latest = slice.current();
                parent.try_update_with(|doc| lift(&reference, doc, &latest));

                // A write the parent cannot hold (index past the end, path
                // through a scalar) is rolled back to what the parent has.
                let landed = resolve_owned(&reference, &parent.current());
                if landed != latest {
                    tracing::debug!(slice = %slice.name(), "slice write rejected by parent, rolling back");
                    slice.update(landed);
                }
            })
        };

        let from_parent = {
            let reference = reference.clone();
            let weak_slice = slice.downgrade();
            parent.subscribe(move |doc| {
                if let Some(slice) = weak_slice.upgrade() {
                    slice.update(resolve_owned(&reference, doc));
                }
            })
        };

        slice.attach(SliceLink {
            _parent: parent.clone(),
            _reference: reference,
            _to_parent: to_parent,
            _from_parent: from_parent,
        });
        slice
    }
}

/// Parent document with the slice value written back at `reference`, or
/// `None` when the parent already holds it.
fn lift(reference: &Reference, doc: &Value, slice_value: &Value) -> Option<Value> {
    let path = reference.to_path();
    let patch = match resolve(reference, doc) {
        Some(old) if old == slice_value => return None,
        Some(old) => diff(old, slice_value).prefixed(&path),
        None if slice_value.is_null() => return None,
        None => Patch::new().with_op(Op::add(path, slice_value.clone())),
    };
    Some(apply_patch(doc, &patch))
}

fn resolve_owned(reference: &Reference, doc: &Value) -> Value {
    resolve(reference, doc).cloned().unwrap_or(Value::Null)
}

impl Workspace {
    /// Derive a workspace viewing the sub-tree at `reference`.
    ///
    /// The slice always converges to `resolve(reference, parent)`; an absent
    /// location reads as `null`. Writes to the slice are lifted into the
    /// parent as a patch rooted at the reference path.
    pub fn slice(&self, reference: impl Into<Reference>) -> Workspace {
        SliceLink::attach(self, reference.into())
    }

    /// [`slice`](Self::slice) with a path in JSONPath (`$.items[0]`) or
    /// pointer (`/items/0`) form.
    pub fn slice_by_path(&self, path: &str) -> SyncResult<Workspace> {
        Ok(self.slice(Reference::parse_path(path)?))
    }
}
