//! Patch application logic.
//!
//! [`try_apply_patch`] is the strict form: it stops at the first operation
//! whose target does not resolve. [`apply_patch`] is the form used by the
//! synchronization loop: unresolved operations are logged and skipped so a
//! re-ordered or duplicated patch never terminates a stream.

use crate::{
    error::{value_type_name, StateError, StateResult},
    Op, Patch, Path, Seg,
};
use serde_json::{Map, Value};

/// Apply a patch to a JSON document (pure, lenient).
///
/// Operations whose path does not resolve are skipped.
///
/// # Examples
///
/// ```
/// use meshsync_state::{apply_patch, path, Op, Patch};
/// use serde_json::json;
///
/// let doc = json!({"count": 1});
/// let patch = Patch::new()
///     .with_op(Op::replace(path!("count"), json!(2)))
///     .with_op(Op::remove(path!("missing")));
///
/// let new_doc = apply_patch(&doc, &patch);
/// assert_eq!(new_doc, json!({"count": 2}));
///
/// // Original is unchanged (pure function)
/// assert_eq!(doc["count"], 1);
/// ```
pub fn apply_patch(doc: &Value, patch: &Patch) -> Value {
    let mut result = doc.clone();

    for op in patch.ops() {
        if let Err(e) = apply_op(&mut result, op) {
            tracing::debug!(error = %e, op = op.name(), "skipping unresolved patch operation");
        }
    }

    result
}

/// Apply a patch to a JSON document (pure, strict).
///
/// Returns the first error encountered; the input is never modified.
pub fn try_apply_patch(doc: &Value, patch: &Patch) -> StateResult<Value> {
    let mut result = doc.clone();

    for op in patch.ops() {
        apply_op(&mut result, op)?;
    }

    Ok(result)
}

/// Apply multiple patches in sequence (pure, lenient).
pub fn apply_patches<'a>(doc: &Value, patches: impl IntoIterator<Item = &'a Patch>) -> Value {
    patches
        .into_iter()
        .fold(doc.clone(), |acc, patch| apply_patch(&acc, patch))
}

/// Apply a single operation to a document (mutating).
pub(crate) fn apply_op(doc: &mut Value, op: &Op) -> StateResult<()> {
    match op {
        Op::Add { path, value } => apply_add(doc, path, value.clone()),
        Op::Remove { path } => apply_remove(doc, path),
        Op::Replace { path, value } => apply_replace(doc, path, value.clone()),
    }
}

fn apply_add(doc: &mut Value, path: &Path, value: Value) -> StateResult<()> {
    let Some((last, parents)) = path.segments().split_last() else {
        *doc = value;
        return Ok(());
    };

    let parent = parent_mut(doc, parents, true, path)?;
    match parent {
        Value::Object(obj) => {
            obj.insert(last.to_key(), value);
            Ok(())
        }
        Value::Array(arr) => {
            if last.as_key() == Some("-") {
                arr.push(value);
                return Ok(());
            }
            let index = last
                .to_index()
                .ok_or_else(|| StateError::type_mismatch(path.clone(), "object", "array"))?;
            if index > arr.len() {
                return Err(StateError::index_out_of_bounds(
                    path.clone(),
                    index,
                    arr.len(),
                ));
            }
            arr.insert(index, value);
            Ok(())
        }
        other => Err(StateError::type_mismatch(
            path.clone(),
            "container",
            value_type_name(other),
        )),
    }
}

fn apply_replace(doc: &mut Value, path: &Path, value: Value) -> StateResult<()> {
    let Some((last, parents)) = path.segments().split_last() else {
        *doc = value;
        return Ok(());
    };

    let parent = parent_mut(doc, parents, false, path)?;
    let slot = child_mut(parent, last, path)?;
    *slot = value;
    Ok(())
}

fn apply_remove(doc: &mut Value, path: &Path) -> StateResult<()> {
    let Some((last, parents)) = path.segments().split_last() else {
        *doc = Value::Null;
        return Ok(());
    };

    let parent = parent_mut(doc, parents, false, path)?;
    match parent {
        Value::Object(obj) => obj
            .remove(&last.to_key())
            .map(|_| ())
            .ok_or_else(|| StateError::path_not_found(path.clone())),
        Value::Array(arr) => {
            let index = last
                .to_index()
                .ok_or_else(|| StateError::path_not_found(path.clone()))?;
            if index >= arr.len() {
                return Err(StateError::index_out_of_bounds(
                    path.clone(),
                    index,
                    arr.len(),
                ));
            }
            arr.remove(index);
            Ok(())
        }
        other => Err(StateError::type_mismatch(
            path.clone(),
            "container",
            value_type_name(other),
        )),
    }
}

/// Walk to the container holding the target of an operation.
///
/// With `create`, missing (absent or null) intermediates addressed by a key
/// segment become empty objects.
fn parent_mut<'a>(
    current: &'a mut Value,
    segments: &[Seg],
    create: bool,
    full_path: &Path,
) -> StateResult<&'a mut Value> {
    if create && current.is_null() {
        *current = Value::Object(Map::new());
    }

    let Some((seg, rest)) = segments.split_first() else {
        return Ok(current);
    };

    let child = match current {
        Value::Object(obj) => {
            let key = seg.to_key();
            if create {
                obj.entry(key).or_insert(Value::Null)
            } else {
                obj.get_mut(&key)
                    .ok_or_else(|| StateError::path_not_found(full_path.clone()))?
            }
        }
        Value::Array(arr) => {
            let len = arr.len();
            let index = seg
                .to_index()
                .ok_or_else(|| StateError::type_mismatch(full_path.clone(), "object", "array"))?;
            arr.get_mut(index)
                .ok_or_else(|| StateError::index_out_of_bounds(full_path.clone(), index, len))?
        }
        other => {
            return Err(StateError::type_mismatch(
                full_path.clone(),
                "container",
                value_type_name(other),
            ))
        }
    };

    parent_mut(child, rest, create, full_path)
}

fn child_mut<'a>(parent: &'a mut Value, seg: &Seg, full_path: &Path) -> StateResult<&'a mut Value> {
    match parent {
        Value::Object(obj) => obj
            .get_mut(&seg.to_key())
            .ok_or_else(|| StateError::path_not_found(full_path.clone())),
        Value::Array(arr) => {
            let len = arr.len();
            let index = seg
                .to_index()
                .ok_or_else(|| StateError::path_not_found(full_path.clone()))?;
            arr.get_mut(index)
                .ok_or_else(|| StateError::index_out_of_bounds(full_path.clone(), index, len))
        }
        other => Err(StateError::type_mismatch(
            full_path.clone(),
            "container",
            value_type_name(other),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path;
    use serde_json::json;

    #[test]
    fn test_replace_scalar() {
        let doc = json!({"count": 1});
        let patch = Patch::new().with_op(Op::replace(path!("count"), json!(2)));
        assert_eq!(apply_patch(&doc, &patch), json!({"count": 2}));
    }

    #[test]
    fn test_add_creates_intermediate_objects() {
        let doc = json!({});
        let patch = Patch::new().with_op(Op::add(path!("a", "b", "c"), json!(42)));
        let result = try_apply_patch(&doc, &patch).unwrap();
        assert_eq!(result, json!({"a": {"b": {"c": 42}}}));
    }

    #[test]
    fn test_add_array_insert_and_append() {
        let doc = json!({"arr": [1, 3]});
        let patch = Patch::new()
            .with_op(Op::add(path!("arr", 1), json!(2)))
            .with_op(Op::add(path!("arr", 3), json!(4)))
            .with_op(Op::add(path!("arr", "-"), json!(5)));
        assert_eq!(
            try_apply_patch(&doc, &patch).unwrap(),
            json!({"arr": [1, 2, 3, 4, 5]})
        );
    }

    #[test]
    fn test_add_array_out_of_bounds_is_error() {
        let doc = json!({"arr": [1]});
        let patch = Patch::new().with_op(Op::add(path!("arr", 5), json!(9)));
        assert!(matches!(
            try_apply_patch(&doc, &patch),
            Err(StateError::IndexOutOfBounds { index: 5, len: 1, .. })
        ));
        assert_eq!(apply_patch(&doc, &patch), doc);
    }

    #[test]
    fn test_remove_missing_is_noop() {
        let doc = json!({"x": 1});
        let patch = Patch::new().with_op(Op::remove(path!("nonexistent")));
        assert_eq!(apply_patch(&doc, &patch), json!({"x": 1}));
        assert!(matches!(
            try_apply_patch(&doc, &patch),
            Err(StateError::PathNotFound { .. })
        ));
    }

    #[test]
    fn test_replace_missing_is_noop() {
        let doc = json!({"items": []});
        let patch = Patch::new().with_op(Op::replace(path!("items", 0, "x"), json!(1)));
        assert_eq!(apply_patch(&doc, &patch), doc);
    }

    #[test]
    fn test_remove_array_element() {
        let doc = json!({"arr": [1, 2, 3]});
        let patch = Patch::new().with_op(Op::remove(path!("arr", 1)));
        assert_eq!(apply_patch(&doc, &patch), json!({"arr": [1, 3]}));
    }

    #[test]
    fn test_root_operations() {
        let doc = json!({"a": 1});
        let replaced = apply_patch(&doc, &Patch::replace_root(json!([1, 2])));
        assert_eq!(replaced, json!([1, 2]));

        let removed = apply_patch(&doc, &Patch::new().with_op(Op::remove(Path::root())));
        assert_eq!(removed, Value::Null);
    }

    #[test]
    fn test_traversal_through_scalar_is_miss() {
        let doc = json!({"a": 1});
        let patch = Patch::new().with_op(Op::add(path!("a", "b"), json!(2)));
        assert!(matches!(
            try_apply_patch(&doc, &patch),
            Err(StateError::TypeMismatch { .. })
        ));
        assert_eq!(apply_patch(&doc, &patch), doc);
    }

    #[test]
    fn test_lenient_apply_continues_after_miss() {
        let doc = json!({"a": 1});
        let patch = Patch::new()
            .with_op(Op::remove(path!("zzz")))
            .with_op(Op::replace(path!("a"), json!(2)));
        assert_eq!(apply_patch(&doc, &patch), json!({"a": 2}));
    }

    #[test]
    fn test_apply_is_pure() {
        let doc = json!({"x": 1});
        let patch = Patch::new().with_op(Op::replace(path!("x"), json!(2)));

        let _ = apply_patch(&doc, &patch);

        assert_eq!(doc["x"], 1);
    }

    #[test]
    fn test_apply_patches_folds() {
        let doc = json!({"count": 0});
        let patches = vec![
            Patch::new().with_op(Op::replace(path!("count"), json!(1))),
            Patch::new().with_op(Op::replace(path!("count"), json!(2))),
        ];
        assert_eq!(apply_patches(&doc, patches.iter())["count"], 2);
    }
}
