//! Structural diff between two snapshots.
//!
//! The diff recurses into containers of the same kind instead of replacing
//! whole subtrees, so a receiver can apply a large patch without needing the
//! unmodified parts of the document. Array elements are compared per index;
//! there is no move detection.

use crate::{Op, Patch, Path};
use serde_json::{Map, Value};

/// Compute a patch transforming `before` into `after`.
///
/// `apply_patch(&before, &diff(&before, &after)) == after` holds for all
/// inputs. Equal inputs produce an empty patch.
///
/// # Examples
///
/// ```
/// use meshsync_state::{diff, path, Op};
/// use serde_json::json;
///
/// let patch = diff(&json!({"count": 1}), &json!({"count": 2}));
/// assert_eq!(patch.ops(), &[Op::replace(path!("count"), json!(2))]);
/// ```
pub fn diff(before: &Value, after: &Value) -> Patch {
    let mut patch = Patch::new();
    let mut path = Path::root();
    diff_into(before, after, &mut path, &mut patch);
    patch
}

fn diff_into(before: &Value, after: &Value, path: &mut Path, patch: &mut Patch) {
    if before == after {
        return;
    }
    match (before, after) {
        (Value::Object(old), Value::Object(new)) => diff_objects(old, new, path, patch),
        (Value::Array(old), Value::Array(new)) => diff_arrays(old, new, path, patch),
        _ => patch.push(Op::replace(path.clone(), after.clone())),
    }
}

fn diff_objects(
    old: &Map<String, Value>,
    new: &Map<String, Value>,
    path: &mut Path,
    patch: &mut Patch,
) {
    for key in old.keys() {
        if !new.contains_key(key) {
            patch.push(Op::remove(path.clone().key(key.clone())));
        }
    }

    for (key, new_value) in new {
        path.push_key(key);
        match old.get(key) {
            Some(old_value) => diff_into(old_value, new_value, path, patch),
            None => patch.push(Op::add(path.clone(), new_value.clone())),
        }
        path.pop();
    }
}

fn diff_arrays(old: &[Value], new: &[Value], path: &mut Path, patch: &mut Patch) {
    let common = old.len().min(new.len());

    for index in 0..common {
        path.push_index(index);
        diff_into(&old[index], &new[index], path, patch);
        path.pop();
    }

    for (index, value) in new.iter().enumerate().skip(common) {
        patch.push(Op::add(path.clone().index(index), value.clone()));
    }

    // Highest index first so earlier removals do not shift later targets.
    for index in (common..old.len()).rev() {
        patch.push(Op::remove(path.clone().index(index)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{apply_patch, path};
    use serde_json::json;

    fn round_trip(before: Value, after: Value) -> Patch {
        let patch = diff(&before, &after);
        assert_eq!(apply_patch(&before, &patch), after, "patch: {patch:?}");
        patch
    }

    #[test]
    fn test_equal_inputs_produce_empty_patch() {
        let doc = json!({"a": [1, {"b": null}]});
        assert!(diff(&doc, &doc).is_empty());
    }

    #[test]
    fn test_object_add_remove_replace() {
        let patch = round_trip(json!({"a": 1, "b": 2}), json!({"b": 3, "c": 4}));
        assert_eq!(
            patch.ops(),
            &[
                Op::remove(path!("a")),
                Op::replace(path!("b"), json!(3)),
                Op::add(path!("c"), json!(4)),
            ]
        );
    }

    #[test]
    fn test_recurses_into_nested_objects() {
        let patch = round_trip(
            json!({"user": {"name": "A", "tags": ["x"]}}),
            json!({"user": {"name": "B", "tags": ["x"]}}),
        );
        assert_eq!(patch.ops(), &[Op::replace(path!("user", "name"), json!("B"))]);
    }

    #[test]
    fn test_type_change_is_single_replace() {
        let patch = round_trip(json!({"v": {"deep": 1}}), json!({"v": 5}));
        assert_eq!(patch.ops(), &[Op::replace(path!("v"), json!(5))]);

        let root = round_trip(json!([1, 2]), json!({"a": 1}));
        assert_eq!(root.ops(), &[Op::replace(Path::root(), json!({"a": 1}))]);
    }

    #[test]
    fn test_array_growth_and_shrink() {
        let grow = round_trip(json!([1, 2]), json!([1, 5, 3, 4]));
        assert_eq!(
            grow.ops(),
            &[
                Op::replace(path!(1), json!(5)),
                Op::add(path!(2), json!(3)),
                Op::add(path!(3), json!(4)),
            ]
        );

        let shrink = round_trip(json!([1, 2, 3, 4]), json!([1]));
        assert_eq!(
            shrink.ops(),
            &[Op::remove(path!(3)), Op::remove(path!(2)), Op::remove(path!(1))]
        );
    }

    #[test]
    fn test_array_of_objects_recurses_per_index() {
        let patch = round_trip(
            json!({"items": [{"x": 1}, {"x": 2}]}),
            json!({"items": [{"x": 1}, {"x": 3}]}),
        );
        assert_eq!(patch.ops(), &[Op::replace(path!("items", 1, "x"), json!(3))]);
    }

    #[test]
    fn test_numeric_object_keys_round_trip() {
        round_trip(json!({"0": "a"}), json!({"0": "b", "1": "c"}));
    }
}
