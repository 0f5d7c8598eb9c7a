//! Integration tests for diff/apply behaviour across the public API.

use meshsync_state::{
    apply_patch, diff, path, resolve, try_apply_patch, Op, Patch, PatchExt, Path, Reference,
};
use serde_json::{json, Value};

fn documents() -> Vec<Value> {
    vec![
        json!(null),
        json!(1),
        json!("text"),
        json!([]),
        json!({}),
        json!({"count": 1}),
        json!({"count": 2, "label": "two"}),
        json!({"items": [{"x": 1}, {"x": 2, "tags": ["a"]}]}),
        json!({"items": [{"x": 2}], "extra": {"deep": {"er": true}}}),
        json!({"main/a": {"1": "numeric key"}, "~tilde": [null, false]}),
        json!([[1, 2], [3], {"k": [4]}]),
    ]
}

#[test]
fn diff_then_apply_reaches_target_for_every_pair() {
    let docs = documents();
    for before in &docs {
        for after in &docs {
            let patch = diff(before, after);
            assert_eq!(
                &apply_patch(before, &patch),
                after,
                "before={before} after={after} patch={patch:?}"
            );
            assert_eq!(
                &try_apply_patch(before, &patch).unwrap(),
                after,
                "strict apply failed for before={before} after={after}"
            );
        }
    }
}

#[test]
fn diff_survives_the_wire() {
    let before = json!({"main/a": {"1": "x"}, "~t": [1, 2, 3]});
    let after = json!({"main/a": {"1": "y"}, "~t": [1]});
    let patch = diff(&before, &after);

    let wire = serde_json::to_string(&patch).unwrap();
    let decoded: Patch = serde_json::from_str(&wire).unwrap();

    assert_eq!(apply_patch(&before, &decoded), after);
}

#[test]
fn reapplying_value_ops_produces_no_further_diff() {
    let before = json!({"count": 1, "user": {"name": "A"}});
    let patch = Patch::new()
        .with_op(Op::replace(path!("count"), json!(2)))
        .with_op(Op::add(path!("user", "email"), json!("a@example.com")));

    let once = apply_patch(&before, &patch);
    let twice = apply_patch(&once, &patch);

    assert_eq!(once, twice);
    assert!(diff(&once, &twice).is_empty());
}

#[test]
fn duplicate_removal_is_tolerated() {
    let doc = json!({"a": 1, "b": 2});
    let patch = Patch::new().with_op(Op::remove(path!("a")));

    let once = apply_patch(&doc, &patch);
    let twice = apply_patch(&once, &patch);

    assert_eq!(twice, json!({"b": 2}));
}

#[test]
fn count_scenario() {
    let before = json!({"count": 1});
    let after = json!({"count": 2});

    let patch = diff(&before, &after);
    assert_eq!(
        serde_json::to_value(&patch).unwrap(),
        json!([{"op": "replace", "path": "/count", "value": 2}])
    );
    assert_eq!(apply_patch(&before, &patch), after);
}

#[test]
fn merged_patches_are_last_write_wins() {
    let doc = json!({"a": 0, "b": 0});
    let p1 = Patch::new()
        .with_op(Op::replace(path!("a"), json!(1)))
        .with_op(Op::replace(path!("b"), json!(1)));
    let p2 = Patch::new().with_op(Op::replace(path!("a"), json!(2)));

    let sequential = apply_patch(&apply_patch(&doc, &p1), &p2);
    let mut merged = p1.clone();
    merged.merge(p2.clone());

    assert_eq!(apply_patch(&doc, &merged), sequential);
    assert_eq!(sequential, json!({"a": 2, "b": 1}));
    assert!(!p1.conflicts_with(&p2).is_empty());
}

#[test]
fn prefixed_slice_patch_lands_in_parent() {
    let parent = json!({"items": [{"x": 1}]});
    let reference = Reference::parse_path("/items/0").unwrap();

    let slice_before = resolve(&reference, &parent).cloned().unwrap();
    let slice_after = json!({"x": 2});
    let lifted = diff(&slice_before, &slice_after).prefixed(&reference.to_path());

    assert_eq!(apply_patch(&parent, &lifted), json!({"items": [{"x": 2}]}));
}

#[test]
fn root_replace_patch_from_full_notification() {
    let patch = Patch::replace_root(json!({"fresh": true}));
    assert_eq!(patch.ops()[0].path(), &Path::root());
    assert_eq!(apply_patch(&json!([1, 2, 3]), &patch), json!({"fresh": true}));
}
