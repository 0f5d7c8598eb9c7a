//! Binding and area placeholders inside descriptor props.
//!
//! `{"$binding": "<path>"}` is replaced by the value at `<path>` in the
//! nearest data context (absent reads as `null`); `{"$area": "<id>"}` is
//! replaced by the bare id. Placeholders may appear at any depth.

use meshsync_state::{resolve_path, Path};
use serde_json::{Map, Value};

pub const BINDING_KEY: &str = "$binding";
pub const AREA_KEY: &str = "$area";

/// Whether `value` is a `$binding` placeholder, well-formed or not.
pub fn is_binding(value: &Value) -> bool {
    single_field(value, BINDING_KEY).is_some()
}

/// The path of a `$binding` placeholder, or `None` for any other value.
///
/// A placeholder whose path is not a string or does not parse is logged
/// and yields `None`.
pub fn binding_path(value: &Value) -> Option<Path> {
    let raw = single_field(value, BINDING_KEY)?;
    let Some(raw) = raw.as_str() else {
        tracing::warn!(binding = %raw, "ignoring binding with a non-string path");
        return None;
    };
    match Path::parse(raw) {
        Ok(path) => Some(path),
        Err(e) => {
            tracing::warn!(error = %e, path = raw, "ignoring malformed binding");
            None
        }
    }
}

fn area_id(value: &Value) -> Option<&str> {
    single_field(value, AREA_KEY)?.as_str()
}

fn single_field<'a>(value: &'a Value, key: &str) -> Option<&'a Value> {
    let object = value.as_object()?;
    if object.len() != 1 {
        return None;
    }
    object.get(key)
}

/// Resolve every placeholder in `value` against `context`.
///
/// A malformed binding resolves to `null`; placeholders never survive.
pub fn resolve_value(value: &Value, context: &Value) -> Value {
    if is_binding(value) {
        return binding_path(value)
            .and_then(|path| resolve_path(&path, context).cloned())
            .unwrap_or(Value::Null);
    }
    if let Some(id) = area_id(value) {
        return Value::String(id.to_owned());
    }
    match value {
        Value::Object(object) => Value::Object(resolve_props(object, context)),
        Value::Array(items) => Value::Array(items.iter().map(|v| resolve_value(v, context)).collect()),
        other => other.clone(),
    }
}

pub fn resolve_props(props: &Map<String, Value>, context: &Value) -> Map<String, Value> {
    props
        .iter()
        .map(|(name, value)| (name.clone(), resolve_value(value, context)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn bindings_resolve_against_context() {
        let context = json!({"user": {"name": "Ann", "tags": ["a", "b"]}});
        let props = json!({
            "label": {"$binding": "$.user.name"},
            "first": {"$binding": "/user/tags/0"},
            "missing": {"$binding": "$.user.age"},
            "fixed": 3
        });
        assert_eq!(
            resolve_value(&props, &context),
            json!({"label": "Ann", "first": "a", "missing": null, "fixed": 3})
        );
    }

    #[test]
    fn nested_placeholders_are_replaced() {
        let props = json!({
            "columns": [{"title": {"$binding": "$.t"}}, {"$area": "main/detail"}]
        });
        assert_eq!(
            resolve_value(&props, &json!({"t": "Title"})),
            json!({"columns": [{"title": "Title"}, "main/detail"]})
        );
    }

    #[test]
    fn objects_with_extra_keys_are_not_placeholders() {
        let value = json!({"$binding": "$.a", "other": 1});
        assert_eq!(binding_path(&value), None);
        assert_eq!(
            resolve_value(&value, &json!({"a": 2})),
            json!({"$binding": "$.a", "other": 1})
        );
    }

    #[test]
    fn malformed_bindings_resolve_to_null() {
        let props = json!({
            "a": {"$binding": "items/0"},
            "b": {"$binding": 5},
            "c": [{"$binding": null}]
        });
        let resolved = resolve_value(&props, &json!({"items": [1]}));

        assert_eq!(resolved, json!({"a": null, "b": null, "c": [null]}));
        assert!(!resolved.to_string().contains(BINDING_KEY));
    }

    #[test]
    fn binding_path_accepts_both_forms() {
        let expected = Path::root().key("a").index(0);
        assert_eq!(binding_path(&json!({"$binding": "$.a[0]"})), Some(expected.clone()));
        assert_eq!(binding_path(&json!({"$binding": "/a/0"})), Some(expected));
    }
}
