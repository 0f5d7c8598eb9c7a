//! Application-facing store of resolved control models.

use meshsync_workspace::{Subscription, Workspace};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A binding-free control, as consumed by the rendering layer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControlModel {
    pub component_type_name: String,
    #[serde(default)]
    pub props: Map<String, Value>,
}

impl ControlModel {
    pub fn new(component_type_name: impl Into<String>, props: Map<String, Value>) -> Self {
        Self {
            component_type_name: component_type_name.into(),
            props,
        }
    }

    fn to_value(&self) -> Value {
        let mut object = Map::new();
        object.insert(
            "componentTypeName".into(),
            Value::String(self.component_type_name.clone()),
        );
        object.insert("props".into(), Value::Object(self.props.clone()));
        Value::Object(object)
    }
}

/// Area id to [`ControlModel`], held in its own workspace.
///
/// Construct one per layout session and hand it to the rendering layer;
/// there is no shared global store.
#[derive(Clone)]
pub struct ControlModelStore {
    workspace: Workspace,
}

impl Default for ControlModelStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ControlModelStore {
    pub fn new() -> Self {
        Self {
            workspace: Workspace::new("control-models", Value::Object(Map::new())),
        }
    }

    /// The backing workspace: `{"<area id>": {"componentTypeName", "props"}}`.
    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    /// Store the model for `area`. Publishing an equal model is a no-op and
    /// returns `false`.
    pub fn publish(&self, area: &str, model: &ControlModel) -> bool {
        let value = model.to_value();
        let published = self.workspace.try_update_with(|doc| {
            if doc.get(area) == Some(&value) {
                return None;
            }
            let mut next = doc.as_object().cloned().unwrap_or_default();
            next.insert(area.to_owned(), value.clone());
            Some(Value::Object(next))
        });
        if published {
            tracing::trace!(area, component = %model.component_type_name, "control model published");
        }
        published
    }

    pub fn remove(&self, area: &str) -> bool {
        self.workspace.try_update_with(|doc| {
            let mut next = doc.as_object()?.clone();
            next.remove(area)?;
            Some(Value::Object(next))
        })
    }

    pub fn get(&self, area: &str) -> Option<ControlModel> {
        let value = self.workspace.current().get(area).cloned()?;
        serde_json::from_value(value).ok()
    }

    pub fn contains(&self, area: &str) -> bool {
        self.workspace.current().get(area).is_some()
    }

    /// Area ids with a published model, sorted.
    pub fn areas(&self) -> Vec<String> {
        let mut areas: Vec<String> = self
            .workspace
            .current()
            .as_object()
            .map(|o| o.keys().cloned().collect())
            .unwrap_or_default();
        areas.sort();
        areas
    }

    /// Observe the whole store.
    pub fn subscribe(&self, observer: impl Fn(&Value) + Send + Sync + 'static) -> Subscription {
        self.workspace.subscribe(observer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn model(text: &str) -> ControlModel {
        let mut props = Map::new();
        props.insert("text".into(), json!(text));
        ControlModel::new("Label", props)
    }

    #[test]
    fn publish_stores_wire_shape() {
        let store = ControlModelStore::new();
        assert!(store.publish("main", &model("hi")));
        assert_eq!(
            store.workspace().current(),
            json!({"main": {"componentTypeName": "Label", "props": {"text": "hi"}}})
        );
        assert_eq!(store.get("main"), Some(model("hi")));
    }

    #[test]
    fn equal_models_are_not_republished() {
        let store = ControlModelStore::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let c = calls.clone();
        let _sub = store.subscribe(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });

        assert!(store.publish("main", &model("a")));
        assert!(!store.publish("main", &model("a")));
        assert!(store.publish("main", &model("b")));

        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn remove_drops_only_that_area() {
        let store = ControlModelStore::new();
        store.publish("main/a", &model("a"));
        store.publish("main/b", &model("b"));

        assert!(store.remove("main/a"));
        assert!(!store.remove("main/a"));

        assert_eq!(store.areas(), vec!["main/b".to_string()]);
        assert!(!store.contains("main/a"));
    }
}
