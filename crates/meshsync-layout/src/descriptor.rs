//! Control descriptors as stored in the layout workspace.

use crate::error::{LayoutError, LayoutResult};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Renderer family of a descriptor, selected once per mount.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ControlKind {
    /// A leaf control: publishes its own model only.
    #[default]
    Generic,
    /// Holds nested areas, one child renderer each.
    Stack,
    /// Repeats `view` for every element of the `data` array.
    ItemTemplate,
    /// Any other kind; needs a factory registered under its name.
    Custom(String),
}

impl ControlKind {
    pub fn as_str(&self) -> &str {
        match self {
            ControlKind::Generic => "generic",
            ControlKind::Stack => "stack",
            ControlKind::ItemTemplate => "itemTemplate",
            ControlKind::Custom(name) => name,
        }
    }
}

impl From<String> for ControlKind {
    fn from(raw: String) -> Self {
        match raw.as_str() {
            "generic" => ControlKind::Generic,
            "stack" => ControlKind::Stack,
            "itemTemplate" => ControlKind::ItemTemplate,
            _ => ControlKind::Custom(raw),
        }
    }
}

impl From<&str> for ControlKind {
    fn from(raw: &str) -> Self {
        ControlKind::from(raw.to_owned())
    }
}

impl From<ControlKind> for String {
    fn from(kind: ControlKind) -> Self {
        kind.as_str().to_owned()
    }
}

impl fmt::Display for ControlKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One control in the layout tree.
///
/// ```json
/// {
///   "component": "TextBox",
///   "kind": "generic",
///   "dataContext": "$.user",
///   "props": {"value": {"$binding": "$.name"}}
/// }
/// ```
///
/// Paths in `dataContext`, `data` and bindings are resolved against the
/// nearest data context and accept both the JSONPath and the pointer form.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControlDescriptor {
    /// Component type name published to the application store.
    pub component: String,
    #[serde(default)]
    pub kind: ControlKind,
    #[serde(default)]
    pub props: Map<String, Value>,
    /// Slice the data context to this path for this control and its children.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_context: Option<String>,
    /// Nested area ids of a stack control.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub areas: Vec<String>,
    /// Path of the array an item template repeats over.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
    /// Template descriptor for each item.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub view: Option<Box<ControlDescriptor>>,
}

impl ControlDescriptor {
    pub fn new(component: impl Into<String>, kind: impl Into<ControlKind>) -> Self {
        Self {
            component: component.into(),
            kind: kind.into(),
            props: Map::new(),
            data_context: None,
            areas: Vec::new(),
            data: None,
            view: None,
        }
    }

    #[must_use]
    pub fn with_prop(mut self, name: impl Into<String>, value: Value) -> Self {
        self.props.insert(name.into(), value);
        self
    }

    #[must_use]
    pub fn with_data_context(mut self, path: impl Into<String>) -> Self {
        self.data_context = Some(path.into());
        self
    }

    #[must_use]
    pub fn with_areas<I, S>(mut self, areas: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.areas = areas.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn with_items(mut self, data: impl Into<String>, view: ControlDescriptor) -> Self {
        self.data = Some(data.into());
        self.view = Some(Box::new(view));
        self
    }

    /// Decode the value found at an area. `null` means no control.
    pub fn from_value(area: &str, value: &Value) -> LayoutResult<Option<Self>> {
        if value.is_null() {
            return Ok(None);
        }
        serde_json::from_value(value.clone())
            .map(Some)
            .map_err(|source| LayoutError::InvalidDescriptor {
                area: area.to_owned(),
                source,
            })
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    pub fn mount_key(&self) -> MountKey {
        MountKey {
            kind: self.kind.clone(),
            component: self.component.clone(),
            data_context: self.data_context.clone(),
        }
    }
}

/// Identity of a mounted renderer. Descriptors with equal keys update the
/// mounted renderer in place; any other change remounts.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct MountKey {
    pub kind: ControlKind,
    pub component: String,
    pub data_context: Option<String>,
}
