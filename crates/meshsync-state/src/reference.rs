//! References: addressable locations inside a snapshot.
//!
//! A reference is either a raw [`Path`], an entity inside a named collection,
//! or a whole collection. Every reference resolves to a path, so resolution
//! and slicing only ever deal with paths.

use crate::{Path, Seg, StateError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// A location inside a snapshot.
///
/// References compare by value; two references with equal fields address the
/// same location.
///
/// # Examples
///
/// ```
/// use meshsync_state::{resolve, Reference};
/// use serde_json::json;
///
/// let doc = json!({"users": {"u1": {"name": "Alice"}}});
/// let user = Reference::entity("users", "u1");
/// assert_eq!(user.to_path().to_pointer(), "/users/u1");
/// assert_eq!(resolve(&user, &doc), Some(&json!({"name": "Alice"})));
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "ReferenceRepr", into = "ReferenceRepr")]
pub enum Reference {
    /// A raw path resolved with JSON pointer semantics.
    Path(Path),
    /// One entity in a named collection.
    Entity {
        /// Name of the collection (a top-level object keyed by id).
        collection: String,
        /// Entity id within the collection.
        id: String,
    },
    /// An entire named collection.
    Collection {
        /// Name of the collection.
        collection: String,
    },
}

impl Reference {
    /// Reference the document root.
    pub fn root() -> Self {
        Reference::Path(Path::root())
    }

    /// Reference a raw path.
    pub fn path(path: Path) -> Self {
        Reference::Path(path)
    }

    /// Parse a path reference from either the JSONPath or the pointer form.
    pub fn parse_path(input: &str) -> Result<Self, StateError> {
        Path::parse(input).map(Reference::Path)
    }

    /// Reference one entity of a collection.
    pub fn entity(collection: impl Into<String>, id: impl Into<String>) -> Self {
        Reference::Entity {
            collection: collection.into(),
            id: id.into(),
        }
    }

    /// Reference a whole collection.
    pub fn collection(collection: impl Into<String>) -> Self {
        Reference::Collection {
            collection: collection.into(),
        }
    }

    /// The path this reference resolves through.
    pub fn to_path(&self) -> Path {
        match self {
            Reference::Path(path) => path.clone(),
            Reference::Entity { collection, id } => {
                Path::root().key(collection.clone()).key(id.clone())
            }
            Reference::Collection { collection } => Path::root().key(collection.clone()),
        }
    }

    /// Reference a location below this one.
    pub fn child(&self, seg: impl Into<Seg>) -> Reference {
        Reference::Path(self.to_path().with_segment(seg.into()))
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reference::Path(path) => write!(f, "{path}"),
            Reference::Entity { collection, id } => write!(f, "{collection}/{id}"),
            Reference::Collection { collection } => write!(f, "{collection}"),
        }
    }
}

impl From<Path> for Reference {
    fn from(path: Path) -> Self {
        Reference::Path(path)
    }
}

/// Resolve a path against a snapshot.
///
/// Never fails: a missing intermediate node yields `None`. An index segment
/// applied to an object looks up its decimal key; a key segment applied to an
/// array is read as an index when it is numeric.
pub fn resolve_path<'a>(path: &Path, doc: &'a Value) -> Option<&'a Value> {
    let mut current = doc;
    for seg in path.segments() {
        current = match current {
            Value::Object(map) => map.get(&seg.to_key())?,
            Value::Array(items) => items.get(seg.to_index()?)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Resolve a reference against a snapshot.
///
/// Every variant goes through [`Reference::to_path`], so reads agree with
/// patches written at the same reference.
pub fn resolve<'a>(reference: &Reference, doc: &'a Value) -> Option<&'a Value> {
    match reference {
        Reference::Path(path) => resolve_path(path, doc),
        other => resolve_path(&other.to_path(), doc),
    }
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum ReferenceRepr {
    Path(String),
    Typed(TypedReference),
}

#[derive(Serialize, Deserialize)]
#[serde(tag = "$type")]
enum TypedReference {
    EntityReference { collection: String, id: String },
    CollectionReference { collection: String },
}

impl TryFrom<ReferenceRepr> for Reference {
    type Error = StateError;

    fn try_from(repr: ReferenceRepr) -> Result<Self, Self::Error> {
        match repr {
            ReferenceRepr::Path(raw) => Path::parse(&raw).map(Reference::Path),
            ReferenceRepr::Typed(TypedReference::EntityReference { collection, id }) => {
                Ok(Reference::Entity { collection, id })
            }
            ReferenceRepr::Typed(TypedReference::CollectionReference { collection }) => {
                Ok(Reference::Collection { collection })
            }
        }
    }
}

impl From<Reference> for ReferenceRepr {
    fn from(reference: Reference) -> Self {
        match reference {
            Reference::Path(path) => ReferenceRepr::Path(path.to_string()),
            Reference::Entity { collection, id } => {
                ReferenceRepr::Typed(TypedReference::EntityReference { collection, id })
            }
            Reference::Collection { collection } => {
                ReferenceRepr::Typed(TypedReference::CollectionReference { collection })
            }
        }
    }
}
