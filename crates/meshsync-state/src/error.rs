//! Error types for meshsync-state operations.

use crate::Path;
use thiserror::Error;

/// Result type alias for meshsync-state operations.
pub type StateResult<T> = Result<T, StateError>;

/// Errors that can occur while parsing paths or strictly applying patches.
#[derive(Debug, Error)]
pub enum StateError {
    /// Path does not exist in the document.
    #[error("path not found: {path}")]
    PathNotFound {
        /// The path that was not found.
        path: Path,
    },

    /// Array index is out of bounds.
    #[error("index {index} out of bounds (len: {len}) at path {path}")]
    IndexOutOfBounds {
        /// The path to the array element.
        path: Path,
        /// The index that was accessed.
        index: usize,
        /// The actual length of the array.
        len: usize,
    },

    /// Type mismatch when traversing a value.
    #[error("type mismatch at {path}: expected {expected}, found {found}")]
    TypeMismatch {
        /// The path where the mismatch occurred.
        path: Path,
        /// The expected type.
        expected: &'static str,
        /// The actual type found.
        found: &'static str,
    },

    /// A textual path or reference could not be parsed.
    #[error("invalid path '{input}': {message}")]
    InvalidPath {
        /// The rejected input.
        input: String,
        /// What was wrong with it.
        message: String,
    },

    /// JSON serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StateError {
    /// Create a path not found error.
    #[inline]
    pub fn path_not_found(path: Path) -> Self {
        StateError::PathNotFound { path }
    }

    /// Create an index out of bounds error.
    #[inline]
    pub fn index_out_of_bounds(path: Path, index: usize, len: usize) -> Self {
        StateError::IndexOutOfBounds { path, index, len }
    }

    /// Create a type mismatch error.
    #[inline]
    pub fn type_mismatch(path: Path, expected: &'static str, found: &'static str) -> Self {
        StateError::TypeMismatch {
            path,
            expected,
            found,
        }
    }

    /// Create an invalid path error.
    #[inline]
    pub fn invalid_path(input: impl Into<String>, message: impl Into<String>) -> Self {
        StateError::InvalidPath {
            input: input.into(),
            message: message.into(),
        }
    }

    /// Whether the error means "the target did not resolve".
    ///
    /// Misses are tolerated by lenient patch application.
    pub fn is_miss(&self) -> bool {
        matches!(
            self,
            StateError::PathNotFound { .. }
                | StateError::IndexOutOfBounds { .. }
                | StateError::TypeMismatch { .. }
        )
    }
}

/// Get the type name of a JSON value.
#[inline]
pub fn value_type_name(v: &serde_json::Value) -> &'static str {
    match v {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path;

    #[test]
    fn test_error_display() {
        let err = StateError::path_not_found(path!("users", 0, "name"));
        assert_eq!(err.to_string(), "path not found: $.users[0].name");
        assert!(err.is_miss());
        assert!(!StateError::invalid_path("x", "bad").is_miss());
    }

    #[test]
    fn test_value_type_name() {
        use serde_json::json;

        assert_eq!(value_type_name(&json!(null)), "null");
        assert_eq!(value_type_name(&json!(true)), "boolean");
        assert_eq!(value_type_name(&json!(42)), "number");
        assert_eq!(value_type_name(&json!("hello")), "string");
        assert_eq!(value_type_name(&json!([1, 2, 3])), "array");
        assert_eq!(value_type_name(&json!({"a": 1})), "object");
    }
}
