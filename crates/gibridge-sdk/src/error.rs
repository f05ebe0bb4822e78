//! Error types for the binding layer

use crate::value::ScriptValue;

/// Result type for bridge operations
pub type BridgeResult<T> = Result<T, BridgeError>;

/// Bridge error types
///
/// Every variant except [`BridgeError::Exception`] describes a failure that the
/// engine turns into a script error object when it crosses into script code.
#[derive(Debug, Clone, thiserror::Error)]
pub enum BridgeError {
    /// Script value has the wrong kind for the requested conversion
    #[error("Type mismatch: expected {expected}, got {got}")]
    NotConvertible {
        /// Expected type name
        expected: String,
        /// Actual type name
        got: String,
    },

    /// Script-level TypeError
    #[error("{0}")]
    TypeError(String),

    /// Script-level RangeError
    #[error("{0}")]
    RangeError(String),

    /// Introspection info kind that the definer family cannot expose
    #[error("API of type {kind} not implemented, cannot define {namespace}.{name}")]
    Unsupported {
        /// Upper-case info kind name (e.g. `CALLBACK`)
        kind: &'static str,
        /// Namespace of the offending info
        namespace: String,
        /// Name of the offending info
        name: String,
    },

    /// Generic failure
    #[error("{0}")]
    Failed(String),

    /// A script value was thrown
    #[error("uncaught exception: {0:?}")]
    Exception(ScriptValue),
}

impl BridgeError {
    /// Name of the script error constructor this error maps to.
    pub fn error_name(&self) -> &'static str {
        match self {
            BridgeError::NotConvertible { .. } | BridgeError::TypeError(_) => "TypeError",
            BridgeError::RangeError(_) => "RangeError",
            BridgeError::Unsupported { .. } | BridgeError::Failed(_) | BridgeError::Exception(_) => {
                "Error"
            }
        }
    }

    /// Build a [`BridgeError::NotConvertible`] from a value's type name.
    pub fn not_convertible(expected: impl Into<String>, got: &ScriptValue) -> Self {
        BridgeError::NotConvertible {
            expected: expected.into(),
            got: got.type_name().to_string(),
        }
    }

    /// The thrown value, if this error carries one.
    pub fn exception(&self) -> Option<&ScriptValue> {
        match self {
            BridgeError::Exception(value) => Some(value),
            _ => None,
        }
    }
}

impl From<String> for BridgeError {
    fn from(s: String) -> Self {
        BridgeError::Failed(s)
    }
}

impl From<&str> for BridgeError {
    fn from(s: &str) -> Self {
        BridgeError::Failed(s.to_string())
    }
}

/// Failures reported by a [`Repository`](crate::repository::Repository)
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RepositoryError {
    /// No typelib for the namespace
    #[error("Typelib file for namespace '{namespace}' not found")]
    NamespaceNotFound {
        /// Requested namespace
        namespace: String,
    },

    /// Namespace exists but not at the requested version
    #[error("Typelib file for namespace '{namespace}', version '{version}' not found")]
    VersionNotFound {
        /// Requested namespace
        namespace: String,
        /// Requested version
        version: String,
    },

    /// A different version of the namespace is already loaded
    #[error("Requiring namespace '{namespace}' version '{requested}', but '{loaded}' is already loaded")]
    VersionConflict {
        /// Requested namespace
        namespace: String,
        /// Requested version
        requested: String,
        /// Version already loaded
        loaded: String,
    },
}
