//! Error types for reference operations.

use thiserror::Error;

/// Errors that can occur during reference operations.
#[derive(Debug, Error)]
pub enum RefError {
    /// The reference was not found.
    #[error("ref not found: {name}")]
    NotFound { name: String },

    /// A precondition of a batch did not hold, or two names collide.
    #[error("conflict on {name}: {reason}")]
    Conflict { name: String, reason: String },

    /// The reference name does not satisfy the refname grammar.
    #[error("invalid ref name {name:?}: {reason}")]
    InvalidName { name: String, reason: String },

    /// Following symbolic refs from `name` loops or nests too deeply.
    #[error("symbolic ref cycle starting at {name}")]
    SymbolicCycle { name: String },

    /// Stored data could not be decoded.
    #[error("corrupt ref data at {location}: {reason}")]
    Corrupt { location: String, reason: String },

    /// The storage format name is not recognized.
    #[error("unknown ref storage format '{0}'")]
    UnknownFormat(String),

    /// The path does not hold a store of the expected format.
    #[error("unsupported store at {path}: {reason}")]
    UnsupportedFormat { path: String, reason: String },

    /// Repository configuration could not be parsed.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Serialization or deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// I/O error during file-based ref operations.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl RefError {
    pub(crate) fn conflict(name: impl Into<String>, reason: impl Into<String>) -> Self {
        RefError::Conflict {
            name: name.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn corrupt(location: impl Into<String>, reason: impl Into<String>) -> Self {
        RefError::Corrupt {
            location: location.into(),
            reason: reason.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, RefError::NotFound { .. })
    }
}

/// Convenience type alias for ref operations.
pub type Result<T> = std::result::Result<T, RefError>;
