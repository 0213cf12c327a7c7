//! Error types for ref verification.
//!
//! Problems found in the stored refs are not errors: they are collected as
//! violations in a report. These errors stop verification of one database.

use refdb_refs::RefError;
use refdb_store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FsckError {
    /// The `[fsck]` configuration names an unknown check or severity.
    #[error("invalid fsck configuration: {0}")]
    Config(String),

    #[error("ref database error: {0}")]
    Ref(#[from] RefError),

    #[error("object store error: {0}")]
    Store(#[from] StoreError),
}

/// Convenience type alias for verification operations.
pub type Result<T> = std::result::Result<T, FsckError>;
