//! Error types for ref listing.

use refdb_refs::RefError;
use refdb_store::StoreError;
use thiserror::Error;

/// Errors that can occur while listing refs.
///
/// Every variant except `Ref` and `Store` is a request problem, detected
/// before any output is produced.
#[derive(Debug, Error)]
pub enum FilterError {
    #[error("invalid format: {0}")]
    InvalidFormat(String),

    #[error("more than one quoting style")]
    ConflictingQuoteStyle,

    #[error("unknown arguments supplied with --stdin")]
    ConflictingPatternSources,

    #[error("invalid sort key '{0}'")]
    InvalidSortKey(String),

    #[error("invalid --count argument: '{0}'")]
    InvalidCount(i64),

    #[error("ref database error: {0}")]
    Ref(#[from] RefError),

    #[error("object store error: {0}")]
    Store(#[from] StoreError),
}

/// Convenience type alias for listing operations.
pub type Result<T> = std::result::Result<T, FilterError>;
