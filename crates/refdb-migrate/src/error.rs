//! Error types for format migration.

use refdb_refs::{RefError, RefStorageFormat};
use thiserror::Error;

/// Errors that can occur while migrating a ref database.
#[derive(Debug, Error)]
pub enum MigrationError {
    /// The requested format name is not recognized.
    #[error("unknown ref storage format '{0}'")]
    UnknownFormat(String),

    /// The database already uses the requested format. Nothing was written.
    #[error("repository already uses the '{0}' format")]
    AlreadyInFormat(RefStorageFormat),

    /// The migration was aborted before the new store was published. The
    /// original store is unchanged.
    #[error("migration failed: {reason}")]
    MigrationFailed {
        reason: String,
        #[source]
        source: Option<RefError>,
    },
}

impl MigrationError {
    pub(crate) fn failed(reason: impl Into<String>, source: RefError) -> Self {
        MigrationError::MigrationFailed {
            reason: reason.into(),
            source: Some(source),
        }
    }
}

/// Convenience type alias for migration operations.
pub type Result<T> = std::result::Result<T, MigrationError>;
