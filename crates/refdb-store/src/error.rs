use refdb_types::ObjectId;

/// Errors from object store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// No object with this id is in the store.
    #[error("missing object {0}")]
    NotFound(ObjectId),

    /// An object file could not be encoded or decoded.
    #[error("object serialization error: {0}")]
    Serialization(String),

    #[error("object store I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The object decoded, but its links make no sense (e.g. a tag chain
    /// that never ends).
    #[error("corrupt object {id}: {reason}")]
    CorruptObject { id: ObjectId, reason: String },

    /// Content hashed to the null id, which is reserved for "no object".
    #[error("refusing to store an object with the null id")]
    NullObjectId,
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
