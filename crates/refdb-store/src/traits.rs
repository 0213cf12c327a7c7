use refdb_types::{ObjectId, ObjectKind};

use crate::error::{StoreError, StoreResult};
use crate::object::StoredObject;

/// Content-addressed object store.
///
/// All implementations must satisfy these invariants:
/// - Objects are immutable once written; the same content always produces
///   the same ID.
/// - Concurrent reads are always safe.
/// - All I/O errors are propagated, never silently ignored.
pub trait ObjectStore {
    /// Read an object by its content-addressed ID.
    ///
    /// Returns `Ok(None)` if the object does not exist.
    fn read(&self, id: &ObjectId) -> StoreResult<Option<StoredObject>>;

    /// Write an object and return its content-addressed ID.
    ///
    /// If the object already exists, this is a no-op.
    fn write(&self, object: &StoredObject) -> StoreResult<ObjectId>;

    /// Check whether an object exists in the store.
    fn exists(&self, id: &ObjectId) -> StoreResult<bool> {
        Ok(self.read(id)?.is_some())
    }

    /// The kind of an existing object.
    fn kind(&self, id: &ObjectId) -> StoreResult<ObjectKind> {
        self.require(id).map(|obj| obj.kind)
    }

    /// Read an object, failing with [`StoreError::NotFound`] if absent.
    fn require(&self, id: &ObjectId) -> StoreResult<StoredObject> {
        self.read(id)?.ok_or(StoreError::NotFound(*id))
    }

    /// Follow annotated tags until a non-tag object is reached.
    ///
    /// Chains longer than 64 tags are treated as corrupt.
    fn peel(&self, id: &ObjectId) -> StoreResult<ObjectId> {
        let mut current = *id;
        for _ in 0..64 {
            let obj = self.require(&current)?;
            match obj.tag_target() {
                Some(next) => current = next,
                None => return Ok(current),
            }
        }
        Err(StoreError::CorruptObject {
            id: *id,
            reason: "tag chain too deep".into(),
        })
    }
}

impl<S: ObjectStore + ?Sized> ObjectStore for &S {
    fn read(&self, id: &ObjectId) -> StoreResult<Option<StoredObject>> {
        (**self).read(id)
    }

    fn write(&self, object: &StoredObject) -> StoreResult<ObjectId> {
        (**self).write(object)
    }

    fn exists(&self, id: &ObjectId) -> StoreResult<bool> {
        (**self).exists(id)
    }
}
