use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard};

use refdb_types::ObjectId;

use crate::error::{StoreError, StoreResult};
use crate::object::StoredObject;
use crate::traits::ObjectStore;

/// Object store held entirely in memory, for tests and embedding.
#[derive(Debug, Default)]
pub struct InMemoryObjectStore {
    objects: RwLock<HashMap<ObjectId, StoredObject>>,
}

impl InMemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store pre-filled with `objects`.
    pub fn from_objects(objects: impl IntoIterator<Item = StoredObject>) -> StoreResult<Self> {
        let store = Self::new();
        for object in objects {
            store.write(&object)?;
        }
        Ok(store)
    }

    fn objects(&self) -> RwLockReadGuard<'_, HashMap<ObjectId, StoredObject>> {
        self.objects.read().expect("lock poisoned")
    }

    pub fn len(&self) -> usize {
        self.objects().len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects().is_empty()
    }

    /// Drop an object, as garbage collection would. Returns whether it was
    /// present.
    pub fn prune(&self, id: &ObjectId) -> bool {
        self.objects.write().expect("lock poisoned").remove(id).is_some()
    }
}

impl ObjectStore for InMemoryObjectStore {
    fn read(&self, id: &ObjectId) -> StoreResult<Option<StoredObject>> {
        Ok(self.objects().get(id).cloned())
    }

    fn write(&self, object: &StoredObject) -> StoreResult<ObjectId> {
        let id = object.compute_id();
        if id.is_null() {
            return Err(StoreError::NullObjectId);
        }
        self.objects
            .write()
            .expect("lock poisoned")
            .entry(id)
            .or_insert_with(|| object.clone());
        Ok(id)
    }

    fn exists(&self, id: &ObjectId) -> StoreResult<bool> {
        Ok(self.objects().contains_key(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use refdb_types::ObjectKind;

    #[test]
    fn write_then_read() {
        let store = InMemoryObjectStore::new();
        let blob = StoredObject::blob("hello");
        let id = store.write(&blob).unwrap();
        assert_eq!(store.read(&id).unwrap(), Some(blob));
        assert!(store.exists(&id).unwrap());
        assert_eq!(store.kind(&id).unwrap(), ObjectKind::Blob);
    }

    #[test]
    fn writes_are_idempotent() {
        let store = InMemoryObjectStore::new();
        let blob = StoredObject::blob("same");
        let a = store.write(&blob).unwrap();
        let b = store.write(&blob).unwrap();
        assert_eq!(a, b);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn missing_objects() {
        let store = InMemoryObjectStore::new();
        let id = ObjectId::from_bytes(b"ghost");
        assert!(!store.exists(&id).unwrap());
        assert!(matches!(store.kind(&id), Err(StoreError::NotFound(_))));
    }

    #[test]
    fn peel_follows_nested_tags() {
        let store = InMemoryObjectStore::new();
        let commit = store.write(&StoredObject::commit(vec![], "c")).unwrap();
        let inner = store.write(&StoredObject::tag(commit, "inner")).unwrap();
        let outer = store.write(&StoredObject::tag(inner, "outer")).unwrap();
        assert_eq!(store.peel(&outer).unwrap(), commit);
        assert_eq!(store.peel(&commit).unwrap(), commit);
    }

    #[test]
    fn prefilled_store_and_pruning() {
        let blob = StoredObject::blob("kept");
        let store = InMemoryObjectStore::from_objects([blob.clone(), StoredObject::blob("other")]).unwrap();
        assert_eq!(store.len(), 2);
        let id = blob.compute_id();
        assert!(store.prune(&id));
        assert!(!store.prune(&id));
        assert!(store.read(&id).unwrap().is_none());
    }
}
