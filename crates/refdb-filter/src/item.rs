use refdb_refs::RefTarget;
use refdb_store::ObjectStore;
use refdb_types::{ObjectId, ObjectKind};

use crate::error::Result;

/// Facts about the object a ref resolves to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ObjectInfo {
    pub kind: ObjectKind,
    pub size: u64,
}

/// A ref that passed the filters, with everything needed to sort and
/// render it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RefItem {
    pub name: String,
    pub target: RefTarget,
    /// The object the ref resolves to after following symbolic refs.
    pub id: ObjectId,
    /// Loaded on demand.
    pub object: Option<ObjectInfo>,
}

impl RefItem {
    pub fn new(name: String, target: RefTarget, id: ObjectId) -> Self {
        Self {
            name,
            target,
            id,
            object: None,
        }
    }

    pub fn load_object<S: ObjectStore + ?Sized>(&mut self, store: &S) -> Result<ObjectInfo> {
        if let Some(info) = self.object {
            return Ok(info);
        }
        let object = store.require(&self.id)?;
        let info = ObjectInfo {
            kind: object.kind,
            size: object.size(),
        };
        self.object = Some(info);
        Ok(info)
    }
}
