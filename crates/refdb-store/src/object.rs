use serde::{Deserialize, Serialize};

use refdb_types::{ObjectId, ObjectKind};

/// A stored object: kind tag, outgoing links, and opaque data.
///
/// `links` holds the parents of a commit or the single target of an
/// annotated tag; blobs and trees carry none. The id covers all three fields
/// so that two commits with identical data but different parents differ.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredObject {
    pub kind: ObjectKind,
    #[serde(default)]
    pub links: Vec<ObjectId>,
    pub data: Vec<u8>,
}

impl StoredObject {
    pub fn new(kind: ObjectKind, links: Vec<ObjectId>, data: Vec<u8>) -> Self {
        Self { kind, links, data }
    }

    pub fn blob(data: impl Into<Vec<u8>>) -> Self {
        Self::new(ObjectKind::Blob, Vec::new(), data.into())
    }

    pub fn commit(parents: Vec<ObjectId>, message: impl Into<Vec<u8>>) -> Self {
        Self::new(ObjectKind::Commit, parents, message.into())
    }

    /// An annotated tag pointing at `target`.
    pub fn tag(target: ObjectId, message: impl Into<Vec<u8>>) -> Self {
        Self::new(ObjectKind::Tag, vec![target], message.into())
    }

    /// Size of the object payload in bytes.
    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }

    /// Commit parents; empty for every other kind.
    pub fn parents(&self) -> &[ObjectId] {
        match self.kind {
            ObjectKind::Commit => &self.links,
            _ => &[],
        }
    }

    /// The object an annotated tag points at.
    pub fn tag_target(&self) -> Option<ObjectId> {
        match self.kind {
            ObjectKind::Tag => self.links.first().copied(),
            _ => None,
        }
    }

    /// Compute the content-addressed ID for this object.
    pub fn compute_id(&self) -> ObjectId {
        let mut buf = Vec::with_capacity(16 + self.links.len() * 32 + self.data.len());
        buf.extend_from_slice(self.kind.as_str().as_bytes());
        buf.push(0);
        for link in &self.links {
            buf.extend_from_slice(link.as_bytes());
        }
        buf.push(0);
        buf.extend_from_slice(&self.data);
        ObjectId::from_bytes(&buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parents_change_the_id() {
        let root = StoredObject::commit(vec![], "root");
        let a = StoredObject::commit(vec![], "same");
        let b = StoredObject::commit(vec![root.compute_id()], "same");
        assert_ne!(a.compute_id(), b.compute_id());
    }

    #[test]
    fn kind_changes_the_id() {
        let blob = StoredObject::blob("x");
        let commit = StoredObject::commit(vec![], "x");
        assert_ne!(blob.compute_id(), commit.compute_id());
    }

    #[test]
    fn tag_exposes_target_but_no_parents() {
        let commit = StoredObject::commit(vec![], "c");
        let tag = StoredObject::tag(commit.compute_id(), "v1");
        assert_eq!(tag.tag_target(), Some(commit.compute_id()));
        assert!(tag.parents().is_empty());
        assert_eq!(commit.tag_target(), None);
    }
}
