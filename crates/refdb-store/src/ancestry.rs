//! Commit ancestry queries over an [`ObjectStore`].
//!
//! Walks are breadth-first over commit parents. Annotated tags are peeled
//! before walking, so a tag naming a commit behaves like the commit itself.
//! Objects that are not commits have no parents and only reach themselves.

use std::collections::{HashSet, VecDeque};

use refdb_types::ObjectId;

use crate::error::StoreResult;
use crate::traits::ObjectStore;

/// Every object reachable from `tip` through parent links, `tip` included.
pub fn ancestor_set<S: ObjectStore + ?Sized>(store: &S, tip: &ObjectId) -> StoreResult<HashSet<ObjectId>> {
    let start = store.peel(tip)?;
    let mut visited = HashSet::new();
    visited.insert(start);
    let mut queue = VecDeque::from([start]);

    while let Some(current) = queue.pop_front() {
        let object = store.require(&current)?;
        for parent in object.parents() {
            if visited.insert(*parent) {
                queue.push_back(*parent);
            }
        }
    }
    Ok(visited)
}

/// Returns `true` if `ancestor` is reachable from `descendant` (or equal).
pub fn is_ancestor<S: ObjectStore + ?Sized>(
    store: &S,
    ancestor: &ObjectId,
    descendant: &ObjectId,
) -> StoreResult<bool> {
    let target = store.peel(ancestor)?;
    let start = store.peel(descendant)?;
    if target == start {
        return Ok(true);
    }

    let mut visited = HashSet::new();
    visited.insert(start);
    let mut queue = VecDeque::from([start]);

    while let Some(current) = queue.pop_front() {
        let object = store.require(&current)?;
        for parent in object.parents() {
            if *parent == target {
                return Ok(true);
            }
            if visited.insert(*parent) {
                queue.push_back(*parent);
            }
        }
    }
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryObjectStore;
    use crate::object::StoredObject;

    /// root <- a <- b, root <- side; merge has parents b and side.
    fn diamond() -> (InMemoryObjectStore, [ObjectId; 5]) {
        let store = InMemoryObjectStore::new();
        let root = store.write(&StoredObject::commit(vec![], "root")).unwrap();
        let a = store.write(&StoredObject::commit(vec![root], "a")).unwrap();
        let b = store.write(&StoredObject::commit(vec![a], "b")).unwrap();
        let side = store.write(&StoredObject::commit(vec![root], "side")).unwrap();
        let merge = store.write(&StoredObject::commit(vec![b, side], "merge")).unwrap();
        (store, [root, a, b, side, merge])
    }

    #[test]
    fn commit_is_its_own_ancestor() {
        let (store, [root, ..]) = diamond();
        assert!(is_ancestor(&store, &root, &root).unwrap());
    }

    #[test]
    fn linear_and_merge_ancestry() {
        let (store, [root, a, b, side, merge]) = diamond();
        assert!(is_ancestor(&store, &root, &b).unwrap());
        assert!(is_ancestor(&store, &a, &merge).unwrap());
        assert!(is_ancestor(&store, &side, &merge).unwrap());
        assert!(!is_ancestor(&store, &side, &b).unwrap());
        assert!(!is_ancestor(&store, &merge, &root).unwrap());
    }

    #[test]
    fn ancestor_set_includes_tip() {
        let (store, [root, a, b, side, merge]) = diamond();
        let set = ancestor_set(&store, &merge).unwrap();
        for id in [root, a, b, side, merge] {
            assert!(set.contains(&id));
        }
        let set = ancestor_set(&store, &side).unwrap();
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn tags_are_peeled() {
        let (store, [root, _, b, ..]) = diamond();
        let tag = store.write(&StoredObject::tag(b, "v1")).unwrap();
        assert!(is_ancestor(&store, &root, &tag).unwrap());
        assert!(ancestor_set(&store, &tag).unwrap().contains(&b));
    }
}
