//! Ref selection: name patterns, categories, and object predicates.

use std::collections::HashSet;

use bitflags::bitflags;
use glob::{MatchOptions, Pattern};

use refdb_refs::names::{self, Namespace};
use refdb_store::{ancestor_set, ObjectStore, StoreError};
use refdb_types::ObjectId;

use crate::error::Result;

bitflags! {
    /// Ref categories a listing is restricted to. Empty means every ref
    /// under `refs/`.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct RefKinds: u8 {
        const BRANCHES = 1 << 0;
        const TAGS     = 1 << 1;
        const REMOTES  = 1 << 2;
        const OTHERS   = 1 << 3;
    }
}

impl RefKinds {
    /// Whether `name` passes the category gate.
    pub fn admits(&self, name: &str, include_root_refs: bool) -> bool {
        let namespace = names::namespace(name);
        if namespace == Namespace::Root {
            return include_root_refs && names::is_root_ref(name);
        }
        if self.is_empty() {
            return name.starts_with("refs/");
        }
        let kind = match namespace {
            Namespace::Branch => RefKinds::BRANCHES,
            Namespace::Tag => RefKinds::TAGS,
            Namespace::Remote => RefKinds::REMOTES,
            Namespace::Root | Namespace::Other => RefKinds::OTHERS,
        };
        self.contains(kind)
    }
}

/// Matches ref names against patterns "as paths".
///
/// A pattern matches if it equals the name, is a prefix of it ending at a
/// `/` boundary, or glob-matches it with wildcards that do not cross `/`.
#[derive(Clone, Debug, Default)]
pub struct NameMatcher {
    patterns: Vec<(String, Option<Pattern>)>,
    ignore_case: bool,
}

impl NameMatcher {
    pub fn new<I, P>(patterns: I, ignore_case: bool) -> Self
    where
        I: IntoIterator<Item = P>,
        P: AsRef<str>,
    {
        let patterns = patterns
            .into_iter()
            .map(|p| {
                let p = p.as_ref();
                // A pattern that is not a valid glob still matches literally.
                (p.to_string(), Pattern::new(p).ok())
            })
            .collect();
        Self {
            patterns,
            ignore_case,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn matches(&self, name: &str) -> bool {
        self.patterns.iter().any(|(text, glob)| self.matches_one(name, text, glob.as_ref()))
    }

    fn matches_one(&self, name: &str, text: &str, glob: Option<&Pattern>) -> bool {
        let (name_cmp, text_cmp) = if self.ignore_case {
            (name.to_lowercase(), text.to_lowercase())
        } else {
            (name.to_string(), text.to_string())
        };
        if let Some(rest) = name_cmp.strip_prefix(&text_cmp) {
            if rest.is_empty() || rest.starts_with('/') || text_cmp.ends_with('/') {
                return true;
            }
        }
        let options = MatchOptions {
            case_sensitive: !self.ignore_case,
            require_literal_separator: true,
            require_literal_leading_dot: false,
        };
        glob.is_some_and(|g| g.matches_with(name, options))
    }
}

/// Predicates on the object a ref points at.
#[derive(Clone, Debug, Default)]
pub struct ObjectFilter {
    pub points_at: Vec<ObjectId>,
    pub merged: Vec<ObjectId>,
    pub no_merged: Vec<ObjectId>,
    pub contains: Vec<ObjectId>,
    pub no_contains: Vec<ObjectId>,
}

impl ObjectFilter {
    pub fn is_empty(&self) -> bool {
        self.points_at.is_empty()
            && self.merged.is_empty()
            && self.no_merged.is_empty()
            && self.contains.is_empty()
            && self.no_contains.is_empty()
    }

    /// Precompute what can be shared between refs.
    pub fn prepare<'s, S: ObjectStore + ?Sized>(&self, store: &'s S) -> Result<PreparedObjectFilter<'s, S>> {
        let reachable = |tips: &[ObjectId]| -> Result<Vec<HashSet<ObjectId>>> {
            tips.iter()
                .map(|tip| {
                    let commit = store.peel(tip)?;
                    Ok(ancestor_set(store, &commit)?)
                })
                .collect()
        };
        let peel_all = |ids: &[ObjectId]| -> Result<Vec<ObjectId>> {
            ids.iter().map(|id| Ok(store.peel(id)?)).collect()
        };
        Ok(PreparedObjectFilter {
            store,
            points_at: self.points_at.iter().copied().collect(),
            merged: reachable(&self.merged)?,
            no_merged: reachable(&self.no_merged)?,
            contains: peel_all(&self.contains)?,
            no_contains: peel_all(&self.no_contains)?,
        })
    }
}

/// An [`ObjectFilter`] with ancestry of the given commits resolved.
pub struct PreparedObjectFilter<'s, S: ObjectStore + ?Sized> {
    store: &'s S,
    points_at: HashSet<ObjectId>,
    merged: Vec<HashSet<ObjectId>>,
    no_merged: Vec<HashSet<ObjectId>>,
    contains: Vec<ObjectId>,
    no_contains: Vec<ObjectId>,
}

impl<S: ObjectStore + ?Sized> PreparedObjectFilter<'_, S> {
    /// Whether the ref resolving to `id` passes every predicate. Objects
    /// missing from the store fail the ancestry predicates.
    pub fn admits(&self, id: &ObjectId) -> Result<bool> {
        if !self.points_at.is_empty() {
            let hit = self.points_at.contains(id)
                || match self.store.peel(id) {
                    Ok(peeled) => self.points_at.contains(&peeled),
                    Err(StoreError::NotFound(_)) => false,
                    Err(e) => return Err(e.into()),
                };
            if !hit {
                return Ok(false);
            }
        }

        let needs_ancestry = !(self.merged.is_empty()
            && self.no_merged.is_empty()
            && self.contains.is_empty()
            && self.no_contains.is_empty());
        if !needs_ancestry {
            return Ok(true);
        }

        let commit = match self.store.peel(id) {
            Ok(commit) => commit,
            Err(StoreError::NotFound(_)) => return Ok(false),
            Err(e) => return Err(e.into()),
        };
        if !self.merged.iter().all(|set| set.contains(&commit)) {
            return Ok(false);
        }
        if self.no_merged.iter().any(|set| set.contains(&commit)) {
            return Ok(false);
        }
        if self.contains.is_empty() && self.no_contains.is_empty() {
            return Ok(true);
        }
        let ancestors = match ancestor_set(self.store, &commit) {
            Ok(ancestors) => ancestors,
            Err(StoreError::NotFound(_)) => return Ok(false),
            Err(e) => return Err(e.into()),
        };
        if !self.contains.is_empty() && !self.contains.iter().any(|c| ancestors.contains(c)) {
            return Ok(false);
        }
        Ok(!self.no_contains.iter().any(|c| ancestors.contains(c)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use refdb_store::{InMemoryObjectStore, StoredObject};

    #[test]
    fn kinds_gate() {
        let all = RefKinds::empty();
        assert!(all.admits("refs/heads/main", false));
        assert!(all.admits("refs/notes/x", false));
        assert!(!all.admits("HEAD", false));
        assert!(all.admits("HEAD", true));
        assert!(!all.admits("FOO", true));

        let branches = RefKinds::BRANCHES;
        assert!(branches.admits("refs/heads/main", false));
        assert!(!branches.admits("refs/tags/v1", false));
        assert!((RefKinds::BRANCHES | RefKinds::TAGS).admits("refs/tags/v1", false));
    }

    #[test]
    fn match_as_path() {
        let m = NameMatcher::new(["refs/heads", "refs/tags/v*"], false);
        assert!(m.matches("refs/heads/main"));
        assert!(m.matches("refs/heads/deep/topic"));
        assert!(!m.matches("refs/headsup"));
        assert!(m.matches("refs/tags/v1"));
        assert!(!m.matches("refs/tags/v1/nested"));
        assert!(!m.matches("refs/tags/x"));
    }

    #[test]
    fn trailing_slash_and_exact_names() {
        let m = NameMatcher::new(["refs/remotes/", "HEAD"], false);
        assert!(m.matches("refs/remotes/origin/main"));
        assert!(m.matches("HEAD"));
        assert!(!m.matches("refs/heads/HEAD"));
    }

    #[test]
    fn ignore_case_matching() {
        let m = NameMatcher::new(["refs/heads/Feat*"], true);
        assert!(m.matches("refs/heads/feature"));
        assert!(!NameMatcher::new(["refs/heads/Feat*"], false).matches("refs/heads/feature"));
        assert!(NameMatcher::new(["REFS/HEADS"], true).matches("refs/heads/x"));
    }

    #[test]
    fn invalid_glob_matches_literally() {
        let m = NameMatcher::new(["refs/heads/[oops"], false);
        assert!(!m.matches("refs/heads/o"));
    }

    fn history() -> (InMemoryObjectStore, ObjectId, ObjectId, ObjectId, ObjectId) {
        let store = InMemoryObjectStore::new();
        let base = store.write(&StoredObject::commit(vec![], "base")).unwrap();
        let left = store.write(&StoredObject::commit(vec![base], "left")).unwrap();
        let right = store.write(&StoredObject::commit(vec![base], "right")).unwrap();
        let tag = store.write(&StoredObject::tag(left, "v1")).unwrap();
        (store, base, left, right, tag)
    }

    #[test]
    fn points_at_sees_through_tags() {
        let (store, _base, left, right, tag) = history();
        let filter = ObjectFilter {
            points_at: vec![left],
            ..Default::default()
        };
        let prepared = filter.prepare(&store).unwrap();
        assert!(prepared.admits(&left).unwrap());
        assert!(prepared.admits(&tag).unwrap());
        assert!(!prepared.admits(&right).unwrap());
    }

    #[test]
    fn merged_and_contains() {
        let (store, base, left, right, tag) = history();
        let merged = ObjectFilter {
            merged: vec![left],
            ..Default::default()
        }
        .prepare(&store)
        .unwrap();
        assert!(merged.admits(&base).unwrap());
        assert!(merged.admits(&tag).unwrap());
        assert!(!merged.admits(&right).unwrap());

        let no_merged = ObjectFilter {
            no_merged: vec![left],
            ..Default::default()
        }
        .prepare(&store)
        .unwrap();
        assert!(no_merged.admits(&right).unwrap());
        assert!(!no_merged.admits(&base).unwrap());

        let contains = ObjectFilter {
            contains: vec![base],
            no_contains: vec![right],
            ..Default::default()
        }
        .prepare(&store)
        .unwrap();
        assert!(contains.admits(&left).unwrap());
        assert!(!contains.admits(&right).unwrap());

        let missing = ObjectId::from_bytes(b"missing");
        assert!(!merged.admits(&missing).unwrap());
    }
}
