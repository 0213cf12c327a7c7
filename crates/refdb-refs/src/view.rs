//! The refs as seen from one worktree.
//!
//! A linked worktree keeps its per-worktree refs (`HEAD`, other root refs,
//! `refs/worktree/`, `refs/bisect/`, `refs/rewritten/`) in a private database
//! and shares everything else with the main worktree. The main worktree has
//! no private database: all of its refs live in the shared one.

use std::collections::HashSet;
use std::iter::Peekable;

use refdb_types::ObjectId;

use crate::backend::RefIter;
use crate::database::RefDatabase;
use crate::error::{RefError, Result};
use crate::names::{is_per_worktree, SYMREF_MAX_DEPTH};
use crate::types::{RefRecord, RefTarget};

/// Final value of a ref after following symbolic links.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Resolved {
    /// Name of the last ref in the chain.
    pub name: String,
    /// `None` if the chain ends at an unborn or missing ref.
    pub id: Option<ObjectId>,
}

/// Read-only view routing each name to the database that stores it.
#[derive(Clone, Copy, Debug)]
pub struct RefView<'a> {
    shared: &'a RefDatabase,
    private: Option<&'a RefDatabase>,
}

impl<'a> RefView<'a> {
    /// A view over a single database, as seen from the main worktree.
    pub fn new(shared: &'a RefDatabase) -> Self {
        Self {
            shared,
            private: None,
        }
    }

    /// A view of a linked worktree.
    pub fn with_private(shared: &'a RefDatabase, private: &'a RefDatabase) -> Self {
        Self {
            shared,
            private: Some(private),
        }
    }

    pub fn shared(&self) -> &'a RefDatabase {
        self.shared
    }

    pub fn private(&self) -> Option<&'a RefDatabase> {
        self.private
    }

    fn database_for(&self, name: &str) -> &'a RefDatabase {
        match self.private {
            Some(private) if is_per_worktree(name) => private,
            _ => self.shared,
        }
    }

    pub fn lookup(&self, name: &str) -> Result<RefRecord> {
        self.database_for(name).lookup(name)
    }

    pub fn try_lookup(&self, name: &str) -> Result<Option<RefRecord>> {
        self.database_for(name).try_lookup(name)
    }

    /// Every visible record in name order.
    pub fn enumerate(&self) -> Result<RefIter<'a>> {
        let Some(private) = self.private else {
            return self.shared.enumerate();
        };
        let shared = self
            .shared
            .enumerate()?
            .filter(|r| !matches!(r, Ok(record) if is_per_worktree(&record.name)));
        let private = private
            .enumerate()?
            .filter(|r| !matches!(r, Ok(record) if !is_per_worktree(&record.name)));
        let left: RefIter<'a> = Box::new(shared);
        let right: RefIter<'a> = Box::new(private);
        Ok(Box::new(MergeByName {
            left: left.peekable(),
            right: right.peekable(),
        }))
    }

    /// Follow symbolic refs from `name` to a direct value.
    ///
    /// Fails with [`RefError::NotFound`] if `name` itself does not exist and
    /// with [`RefError::SymbolicCycle`] if the chain loops or is longer than
    /// [`SYMREF_MAX_DEPTH`].
    pub fn resolve(&self, name: &str) -> Result<Resolved> {
        let mut seen = HashSet::new();
        let mut current = name.to_string();
        for depth in 0..=SYMREF_MAX_DEPTH {
            if !seen.insert(current.clone()) {
                break;
            }
            let record = match self.try_lookup(&current)? {
                Some(record) => record,
                None if depth == 0 => {
                    return Err(RefError::NotFound {
                        name: name.to_string(),
                    })
                }
                None => return Ok(Resolved { name: current, id: None }),
            };
            match record.target {
                RefTarget::Direct(id) => return Ok(Resolved { name: current, id: Some(id) }),
                RefTarget::Unborn => return Ok(Resolved { name: current, id: None }),
                RefTarget::Symbolic(next) => current = next,
            }
        }
        Err(RefError::SymbolicCycle {
            name: name.to_string(),
        })
    }

    /// The ref `HEAD` points at, if `HEAD` is symbolic.
    pub fn head_ref(&self) -> Option<String> {
        let record = self.try_lookup(crate::names::HEAD).ok()??;
        match record.target {
            RefTarget::Symbolic(_) => self.resolve(crate::names::HEAD).ok().map(|r| r.name),
            _ => None,
        }
    }
}

/// Merges two name-ordered record streams. Errors pass through as soon as
/// they reach the front of either stream.
struct MergeByName<'a> {
    left: Peekable<RefIter<'a>>,
    right: Peekable<RefIter<'a>>,
}

impl Iterator for MergeByName<'_> {
    type Item = Result<RefRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        let take_left = match (self.left.peek(), self.right.peek()) {
            (None, None) => return None,
            (Some(_), None) => true,
            (None, Some(_)) => false,
            (Some(Err(_)), _) => true,
            (_, Some(Err(_))) => false,
            (Some(Ok(l)), Some(Ok(r))) => l.name <= r.name,
        };
        if take_left {
            self.left.next()
        } else {
            self.right.next()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::RefStorageFormat;
    use crate::types::RefUpdate;

    fn oid(seed: &str) -> ObjectId {
        ObjectId::from_bytes(seed.as_bytes())
    }

    fn database(dir: &std::path::Path, updates: Vec<RefUpdate>) -> RefDatabase {
        let db = RefDatabase::init(dir, RefStorageFormat::Files).unwrap();
        db.write_batch(updates).unwrap();
        db
    }

    #[test]
    fn private_refs_overlay_shared_ones() {
        let shared_dir = tempfile::tempdir().unwrap();
        let private_dir = tempfile::tempdir().unwrap();
        let shared = database(
            shared_dir.path(),
            vec![
                RefUpdate::create("HEAD", RefTarget::Symbolic("refs/heads/main".into())),
                RefUpdate::create("refs/heads/main", RefTarget::Direct(oid("m"))),
                RefUpdate::create("refs/heads/topic", RefTarget::Direct(oid("t"))),
            ],
        );
        let private = database(
            private_dir.path(),
            vec![
                RefUpdate::create("HEAD", RefTarget::Symbolic("refs/heads/topic".into())),
                RefUpdate::create("refs/bisect/bad", RefTarget::Direct(oid("b"))),
            ],
        );

        let view = RefView::with_private(&shared, &private);
        let names: Vec<_> = view.enumerate().unwrap().map(|r| r.unwrap().name).collect();
        assert_eq!(names, vec!["HEAD", "refs/bisect/bad", "refs/heads/main", "refs/heads/topic"]);
        assert_eq!(view.head_ref().as_deref(), Some("refs/heads/topic"));
        assert_eq!(RefView::new(&shared).head_ref().as_deref(), Some("refs/heads/main"));
    }

    #[test]
    fn resolve_follows_chain() {
        let dir = tempfile::tempdir().unwrap();
        let db = database(
            dir.path(),
            vec![
                RefUpdate::create("HEAD", RefTarget::Symbolic("refs/heads/alias".into())),
                RefUpdate::create("refs/heads/alias", RefTarget::Symbolic("refs/heads/main".into())),
                RefUpdate::create("refs/heads/main", RefTarget::Direct(oid("m"))),
            ],
        );
        let resolved = RefView::new(&db).resolve("HEAD").unwrap();
        assert_eq!(resolved.name, "refs/heads/main");
        assert_eq!(resolved.id, Some(oid("m")));
    }

    #[test]
    fn resolve_to_unborn_branch() {
        let dir = tempfile::tempdir().unwrap();
        let db = database(
            dir.path(),
            vec![RefUpdate::create("HEAD", RefTarget::Symbolic("refs/heads/main".into()))],
        );
        let resolved = RefView::new(&db).resolve("HEAD").unwrap();
        assert_eq!(resolved, Resolved { name: "refs/heads/main".into(), id: None });
        assert!(RefView::new(&db).resolve("refs/heads/none").unwrap_err().is_not_found());
    }

    #[test]
    fn resolve_detects_cycle() {
        let dir = tempfile::tempdir().unwrap();
        let db = database(
            dir.path(),
            vec![
                RefUpdate::create("refs/heads/a", RefTarget::Symbolic("refs/heads/b".into())),
                RefUpdate::create("refs/heads/b", RefTarget::Symbolic("refs/heads/a".into())),
            ],
        );
        let err = RefView::new(&db).resolve("refs/heads/a").unwrap_err();
        assert!(matches!(err, RefError::SymbolicCycle { name } if name == "refs/heads/a"));
    }

    #[test]
    fn resolve_gives_up_on_deep_chains() {
        let dir = tempfile::tempdir().unwrap();
        let mut updates: Vec<_> = (0..SYMREF_MAX_DEPTH + 1)
            .map(|i| {
                RefUpdate::create(
                    format!("refs/heads/l{i}"),
                    RefTarget::Symbolic(format!("refs/heads/l{}", i + 1)),
                )
            })
            .collect();
        updates.push(RefUpdate::create(
            format!("refs/heads/l{}", SYMREF_MAX_DEPTH + 1),
            RefTarget::Direct(oid("end")),
        ));
        let db = database(dir.path(), updates);
        assert!(matches!(
            RefView::new(&db).resolve("refs/heads/l0"),
            Err(RefError::SymbolicCycle { .. })
        ));
        assert!(RefView::new(&db).resolve("refs/heads/l1").is_ok());
    }
}
