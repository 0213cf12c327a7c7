//! Repository layout and the registry of its worktrees.
//!
//! ```text
//! <repo>/config.toml
//! <repo>/objects/                  object store
//! <repo>/refdb/                    shared ref database (main worktree)
//! <repo>/worktrees/<id>/refdb/     private ref database of a linked worktree
//! ```

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::database::RefDatabase;
use crate::error::{RefError, Result};
use crate::format::RefStorageFormat;
use crate::types::{RefTarget, RefUpdate};

pub const REFDB_DIR: &str = "refdb";
pub const WORKTREES_DIR: &str = "worktrees";
pub const OBJECTS_DIR: &str = "objects";

/// One working context of a repository.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Worktree {
    /// `None` for the main worktree.
    pub id: Option<String>,
    /// Directory holding this worktree's ref database.
    pub admin_dir: PathBuf,
}

impl Worktree {
    pub fn is_main(&self) -> bool {
        self.id.is_none()
    }

    /// Display name: `main` or the linked worktree's id.
    pub fn name(&self) -> &str {
        self.id.as_deref().unwrap_or("main")
    }

    pub fn database_dir(&self) -> PathBuf {
        self.admin_dir.join(REFDB_DIR)
    }
}

/// Enumerates the worktrees of a repository and opens their databases.
#[derive(Clone, Debug)]
pub struct WorktreeRegistry {
    root: PathBuf,
}

impl WorktreeRegistry {
    /// Create a repository with an empty shared database.
    pub fn init(root: &Path, format: RefStorageFormat) -> Result<Self> {
        fs::create_dir_all(root.join(OBJECTS_DIR))?;
        RefDatabase::init(&root.join(REFDB_DIR), format)?;
        debug!(root = %root.display(), %format, "initialized repository");
        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    pub fn open(root: &Path) -> Result<Self> {
        if !RefDatabase::exists(&root.join(REFDB_DIR)) {
            return Err(RefError::NotFound {
                name: root.join(REFDB_DIR).display().to_string(),
            });
        }
        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn objects_dir(&self) -> PathBuf {
        self.root.join(OBJECTS_DIR)
    }

    pub fn main_worktree(&self) -> Worktree {
        Worktree {
            id: None,
            admin_dir: self.root.clone(),
        }
    }

    /// The main worktree first, then linked worktrees ordered by id.
    pub fn worktrees(&self) -> Result<Vec<Worktree>> {
        let mut linked = Vec::new();
        let entries = match fs::read_dir(self.root.join(WORKTREES_DIR)) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(vec![self.main_worktree()]),
            Err(e) => return Err(e.into()),
        };
        for entry in entries {
            let entry = entry?;
            let Some(id) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            let admin_dir = entry.path();
            if RefDatabase::exists(&admin_dir.join(REFDB_DIR)) {
                linked.push(Worktree {
                    id: Some(id),
                    admin_dir,
                });
            }
        }
        linked.sort_by(|a, b| a.id.cmp(&b.id));

        let mut all = vec![self.main_worktree()];
        all.extend(linked);
        Ok(all)
    }

    pub fn has_linked_worktrees(&self) -> Result<bool> {
        Ok(self.worktrees()?.len() > 1)
    }

    /// Register a linked worktree whose `HEAD` is `head`.
    ///
    /// The private database uses the same format as the shared one.
    pub fn add_worktree(&self, id: &str, head: RefTarget) -> Result<Worktree> {
        if id.is_empty() || id.starts_with('.') || id.contains(['/', '\\']) {
            return Err(RefError::InvalidName {
                name: id.to_string(),
                reason: "worktree ids must be a single path component".into(),
            });
        }
        let worktree = Worktree {
            id: Some(id.to_string()),
            admin_dir: self.root.join(WORKTREES_DIR).join(id),
        };
        let format = self.shared_database()?.format();
        let db = RefDatabase::init(&worktree.database_dir(), format)?;
        db.write_batch(vec![RefUpdate::create(crate::names::HEAD, head)])?;
        debug!(id, %format, "added worktree");
        Ok(worktree)
    }

    pub fn shared_database(&self) -> Result<RefDatabase> {
        RefDatabase::open(&self.root.join(REFDB_DIR))
    }

    /// The private database of a linked worktree; `None` for the main one.
    pub fn private_database(&self, worktree: &Worktree) -> Result<Option<RefDatabase>> {
        if worktree.is_main() {
            return Ok(None);
        }
        RefDatabase::open(&worktree.database_dir()).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use refdb_types::ObjectId;

    #[test]
    fn fresh_repository_has_only_main() {
        let dir = tempfile::tempdir().unwrap();
        let registry = WorktreeRegistry::init(dir.path(), RefStorageFormat::Files).unwrap();
        let worktrees = registry.worktrees().unwrap();
        assert_eq!(worktrees.len(), 1);
        assert!(worktrees[0].is_main());
        assert_eq!(worktrees[0].name(), "main");
        assert!(!registry.has_linked_worktrees().unwrap());
        assert!(registry.private_database(&worktrees[0]).unwrap().is_none());
    }

    #[test]
    fn linked_worktrees_are_listed_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let registry = WorktreeRegistry::init(dir.path(), RefStorageFormat::Table).unwrap();
        let head = RefTarget::Direct(ObjectId::from_bytes(b"c"));
        registry.add_worktree("zeta", head.clone()).unwrap();
        registry.add_worktree("alpha", head.clone()).unwrap();

        let reopened = WorktreeRegistry::open(dir.path()).unwrap();
        let names: Vec<_> = reopened.worktrees().unwrap().iter().map(|w| w.name().to_string()).collect();
        assert_eq!(names, vec!["main", "alpha", "zeta"]);
        assert!(reopened.has_linked_worktrees().unwrap());

        let alpha = &reopened.worktrees().unwrap()[1];
        let private = reopened.private_database(alpha).unwrap().unwrap();
        assert_eq!(private.format(), RefStorageFormat::Table);
        assert_eq!(private.lookup("HEAD").unwrap().target, head);
    }

    #[test]
    fn bad_worktree_ids_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let registry = WorktreeRegistry::init(dir.path(), RefStorageFormat::Files).unwrap();
        for id in ["", ".hidden", "a/b"] {
            assert!(registry.add_worktree(id, RefTarget::Unborn).is_err());
        }
    }

    #[test]
    fn open_requires_shared_database() {
        let dir = tempfile::tempdir().unwrap();
        assert!(WorktreeRegistry::open(dir.path()).unwrap_err().is_not_found());
    }
}
