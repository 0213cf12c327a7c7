//! The [`StorageBackend`] trait and helpers shared by its implementations.
//!
//! A backend persists the records of one store directory. Backends are
//! selected at runtime by [`RefStorageFormat`] and used through
//! `Box<dyn StorageBackend>`, so two formats can be open side by side while a
//! database is being migrated.

use std::collections::{BTreeSet, HashSet};
use std::path::Path;

use crate::error::{RefError, Result};
use crate::files::FilesBackend;
use crate::format::RefStorageFormat;
use crate::names::{self, check_refname_format};
use crate::table::TableBackend;
use crate::types::{Expected, RefRecord, RefTarget, RefUpdate, WriteMode};

/// A lazy, finite sequence of records in name order.
///
/// A record that cannot be decoded shows up as an `Err` item; iteration
/// continues with the next record where the encoding allows it.
pub type RefIter<'a> = Box<dyn Iterator<Item = Result<RefRecord>> + 'a>;

/// Storage backend for the references of one store.
///
/// Implementations confine their side effects to the directory they were
/// opened on.
pub trait StorageBackend: Send + Sync {
    /// The format this backend reads and writes.
    fn format_id(&self) -> RefStorageFormat;

    /// The store directory.
    fn path(&self) -> &Path;

    /// Start a fresh enumeration of every record, root refs included.
    fn enumerate(&self) -> Result<RefIter<'_>>;

    /// Read one record. Fails with [`RefError::NotFound`] if absent.
    fn lookup(&self, name: &str) -> Result<RefRecord>;

    /// Apply every update or none of them.
    ///
    /// Fails with [`RefError::Conflict`] when a precondition does not hold,
    /// a name appears twice, or a name would nest inside (or contain)
    /// another ref.
    fn write_batch(&self, updates: Vec<RefUpdate>, mode: WriteMode) -> Result<()>;

    /// Look up a record, mapping absence to `None`.
    fn try_lookup(&self, name: &str) -> Result<Option<RefRecord>> {
        match self.lookup(name) {
            Ok(record) => Ok(Some(record)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }
}

/// Open an existing store of `format` at `path`.
pub fn open_backend(format: RefStorageFormat, path: &Path) -> Result<Box<dyn StorageBackend>> {
    Ok(match format {
        RefStorageFormat::Files => Box::new(FilesBackend::open(path)?),
        RefStorageFormat::Table => Box::new(TableBackend::open(path)?),
    })
}

/// Create an empty store of `format` at `path`.
pub fn create_backend(format: RefStorageFormat, path: &Path) -> Result<Box<dyn StorageBackend>> {
    Ok(match format {
        RefStorageFormat::Files => Box::new(FilesBackend::create(path)?),
        RefStorageFormat::Table => Box::new(TableBackend::create(path)?),
    })
}

/// Checks that need no stored state: name grammar, symbolic target grammar,
/// and uniqueness of names within the batch.
pub(crate) fn validate_batch(updates: &[RefUpdate]) -> Result<()> {
    let mut seen = HashSet::with_capacity(updates.len());
    for update in updates {
        check_refname_format(&update.name)?;
        if let Some(RefTarget::Symbolic(target)) = &update.new {
            check_refname_format(target)?;
        }
        if !seen.insert(update.name.as_str()) {
            return Err(RefError::conflict(&update.name, "multiple updates for the same ref"));
        }
    }
    Ok(())
}

/// Compare the current value of a ref with an update's precondition.
pub(crate) fn check_expected(update: &RefUpdate, current: Option<&RefTarget>) -> Result<()> {
    let ok = match (&update.expected, current) {
        (Expected::Any, _) => true,
        (Expected::Absent, None) => true,
        (Expected::Absent, Some(_)) => false,
        (Expected::Value(want), Some(have)) => want == have,
        (Expected::Value(_), None) => false,
    };
    if ok {
        return Ok(());
    }
    let found = current.map_or_else(|| "nothing".to_string(), |t| t.to_string());
    Err(RefError::conflict(
        &update.name,
        format!("expected {:?}, found {found}", update.expected),
    ))
}

/// Reject names that would nest inside, or contain, another ref once the
/// batch is applied.
pub(crate) fn check_df_conflicts(existing: &BTreeSet<String>, updates: &[RefUpdate]) -> Result<()> {
    let mut after = existing.clone();
    for update in updates {
        match update.new {
            Some(_) => after.insert(update.name.clone()),
            None => after.remove(&update.name),
        };
    }

    for update in updates.iter().filter(|u| u.new.is_some()) {
        if let Some(parent) = names::parent_dirs(&update.name).find(|dir| after.contains(*dir)) {
            return Err(RefError::conflict(
                &update.name,
                format!("'{parent}' exists; cannot create '{}'", update.name),
            ));
        }
        let prefix = format!("{}/", update.name);
        if let Some(child) = after.range(prefix.clone()..).next().filter(|n| n.starts_with(&prefix)) {
            return Err(RefError::conflict(
                &update.name,
                format!("'{child}' exists; cannot create '{}'", update.name),
            ));
        }
    }
    Ok(())
}

/// Guard used by [`WriteMode::Initial`] batches.
pub(crate) fn require_empty(backend: &dyn StorageBackend) -> Result<()> {
    if let Some(first) = backend.enumerate()?.next() {
        let name = first.map(|r| r.name).unwrap_or_else(|_| "<unreadable>".into());
        return Err(RefError::conflict(name, "initial batch into a non-empty store"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use refdb_types::ObjectId;

    fn set(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn direct() -> RefTarget {
        RefTarget::Direct(ObjectId::from_bytes(b"x"))
    }

    #[test]
    fn duplicate_names_in_batch_conflict() {
        let updates = vec![
            RefUpdate::set("refs/heads/a", direct()),
            RefUpdate::delete("refs/heads/a"),
        ];
        assert!(matches!(validate_batch(&updates), Err(RefError::Conflict { .. })));
    }

    #[test]
    fn invalid_names_are_rejected() {
        let updates = vec![RefUpdate::set("refs/heads/a..b", direct())];
        assert!(matches!(validate_batch(&updates), Err(RefError::InvalidName { .. })));
        let updates = vec![RefUpdate::set("HEAD", RefTarget::Symbolic("main".into()))];
        assert!(matches!(validate_batch(&updates), Err(RefError::InvalidName { .. })));
    }

    #[test]
    fn expected_values() {
        let update = RefUpdate::create("refs/heads/a", direct());
        assert!(check_expected(&update, None).is_ok());
        assert!(check_expected(&update, Some(&direct())).is_err());

        let update = RefUpdate::set("refs/heads/a", direct()).expecting(Expected::Value(direct()));
        assert!(check_expected(&update, Some(&direct())).is_ok());
        assert!(check_expected(&update, Some(&RefTarget::Unborn)).is_err());
        assert!(check_expected(&update, None).is_err());
    }

    #[test]
    fn nested_names_conflict() {
        let existing = set(&["refs/heads/a"]);
        let updates = vec![RefUpdate::set("refs/heads/a/b", direct())];
        assert!(check_df_conflicts(&existing, &updates).is_err());

        let existing = set(&["refs/heads/a/b"]);
        let updates = vec![RefUpdate::set("refs/heads/a", direct())];
        assert!(check_df_conflicts(&existing, &updates).is_err());
    }

    #[test]
    fn deleting_the_blocker_in_the_same_batch_is_fine() {
        let existing = set(&["refs/heads/a"]);
        let updates = vec![
            RefUpdate::delete("refs/heads/a"),
            RefUpdate::set("refs/heads/a/b", direct()),
        ];
        assert!(check_df_conflicts(&existing, &updates).is_ok());
    }

    #[test]
    fn siblings_with_shared_prefix_do_not_conflict() {
        let existing = set(&["refs/heads/a-b", "refs/heads/ab"]);
        let updates = vec![RefUpdate::set("refs/heads/a", direct())];
        assert!(check_df_conflicts(&existing, &updates).is_ok());
    }
}
