//! Migration inputs and results.

use std::fmt;

use refdb_refs::RefStorageFormat;

/// Options of one migration call.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MigrationFlags {
    /// Build the new store, report what would happen, then throw it away.
    pub dry_run: bool,
    /// Do not carry reflogs over to the new store.
    pub drop_reflogs: bool,
}

/// What a migration call is asked to do. Never persisted.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MigrationPlan {
    pub source_format: RefStorageFormat,
    pub target_format: RefStorageFormat,
    pub flags: MigrationFlags,
}

/// A record a dry run would not be able to migrate.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RejectedRef {
    pub name: String,
    pub reason: String,
}

/// Outcome of a migration, or its projection for a dry run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MigrationReport {
    pub source_format: RefStorageFormat,
    pub target_format: RefStorageFormat,
    pub dry_run: bool,
    pub refs_migrated: usize,
    pub reflog_entries_migrated: usize,
    /// Only populated by dry runs; a real migration aborts instead.
    pub rejected: Vec<RejectedRef>,
}

impl MigrationReport {
    pub(crate) fn new(plan: &MigrationPlan) -> Self {
        Self {
            source_format: plan.source_format,
            target_format: plan.target_format,
            dry_run: plan.flags.dry_run,
            refs_migrated: 0,
            reflog_entries_migrated: 0,
            rejected: Vec::new(),
        }
    }

    pub fn is_clean(&self) -> bool {
        self.rejected.is_empty()
    }
}

impl fmt::Display for MigrationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verb = if self.dry_run { "would migrate" } else { "migrated" };
        write!(
            f,
            "{verb} {} refs and {} reflog entries from '{}' to '{}'",
            self.refs_migrated, self.reflog_entries_migrated, self.source_format, self.target_format
        )?;
        if !self.rejected.is_empty() {
            write!(f, "; {} rejected", self.rejected.len())?;
        }
        Ok(())
    }
}
