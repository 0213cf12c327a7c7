//! Moving every record of a database into a store of another format.
//!
//! The new store is built in a staging directory next to the active one and
//! becomes visible only through [`RefDatabase::publish`]. Any failure before
//! that point drops the staging directory and leaves the database as it was.

use std::collections::{BTreeSet, HashMap};

use tracing::{debug, info};

use refdb_refs::names::{self, check_refname_format, collision_key};
use refdb_refs::{
    LogAction, RefDatabase, RefError, RefRecord, RefStorageFormat, RefTarget, RefUpdate, WorktreeRegistry,
    WriteMode,
};

use crate::error::{MigrationError, Result};
use crate::plan::{MigrationFlags, MigrationPlan, MigrationReport, RejectedRef};

/// Migrate `db` to the format named `target`.
///
/// A dry run performs the same reads and writes against a throwaway store,
/// collects records that could not be migrated instead of aborting, and
/// leaves `db` untouched.
pub fn migrate(db: &mut RefDatabase, target: &str, flags: MigrationFlags) -> Result<MigrationReport> {
    let target_format = parse_format(target)?;
    if db.format() == target_format {
        return Err(MigrationError::AlreadyInFormat(target_format));
    }
    let plan = MigrationPlan {
        source_format: db.format(),
        target_format,
        flags,
    };
    run(db, &plan)
}

/// Migrate the shared database of a repository.
///
/// Linked worktrees keep private stores in the format of the shared one, so
/// repositories that have any are refused.
pub fn migrate_repository(
    registry: &WorktreeRegistry,
    target: &str,
    flags: MigrationFlags,
) -> Result<MigrationReport> {
    let target_format = parse_format(target)?;
    let has_worktrees = registry
        .has_linked_worktrees()
        .map_err(|e| MigrationError::failed("cannot list worktrees", e))?;
    if has_worktrees {
        return Err(MigrationError::MigrationFailed {
            reason: "migrating repositories with worktrees is not supported yet".into(),
            source: None,
        });
    }
    let mut db = registry
        .shared_database()
        .map_err(|e| MigrationError::failed("cannot open ref database", e))?;
    migrate(&mut db, target_format.name(), flags)
}

fn parse_format(name: &str) -> Result<RefStorageFormat> {
    RefStorageFormat::by_name(name).ok_or_else(|| MigrationError::UnknownFormat(name.to_string()))
}

fn run(db: &mut RefDatabase, plan: &MigrationPlan) -> Result<MigrationReport> {
    let dry_run = plan.flags.dry_run;
    info!(
        from = %plan.source_format,
        to = %plan.target_format,
        dry_run,
        "starting ref migration"
    );

    let (staging, destination) = db
        .stage_store(plan.target_format)
        .map_err(|e| MigrationError::failed("cannot create staging store", e))?;

    let mut report = MigrationReport::new(plan);
    let mut checker = RecordChecker::default();
    let mut updates = Vec::new();

    let records = db
        .enumerate()
        .map_err(|e| MigrationError::failed("cannot read source refs", e))?;
    for record in records {
        let record = record.map_err(|e| MigrationError::failed("cannot read source ref", e))?;
        if let Err(e) = checker.admit(&record) {
            if !dry_run {
                return Err(MigrationError::failed(format!("cannot migrate '{}'", record.name), e));
            }
            debug!(name = %record.name, error = %e, "dry run rejected ref");
            report.rejected.push(RejectedRef {
                name: record.name,
                reason: e.to_string(),
            });
            continue;
        }

        let log = if plan.flags.drop_reflogs {
            Vec::new()
        } else {
            record.log
        };
        report.refs_migrated += 1;
        report.reflog_entries_migrated += log.len();
        updates.push(
            RefUpdate::create(record.name, record.target).with_log(LogAction::Replace(log)),
        );
    }

    debug!(count = updates.len(), "writing migrated refs");
    destination
        .write_batch(updates, WriteMode::Initial)
        .map_err(|e| MigrationError::failed("cannot write new store", e))?;
    drop(destination);

    if dry_run {
        info!(%report, "dry run finished; staged store discarded");
        return Ok(report);
    }

    db.publish(plan.target_format, staging)
        .map_err(|e| MigrationError::failed("cannot publish new store", e))?;
    info!(%report, "ref migration finished");
    Ok(report)
}

/// Per-record checks that the destination would otherwise only report for
/// the batch as a whole.
#[derive(Default)]
struct RecordChecker {
    names: BTreeSet<String>,
    /// Collision key to the first name that produced it.
    keys: HashMap<String, String>,
}

impl RecordChecker {
    fn admit(&mut self, record: &RefRecord) -> std::result::Result<(), RefError> {
        check_refname_format(&record.name)?;
        if let RefTarget::Symbolic(target) = &record.target {
            check_refname_format(target)?;
        }

        let key = collision_key(&record.name);
        if let Some(existing) = self.keys.get(&key) {
            return Err(RefError::Conflict {
                name: record.name.clone(),
                reason: format!("collides with '{existing}' after case folding or normalization"),
            });
        }

        if let Some(parent) = names::parent_dirs(&record.name).find(|dir| self.names.contains(*dir)) {
            return Err(RefError::Conflict {
                name: record.name.clone(),
                reason: format!("'{parent}' exists; cannot create '{}'", record.name),
            });
        }
        let prefix = format!("{}/", record.name);
        if let Some(child) = self.names.range(prefix.clone()..).next().filter(|n| n.starts_with(&prefix)) {
            return Err(RefError::Conflict {
                name: record.name.clone(),
                reason: format!("'{child}' exists; cannot create '{}'", record.name),
            });
        }

        self.keys.insert(key, record.name.clone());
        self.names.insert(record.name.clone());
        Ok(())
    }
}
