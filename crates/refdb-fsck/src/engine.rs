//! Consistency checks over the records of a ref database.

use std::collections::HashSet;

use tracing::{debug, warn};

use refdb_refs::names::{check_refname_format, is_per_worktree, SYMREF_MAX_DEPTH};
use refdb_refs::{RefDatabase, RefError, RefRecord, RefTarget, RefView, WorktreeRegistry};
use refdb_store::ObjectStore;

use crate::error::Result;
use crate::options::FsckOptions;
use crate::report::{VerificationReport, Violation, ViolationKind};

/// Where a symbolic chain starting at some ref leads.
enum ChainEnd {
    /// The chain revisits a ref. Members in chain order.
    Cycle(Vec<String>),
    /// More hops than resolution follows.
    TooDeep(usize),
    Resolves,
}

/// Collects violations for one database.
struct Checker<'o> {
    options: &'o FsckOptions,
    report: VerificationReport,
    seen_cycles: HashSet<Vec<String>>,
}

impl Checker<'_> {
    fn push(&mut self, name: &str, kind: ViolationKind, description: String) {
        if !self.options.runs(kind) {
            return;
        }
        self.report.violations.push(Violation {
            name: name.to_string(),
            kind,
            severity: self.options.severity_of(kind),
            description,
        });
    }
}

/// Verify the records stored in `db`.
///
/// Symbolic refs are followed through `view`, so a linked worktree's `HEAD`
/// resolves against the shared refs. `db` is checked as a private store when
/// it is the view's private database.
pub fn verify<S: ObjectStore + ?Sized>(
    db: &RefDatabase,
    view: &RefView<'_>,
    objects: &S,
    options: &FsckOptions,
) -> Result<VerificationReport> {
    let label = db.dir().display().to_string();
    verify_labeled(&label, db, view, objects, options)
}

fn verify_labeled<S: ObjectStore + ?Sized>(
    label: &str,
    db: &RefDatabase,
    view: &RefView<'_>,
    objects: &S,
    options: &FsckOptions,
) -> Result<VerificationReport> {
    let is_private = view.private().is_some_and(|p| std::ptr::eq(p, db));
    let mut checker = Checker {
        options,
        report: VerificationReport::new(label),
        seen_cycles: HashSet::new(),
    };

    for item in db.enumerate()? {
        let record = match item {
            Ok(record) => record,
            Err(RefError::Corrupt { location, reason }) => {
                checker.push(&location, ViolationKind::BadRefContent, reason);
                continue;
            }
            Err(e) => return Err(e.into()),
        };
        debug!(name = %record.name, "checking ref");
        check_record(&mut checker, &record, view, objects, is_private)?;
        if options.verbose {
            checker.report.checked.push(record.name);
        }
    }

    let violations = &mut checker.report.violations;
    violations.sort_by(|a, b| a.name.cmp(&b.name).then(a.kind.cmp(&b.kind)));
    violations.dedup();
    Ok(checker.report)
}

fn check_record<S: ObjectStore + ?Sized>(
    checker: &mut Checker<'_>,
    record: &RefRecord,
    view: &RefView<'_>,
    objects: &S,
    is_private: bool,
) -> Result<()> {
    let name = record.name.as_str();

    if let Err(e) = check_refname_format(name) {
        checker.push(name, ViolationKind::MalformedName, e.to_string());
    }

    match &record.target {
        RefTarget::Direct(id) => {
            if checker.options.runs(ViolationKind::DanglingRef) && !objects.exists(id)? {
                checker.push(
                    name,
                    ViolationKind::DanglingRef,
                    format!("points to missing object {}", id.short_hex()),
                );
            }
        }
        RefTarget::Symbolic(target) => {
            if let Err(e) = check_refname_format(target) {
                checker.push(
                    name,
                    ViolationKind::MalformedName,
                    format!("symbolic target: {e}"),
                );
            } else {
                check_chain(checker, name, target, view);
            }
        }
        RefTarget::Unborn => {}
    }

    if checker.options.runs(ViolationKind::LogOrderingViolation) {
        if let Some(index) = record
            .log
            .windows(2)
            .position(|w| w[1].committer.seconds < w[0].committer.seconds)
        {
            checker.push(
                name,
                ViolationKind::LogOrderingViolation,
                format!("reflog entry {} is older than the entry before it", index + 1),
            );
        }
    }

    if is_private && !is_per_worktree(name) {
        checker.push(
            name,
            ViolationKind::MisplacedRef,
            "shared ref stored in a worktree's private store".into(),
        );
    }
    Ok(())
}

fn check_chain(checker: &mut Checker<'_>, name: &str, target: &str, view: &RefView<'_>) {
    match follow_chain(view, name, target) {
        ChainEnd::Cycle(members) => {
            let mut key = members.clone();
            key.sort();
            if !checker.seen_cycles.insert(key.clone()) {
                return;
            }
            // Report on the smallest member, listing the cycle from there.
            let start = members.iter().position(|m| *m == key[0]).unwrap_or(0);
            let mut path: Vec<&str> = members[start..]
                .iter()
                .chain(&members[..start])
                .map(String::as_str)
                .collect();
            path.push(key[0].as_str());
            checker.push(&key[0], ViolationKind::SymbolicCycle, path.join(" -> "));
        }
        ChainEnd::TooDeep(hops) => checker.push(
            name,
            ViolationKind::SymbolicCycle,
            format!("symbolic chain of {hops} hops exceeds the limit of {SYMREF_MAX_DEPTH}"),
        ),
        ChainEnd::Resolves => {}
    }
}

fn follow_chain(view: &RefView<'_>, start: &str, first: &str) -> ChainEnd {
    let mut path = vec![start.to_string()];
    let mut current = first.to_string();
    loop {
        if let Some(pos) = path.iter().position(|n| *n == current) {
            return ChainEnd::Cycle(path.split_off(pos));
        }
        path.push(current.clone());
        match view.try_lookup(&current) {
            Ok(Some(RefRecord {
                target: RefTarget::Symbolic(next),
                ..
            })) => current = next,
            // Missing and unreadable targets are reported on their own.
            _ => break,
        }
    }
    let hops = path.len() - 1;
    if hops > SYMREF_MAX_DEPTH {
        ChainEnd::TooDeep(hops)
    } else {
        ChainEnd::Resolves
    }
}

/// Verify the shared database and every linked worktree's private database.
///
/// A database that cannot be opened or read produces a failed report; the
/// others are still verified.
pub fn verify_worktrees<S: ObjectStore + ?Sized>(
    registry: &WorktreeRegistry,
    objects: &S,
    options: &FsckOptions,
) -> Result<Vec<VerificationReport>> {
    let mut reports = Vec::new();
    let shared = registry.shared_database();

    for worktree in registry.worktrees()? {
        let label = worktree.name().to_string();
        let outcome = match (&shared, registry.private_database(&worktree)) {
            (Ok(shared), Ok(None)) => verify_labeled(&label, shared, &RefView::new(shared), objects, options),
            (Ok(shared), Ok(Some(private))) => verify_labeled(
                &label,
                &private,
                &RefView::with_private(shared, &private),
                objects,
                options,
            ),
            (Err(_), Ok(Some(private))) => {
                verify_labeled(&label, &private, &RefView::new(&private), objects, options)
            }
            (Err(e), Ok(None)) => Err(RefError::Corrupt {
                location: "shared database".into(),
                reason: e.to_string(),
            }
            .into()),
            (_, Err(e)) => Err(e.into()),
        };
        let report = outcome.unwrap_or_else(|e| {
            warn!(worktree = %label, error = %e, "cannot verify ref database");
            let mut report = VerificationReport::new(&label);
            report.error = Some(e.to_string());
            report
        });
        reports.push(report);
    }
    Ok(reports)
}
