use std::fmt;
use std::str::FromStr;

use crate::error::FsckError;

/// The class of a consistency problem.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ViolationKind {
    /// A direct ref names an object missing from the object store.
    DanglingRef,
    /// Following symbolic refs loops.
    SymbolicCycle,
    /// A ref name, or a symbolic target, violates the refname grammar.
    MalformedName,
    /// A stored record could not be decoded.
    BadRefContent,
    /// Reflog timestamps go backwards. Strict mode only.
    LogOrderingViolation,
    /// A shared ref is stored in a worktree's private store. Strict mode only.
    MisplacedRef,
}

impl ViolationKind {
    pub const ALL: [ViolationKind; 6] = [
        ViolationKind::DanglingRef,
        ViolationKind::SymbolicCycle,
        ViolationKind::MalformedName,
        ViolationKind::BadRefContent,
        ViolationKind::LogOrderingViolation,
        ViolationKind::MisplacedRef,
    ];

    /// Identifier used in messages and in the `[fsck]` configuration table.
    pub fn id(&self) -> &'static str {
        match self {
            ViolationKind::DanglingRef => "danglingRef",
            ViolationKind::SymbolicCycle => "symbolicCycle",
            ViolationKind::MalformedName => "badRefName",
            ViolationKind::BadRefContent => "badRefContent",
            ViolationKind::LogOrderingViolation => "badReflogOrder",
            ViolationKind::MisplacedRef => "misplacedRef",
        }
    }
}

impl fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for ViolationKind {
    type Err = FsckError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|k| k.id().eq_ignore_ascii_case(s))
            .ok_or_else(|| FsckError::Config(format!("unknown check '{s}'")))
    }
}

/// How a violation of some kind is treated.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Severity {
    Error,
    Warn,
    Ignore,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Severity::Error => "error",
            Severity::Warn => "warning",
            Severity::Ignore => "ignore",
        })
    }
}

impl FromStr for Severity {
    type Err = FsckError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "error" => Ok(Severity::Error),
            "warn" | "warning" => Ok(Severity::Warn),
            "ignore" => Ok(Severity::Ignore),
            _ => Err(FsckError::Config(format!("unknown severity '{s}'"))),
        }
    }
}

/// One problem found in one ref.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Violation {
    pub name: String,
    pub kind: ViolationKind,
    pub severity: Severity,
    pub description: String,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}: {}: {}", self.severity, self.name, self.kind, self.description)
    }
}

/// Result of verifying one database.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct VerificationReport {
    /// Which database was checked: `main` or a linked worktree's id.
    pub database: String,
    /// Names of the refs that were read, when verbose.
    pub checked: Vec<String>,
    /// Sorted by ref name, then kind.
    pub violations: Vec<Violation>,
    /// Set when the database could not be verified at all.
    pub error: Option<String>,
}

impl VerificationReport {
    pub fn new(database: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            ..Default::default()
        }
    }

    /// Returns `true` if the database could not be read or has an
    /// error-severity violation.
    pub fn failed(&self) -> bool {
        self.error.is_some() || self.errors().next().is_some()
    }

    pub fn errors(&self) -> impl Iterator<Item = &Violation> {
        self.violations.iter().filter(|v| v.severity == Severity::Error)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Violation> {
        self.violations.iter().filter(|v| v.severity == Severity::Warn)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_ids_round_trip() {
        for kind in ViolationKind::ALL {
            assert_eq!(kind.id().parse::<ViolationKind>().unwrap(), kind);
        }
        assert!("nope".parse::<ViolationKind>().is_err());
    }

    #[test]
    fn severities_parse() {
        assert_eq!("warn".parse::<Severity>().unwrap(), Severity::Warn);
        assert_eq!("ERROR".parse::<Severity>().unwrap(), Severity::Error);
        assert!("fatal".parse::<Severity>().is_err());
    }

    #[test]
    fn report_fails_only_on_errors() {
        let mut report = VerificationReport::new("main");
        report.violations.push(Violation {
            name: "refs/heads/x".into(),
            kind: ViolationKind::DanglingRef,
            severity: Severity::Warn,
            description: "missing".into(),
        });
        assert!(!report.failed());
        report.violations[0].severity = Severity::Error;
        assert!(report.failed());

        let mut broken = VerificationReport::new("wt");
        broken.error = Some("cannot open".into());
        assert!(broken.failed());
    }
}
