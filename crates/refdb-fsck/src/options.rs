use std::collections::BTreeMap;

use crate::error::Result;
use crate::report::{Severity, ViolationKind};

/// Verification settings.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FsckOptions {
    /// Enables the strict-only checks and promotes warnings to errors.
    pub strict: bool,
    /// Record the name of every checked ref in the report.
    pub verbose: bool,
    /// Per-kind overrides; kinds not listed are errors.
    pub severities: BTreeMap<ViolationKind, Severity>,
}

impl FsckOptions {
    /// Build options from the `[fsck]` configuration table.
    pub fn from_config(table: &BTreeMap<String, String>) -> Result<Self> {
        let mut severities = BTreeMap::new();
        for (id, severity) in table {
            severities.insert(id.parse::<ViolationKind>()?, severity.parse::<Severity>()?);
        }
        Ok(Self {
            severities,
            ..Default::default()
        })
    }

    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Effective severity of a violation kind.
    pub fn severity_of(&self, kind: ViolationKind) -> Severity {
        match self.severities.get(&kind).copied().unwrap_or(Severity::Error) {
            Severity::Warn if self.strict => Severity::Error,
            other => other,
        }
    }

    /// Returns `true` if checks of `kind` run at all.
    pub fn runs(&self, kind: ViolationKind) -> bool {
        let strict_only = matches!(
            kind,
            ViolationKind::LogOrderingViolation | ViolationKind::MisplacedRef
        );
        (self.strict || !strict_only) && self.severity_of(kind) != Severity::Ignore
    }
}
