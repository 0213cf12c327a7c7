//! Verification of ref databases.
//!
//! [`verify`] reads every record of one database and reports dangling refs,
//! symbolic cycles, malformed names, and unreadable records. Strict mode adds
//! reflog ordering and per-worktree placement checks. [`verify_worktrees`]
//! runs the checks over the shared database and every linked worktree's
//! private database, reporting each separately.
//!
//! Problems found are collected as [`Violation`]s, each with the
//! [`Severity`] configured for its [`ViolationKind`]. A report fails if any
//! violation has error severity.

pub mod engine;
pub mod error;
pub mod options;
pub mod report;

pub use engine::{verify, verify_worktrees};
pub use error::{FsckError, Result};
pub use options::FsckOptions;
pub use report::{Severity, VerificationReport, Violation, ViolationKind};
