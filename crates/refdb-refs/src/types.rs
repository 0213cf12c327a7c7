//! Core reference types.
//!
//! A [`RefRecord`] is one named reference with its current target and its
//! reflog. Mutations are expressed as [`RefUpdate`]s grouped into batches
//! that a storage backend applies all-or-nothing.

use std::fmt;

use serde::{Deserialize, Serialize};

use refdb_types::{ObjectId, Signature};

use crate::names;

/// What a reference points at.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RefTarget {
    /// A content address in the object store.
    Direct(ObjectId),
    /// The name of another reference.
    Symbolic(String),
    /// A per-worktree special ref that exists but has no value yet.
    Unborn,
}

impl RefTarget {
    pub fn direct_id(&self) -> Option<ObjectId> {
        match self {
            RefTarget::Direct(id) => Some(*id),
            _ => None,
        }
    }

    pub fn symbolic_name(&self) -> Option<&str> {
        match self {
            RefTarget::Symbolic(name) => Some(name),
            _ => None,
        }
    }
}

impl fmt::Display for RefTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RefTarget::Direct(id) => write!(f, "{id}"),
            RefTarget::Symbolic(name) => write!(f, "ref: {name}"),
            RefTarget::Unborn => f.write_str("(unborn)"),
        }
    }
}

/// One reflog entry: a transition of a ref from `old` to `new`.
///
/// A null id on either side means "no value" (creation or deletion).
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReflogEntry {
    pub old: ObjectId,
    pub new: ObjectId,
    pub committer: Signature,
    pub message: String,
}

impl ReflogEntry {
    pub fn new(old: ObjectId, new: ObjectId, committer: Signature, message: impl Into<String>) -> Self {
        Self {
            old,
            new,
            committer,
            message: message.into(),
        }
    }
}

/// A named reference in a database.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefRecord {
    /// Full name, e.g. `refs/heads/main` or `HEAD`.
    pub name: String,
    pub target: RefTarget,
    /// Oldest entry first. Empty when the ref has no log.
    #[serde(default)]
    pub log: Vec<ReflogEntry>,
}

impl RefRecord {
    pub fn new(name: impl Into<String>, target: RefTarget) -> Self {
        Self {
            name: name.into(),
            target,
            log: Vec::new(),
        }
    }

    pub fn direct(name: impl Into<String>, id: ObjectId) -> Self {
        Self::new(name, RefTarget::Direct(id))
    }

    pub fn symbolic(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self::new(name, RefTarget::Symbolic(target.into()))
    }

    pub fn with_log(mut self, log: Vec<ReflogEntry>) -> Self {
        self.log = log;
        self
    }

    /// Returns `true` for HEAD and other top-level pseudo-refs.
    pub fn is_root(&self) -> bool {
        names::is_root_ref(&self.name)
    }

    pub fn is_symbolic(&self) -> bool {
        matches!(self.target, RefTarget::Symbolic(_))
    }
}

/// Precondition on the current value of a ref before an update applies.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Expected {
    /// No precondition.
    Any,
    /// The ref must not exist.
    Absent,
    /// The ref must currently hold exactly this target.
    Value(RefTarget),
}

/// What happens to the reflog of an updated ref.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LogAction {
    Keep,
    Append(ReflogEntry),
    /// Replace the whole log, e.g. when copying a ref between stores.
    Replace(Vec<ReflogEntry>),
}

/// A single create, update, or delete inside a batch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RefUpdate {
    pub name: String,
    pub expected: Expected,
    /// `None` deletes the ref together with its log.
    pub new: Option<RefTarget>,
    pub log: LogAction,
}

impl RefUpdate {
    /// Create a ref that must not exist yet.
    pub fn create(name: impl Into<String>, target: RefTarget) -> Self {
        Self {
            name: name.into(),
            expected: Expected::Absent,
            new: Some(target),
            log: LogAction::Keep,
        }
    }

    /// Set a ref regardless of its current value.
    pub fn set(name: impl Into<String>, target: RefTarget) -> Self {
        Self {
            name: name.into(),
            expected: Expected::Any,
            new: Some(target),
            log: LogAction::Keep,
        }
    }

    pub fn delete(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            expected: Expected::Any,
            new: None,
            log: LogAction::Keep,
        }
    }

    pub fn expecting(mut self, expected: Expected) -> Self {
        self.expected = expected;
        self
    }

    pub fn with_log(mut self, log: LogAction) -> Self {
        self.log = log;
        self
    }
}

/// How a backend should treat a batch.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum WriteMode {
    #[default]
    Normal,
    /// The store is known to be empty and unobserved. Backends may skip
    /// per-ref locking and write straight into their compacted form.
    Initial,
}
