//! Reference name grammar and namespace classification.
//!
//! A valid reference name:
//! - is either a root ref (`HEAD`, `ORIG_HEAD`, ...) or starts with `refs/`
//! - has no empty components (no leading `/`, trailing `/`, or `//`)
//! - has no component starting with `.` or ending with `.lock`
//! - does not contain `..`, `@{`, ASCII control characters, or any of
//!   space, `~`, `^`, `:`, `?`, `*`, `[`, `\`
//! - does not end with `.` and is not the single character `@`

use unicode_normalization::UnicodeNormalization;

use crate::error::{RefError, Result};

/// Characters that are forbidden anywhere in a ref name.
const FORBIDDEN_CHARS: &[char] = &[' ', '~', '^', ':', '?', '*', '[', '\\'];

/// Root refs that do not follow the `*_HEAD` naming convention.
const IRREGULAR_ROOT_REFS: &[&str] = &[
    "AUTO_MERGE",
    "BISECT_EXPECTED_REV",
    "NOTES_MERGE_PARTIAL",
    "NOTES_MERGE_REF",
    "MERGE_AUTOSTASH",
];

/// Namespaces whose refs are private to each worktree.
const PER_WORKTREE_PREFIXES: &[&str] = &["refs/worktree/", "refs/bisect/", "refs/rewritten/"];

pub const HEAD: &str = "HEAD";

/// Maximum number of symbolic hops followed during resolution.
pub const SYMREF_MAX_DEPTH: usize = 5;

fn invalid(name: &str, reason: impl Into<String>) -> RefError {
    RefError::InvalidName {
        name: name.to_string(),
        reason: reason.into(),
    }
}

/// Validate a full reference name, returning `Ok(())` if valid.
///
/// # Examples
///
/// ```
/// use refdb_refs::names::check_refname_format;
///
/// assert!(check_refname_format("refs/heads/main").is_ok());
/// assert!(check_refname_format("HEAD").is_ok());
/// assert!(check_refname_format("main").is_err());
/// assert!(check_refname_format("refs/heads/bad..name").is_err());
/// ```
pub fn check_refname_format(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(invalid(name, "must not be empty"));
    }
    if name == "@" {
        return Err(invalid(name, "must not be '@'"));
    }

    if let Some(ch) = name.chars().find(|c| c.is_ascii_control() || FORBIDDEN_CHARS.contains(c)) {
        return Err(invalid(name, format!("contains forbidden character {ch:?}")));
    }
    if name.contains("..") {
        return Err(invalid(name, "must not contain '..'"));
    }
    if name.contains("@{") {
        return Err(invalid(name, "must not contain '@{'"));
    }
    if name.ends_with('.') {
        return Err(invalid(name, "must not end with '.'"));
    }

    for component in name.split('/') {
        if component.is_empty() {
            return Err(invalid(name, "path components must not be empty"));
        }
        if component.starts_with('.') {
            return Err(invalid(name, format!("component must not start with '.': {component:?}")));
        }
        if component.ends_with(".lock") {
            return Err(invalid(name, format!("component must not end with '.lock': {component:?}")));
        }
    }

    if !name.contains('/') {
        if !is_root_ref_syntax(name) {
            return Err(invalid(name, "one-level names must be root refs"));
        }
    } else if !name.starts_with("refs/") {
        return Err(invalid(name, "must start with 'refs/'"));
    }

    Ok(())
}

/// Returns `true` if `name` is made only of uppercase ASCII letters, `-`
/// and `_`.
pub fn is_root_ref_syntax(name: &str) -> bool {
    !name.is_empty()
        && name
            .bytes()
            .all(|b| b.is_ascii_uppercase() || b == b'-' || b == b'_')
}

/// Returns `true` for `HEAD` and the other top-level refs.
pub fn is_root_ref(name: &str) -> bool {
    is_root_ref_syntax(name)
        && (name == HEAD || name.ends_with("_HEAD") || IRREGULAR_ROOT_REFS.contains(&name))
}

/// Returns `true` if `name` belongs in a worktree's private store.
pub fn is_per_worktree(name: &str) -> bool {
    is_root_ref_syntax(name) || PER_WORKTREE_PREFIXES.iter().any(|p| name.starts_with(p))
}

/// Well-known namespaces a ref can live in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Namespace {
    Root,
    Branch,
    Tag,
    Remote,
    Other,
}

pub fn namespace(name: &str) -> Namespace {
    if name.starts_with("refs/heads/") {
        Namespace::Branch
    } else if name.starts_with("refs/tags/") {
        Namespace::Tag
    } else if name.starts_with("refs/remotes/") {
        Namespace::Remote
    } else if !name.contains('/') && is_root_ref_syntax(name) {
        Namespace::Root
    } else {
        Namespace::Other
    }
}

/// The shortest unambiguous display form of a full ref name.
pub fn shorten(name: &str) -> &str {
    for prefix in ["refs/heads/", "refs/tags/", "refs/remotes/", "refs/"] {
        if let Some(rest) = name.strip_prefix(prefix) {
            if !rest.is_empty() {
                return rest;
            }
        }
    }
    name
}

/// Key under which two names are considered the same by case-insensitive or
/// normalizing stores: Unicode NFC, then lowercase.
pub fn collision_key(name: &str) -> String {
    name.nfc().collect::<String>().to_lowercase()
}

/// Proper directory prefixes of a name: `refs/a/b/c` yields `refs/a/b`,
/// `refs/a`, and `refs`.
pub fn parent_dirs(name: &str) -> impl Iterator<Item = &str> {
    name.char_indices()
        .rev()
        .filter(|(_, c)| *c == '/')
        .map(move |(i, _)| &name[..i])
}
