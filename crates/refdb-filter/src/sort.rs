//! Sort keys for ref listings.
//!
//! A key is an atom name, optionally prefixed with `-` for descending order
//! and `version:` (or `v:`) to compare embedded numbers numerically, e.g.
//! `-version:refname`. Keys apply in order; refs that compare equal on every
//! key are ordered by full name, ascending.

use std::cmp::Ordering;

use crate::error::{FilterError, Result};
use crate::format::{Atom, NameMod};
use crate::item::RefItem;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SortKey {
    pub atom: Atom,
    pub descending: bool,
    pub version: bool,
    pub ignore_case: bool,
}

impl SortKey {
    pub fn parse(spec: &str) -> Result<Self> {
        let invalid = || FilterError::InvalidSortKey(spec.to_string());
        let (descending, rest) = match spec.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, spec),
        };
        let (version, rest) = match rest.strip_prefix("version:").or_else(|| rest.strip_prefix("v:")) {
            Some(rest) => (true, rest),
            None => (false, rest),
        };
        if rest.is_empty() {
            return Err(invalid());
        }
        let atom = Atom::parse(rest).map_err(|_| invalid())?;
        Ok(Self {
            atom,
            descending,
            version,
            ignore_case: false,
        })
    }

    pub fn by_refname() -> Self {
        Self {
            atom: Atom::RefName(NameMod::Full),
            descending: false,
            version: false,
            ignore_case: false,
        }
    }

    fn compare(&self, a: &RefItem, b: &RefItem, head: Option<&str>) -> Ordering {
        let ordering = match self.atom {
            Atom::ObjectSize => {
                let size = |item: &RefItem| item.object.map(|o| o.size);
                size(a).cmp(&size(b))
            }
            atom => {
                let (mut x, mut y) = (atom.value(a, head), atom.value(b, head));
                if self.ignore_case {
                    x = x.to_lowercase();
                    y = y.to_lowercase();
                }
                if self.version {
                    version_cmp(&x, &y)
                } else {
                    x.cmp(&y)
                }
            }
        };
        if self.descending {
            ordering.reverse()
        } else {
            ordering
        }
    }
}

/// Parse keys, defaulting to `refname` when none are given.
pub fn parse_keys(specs: &[String], ignore_case: bool) -> Result<Vec<SortKey>> {
    let mut keys = specs
        .iter()
        .map(|spec| SortKey::parse(spec))
        .collect::<Result<Vec<_>>>()?;
    if keys.is_empty() {
        keys.push(SortKey::by_refname());
    }
    for key in &mut keys {
        key.ignore_case = ignore_case;
    }
    Ok(keys)
}

pub fn needs_object(keys: &[SortKey]) -> bool {
    keys.iter().any(|k| k.atom.needs_object())
}

/// Stable sort by `keys`, ties broken by full name.
pub fn sort_items(items: &mut [RefItem], keys: &[SortKey], head: Option<&str>) {
    items.sort_by(|a, b| {
        keys.iter()
            .map(|key| key.compare(a, b, head))
            .find(|o| o.is_ne())
            .unwrap_or_else(|| a.name.cmp(&b.name))
    });
}

/// Compare strings treating runs of digits as numbers: `v1.9 < v1.10`.
pub fn version_cmp(a: &str, b: &str) -> Ordering {
    let (mut x, mut y) = (a.as_bytes(), b.as_bytes());
    loop {
        match (x.first(), y.first()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(c), Some(d)) if c.is_ascii_digit() && d.is_ascii_digit() => {
                let (m, rest_x) = split_number(x);
                let (n, rest_y) = split_number(y);
                let ordering = m.len().cmp(&n.len()).then_with(|| m.cmp(n));
                if ordering.is_ne() {
                    return ordering;
                }
                x = rest_x;
                y = rest_y;
            }
            (Some(c), Some(d)) => {
                if c != d {
                    return c.cmp(d);
                }
                x = &x[1..];
                y = &y[1..];
            }
        }
    }
}

/// Leading digits without leading zeros, and the remainder.
fn split_number(s: &[u8]) -> (&[u8], &[u8]) {
    let end = s.iter().position(|b| !b.is_ascii_digit()).unwrap_or(s.len());
    let digits = &s[..end];
    let zeros = digits.iter().take_while(|b| **b == b'0').count();
    (&digits[zeros..], &s[end..])
}
