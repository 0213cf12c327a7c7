//! Listing refs: filter, sort, and format.
//!
//! [`list`] takes a [`RefView`](refdb_refs::RefView), an object store, and a
//! [`ListRequest`], and yields one rendered line per selected ref:
//!
//! 1. the request is validated (quote style, pattern source, template,
//!    sort keys, count) before anything is read;
//! 2. refs are selected by name pattern, exclusion, category, and object
//!    predicates (`points-at`, `merged`, `contains`);
//! 3. the survivors are sorted by the requested keys, with the full name
//!    as the final tie-break;
//! 4. each ref is rendered through the `%(atom)` template.
//!
//! Same refs and same request give byte-identical output.

pub mod error;
pub mod filter;
pub mod format;
pub mod item;
pub mod list;
pub mod quote;
pub mod sort;

pub use error::{FilterError, Result};
pub use filter::{NameMatcher, ObjectFilter, RefKinds};
pub use format::{Atom, NameMod, Template, DEFAULT_FORMAT};
pub use item::{ObjectInfo, RefItem};
pub use list::{list, ListRequest, Listing};
pub use quote::QuoteStyle;
pub use sort::{version_cmp, SortKey};
