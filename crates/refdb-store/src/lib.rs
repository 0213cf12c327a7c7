//! Content-addressed object storage consumed by refdb.
//!
//! References point into an object store. refdb never interprets object
//! contents beyond three questions: does an object exist, what kind is it,
//! and which objects does it link to (commit parents, annotated tag targets).
//! Those answers back dangling-ref checks, `points-at` peeling, and the
//! `merged`/`contains` ancestry filters.
//!
//! # Storage Backends
//!
//! All backends implement the [`ObjectStore`] trait:
//!
//! - [`InMemoryObjectStore`] -- `HashMap`-based store for tests and embedding
//! - [`LooseObjectStore`] -- one JSON file per object under `objects/`

pub mod ancestry;
pub mod error;
pub mod loose;
pub mod memory;
pub mod object;
pub mod traits;

pub use ancestry::{ancestor_set, is_ancestor};
pub use error::{StoreError, StoreResult};
pub use loose::LooseObjectStore;
pub use memory::InMemoryObjectStore;
pub use object::StoredObject;
pub use traits::ObjectStore;
