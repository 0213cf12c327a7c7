//! Foundation types for refdb.
//!
//! Every other refdb crate depends on `refdb-types`. The types here are small
//! value types with no I/O.
//!
//! # Key Types
//!
//! - [`ObjectId`]: Content-addressed identifier (BLAKE3 hash)
//! - [`ObjectKind`]: The kind of object a reference can point at
//! - [`Signature`]: Actor and timestamp recorded in reflog entries

pub mod error;
pub mod kind;
pub mod object;
pub mod signature;

pub use error::TypeError;
pub use kind::ObjectKind;
pub use object::ObjectId;
pub use signature::Signature;
