//! Migration of a ref database between storage formats.
//!
//! [`migrate`] copies every record of a [`RefDatabase`](refdb_refs::RefDatabase)
//! into a freshly staged store of the target format and then switches the
//! database over in one atomic step. Readers never observe a partially
//! migrated store: until the switch they see the old store, afterwards the
//! complete new one.
//!
//! # Modules
//!
//! - [`error`]: [`MigrationError`]
//! - [`plan`]: [`MigrationFlags`], [`MigrationPlan`], [`MigrationReport`]
//! - [`engine`]: [`migrate`] and [`migrate_repository`]

pub mod engine;
pub mod error;
pub mod plan;

pub use engine::{migrate, migrate_repository};
pub use error::{MigrationError, Result};
pub use plan::{MigrationFlags, MigrationPlan, MigrationReport, RejectedRef};
