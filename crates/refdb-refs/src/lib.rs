//! Reference databases.
//!
//! A repository's references (branches, tags, `HEAD`, and other pointers
//! into the object store) live in a [`RefDatabase`]. The database stores its
//! records through a [`StorageBackend`] chosen at runtime by
//! [`RefStorageFormat`], and can switch to a store of another format
//! atomically.
//!
//! # Architecture
//!
//! - **Records** are a name, a target (direct, symbolic, or unborn), and a
//!   reflog.
//! - **Backends** enumerate records lazily in name order and apply batches
//!   of updates all-or-nothing. Two formats exist: `files` and `table`.
//! - **Databases** keep a `REFSTORE` pointer naming the active store
//!   directory; replacing the pointer is the single switch used to publish a
//!   new store.
//! - **Worktrees** share one database and keep per-worktree refs in a
//!   private one. A [`RefView`] merges the two.
//!
//! # Modules
//!
//! - [`error`]: Error types for ref operations
//! - [`types`]: [`RefRecord`], [`RefTarget`], [`RefUpdate`], [`ReflogEntry`]
//! - [`names`]: Refname grammar and namespace classification
//! - [`backend`]: The [`StorageBackend`] trait and format dispatch
//! - [`files`] / [`table`]: The two storage backends
//! - [`database`]: [`RefDatabase`] and the store pointer
//! - [`view`]: [`RefView`] and symbolic resolution
//! - [`worktree`]: [`WorktreeRegistry`]
//! - [`config`]: [`RepoConfig`]

pub mod backend;
pub mod config;
pub mod database;
pub mod error;
pub mod files;
pub mod format;
pub mod lock;
pub mod names;
pub mod table;
pub mod types;
pub mod view;
pub mod worktree;

pub use backend::{create_backend, open_backend, RefIter, StorageBackend};
pub use config::{ListConfig, RefsConfig, RepoConfig};
pub use database::{RefDatabase, StorePointer};
pub use error::{RefError, Result};
pub use files::FilesBackend;
pub use format::RefStorageFormat;
pub use table::TableBackend;
pub use types::{Expected, LogAction, RefRecord, RefTarget, RefUpdate, ReflogEntry, WriteMode};
pub use view::{RefView, Resolved};
pub use worktree::{Worktree, WorktreeRegistry};
