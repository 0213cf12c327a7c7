//! A reference database: a pointer file naming the active store directory.
//!
//! ```text
//! <dir>/REFSTORE                       {"format":"files","store":"files-<uuid>"}
//! <dir>/stores/files-<uuid>/           the active store
//! <dir>/stores/migrate-XXXX/           a staging store, removed unless published
//! ```
//!
//! Switching formats builds a complete store next to the active one and then
//! replaces `REFSTORE` through a lock file and a rename. Readers that open the
//! database before the rename see the old store, readers after it the new one.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tempfile::TempDir;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::backend::{create_backend, open_backend, RefIter, StorageBackend};
use crate::error::{RefError, Result};
use crate::format::RefStorageFormat;
use crate::lock::LockFile;
use crate::types::{RefRecord, RefUpdate, WriteMode};

pub const POINTER_FILE: &str = "REFSTORE";
pub const STORES_DIR: &str = "stores";

/// Contents of the `REFSTORE` pointer file.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorePointer {
    pub format: RefStorageFormat,
    /// Directory name under `stores/`.
    pub store: String,
}

/// Handle on one reference database.
pub struct RefDatabase {
    dir: PathBuf,
    pointer: StorePointer,
    backend: Box<dyn StorageBackend>,
}

impl std::fmt::Debug for RefDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefDatabase")
            .field("dir", &self.dir)
            .field("pointer", &self.pointer)
            .finish_non_exhaustive()
    }
}

impl RefDatabase {
    /// Create a new, empty database of `format` in `dir`.
    pub fn init(dir: &Path, format: RefStorageFormat) -> Result<Self> {
        let pointer_path = dir.join(POINTER_FILE);
        if pointer_path.exists() {
            return Err(RefError::conflict(
                POINTER_FILE,
                format!("database already exists at {}", dir.display()),
            ));
        }
        let stores = dir.join(STORES_DIR);
        fs::create_dir_all(&stores)?;

        let store = new_store_name(format);
        let backend = create_backend(format, &stores.join(&store))?;
        let pointer = StorePointer { format, store };
        write_pointer(dir, &pointer)?;

        debug!(dir = %dir.display(), %format, "initialized ref database");
        Ok(Self {
            dir: dir.to_path_buf(),
            pointer,
            backend,
        })
    }

    /// Open an existing database.
    pub fn open(dir: &Path) -> Result<Self> {
        Self::open_with(dir, open_backend)
    }

    /// Open an existing database, constructing its backend with `opener`.
    ///
    /// Lets callers wrap the backend, e.g. to observe or fail operations.
    pub fn open_with<F>(dir: &Path, opener: F) -> Result<Self>
    where
        F: FnOnce(RefStorageFormat, &Path) -> Result<Box<dyn StorageBackend>>,
    {
        let pointer = read_pointer(dir)?;
        let backend = opener(pointer.format, &dir.join(STORES_DIR).join(&pointer.store))?;
        Ok(Self {
            dir: dir.to_path_buf(),
            pointer,
            backend,
        })
    }

    /// Returns `true` if `dir` holds a database pointer.
    pub fn exists(dir: &Path) -> bool {
        dir.join(POINTER_FILE).is_file()
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn format(&self) -> RefStorageFormat {
        self.pointer.format
    }

    pub fn pointer(&self) -> &StorePointer {
        &self.pointer
    }

    /// Directory of the active store.
    pub fn store_path(&self) -> PathBuf {
        self.dir.join(STORES_DIR).join(&self.pointer.store)
    }

    pub fn backend(&self) -> &dyn StorageBackend {
        self.backend.as_ref()
    }

    pub fn enumerate(&self) -> Result<RefIter<'_>> {
        self.backend.enumerate()
    }

    pub fn lookup(&self, name: &str) -> Result<RefRecord> {
        self.backend.lookup(name)
    }

    pub fn try_lookup(&self, name: &str) -> Result<Option<RefRecord>> {
        self.backend.try_lookup(name)
    }

    pub fn write_batch(&self, updates: Vec<RefUpdate>) -> Result<()> {
        self.backend.write_batch(updates, WriteMode::Normal)
    }

    /// Create an empty store of `format` in a private staging directory.
    ///
    /// The directory is removed when the returned [`TempDir`] is dropped
    /// unless it is handed to [`RefDatabase::publish`].
    pub fn stage_store(&self, format: RefStorageFormat) -> Result<(TempDir, Box<dyn StorageBackend>)> {
        let staging = tempfile::Builder::new()
            .prefix("migrate-")
            .tempdir_in(self.dir.join(STORES_DIR))?;
        let backend = create_backend(format, staging.path())?;
        debug!(path = %staging.path().display(), %format, "staged empty store");
        Ok((staging, backend))
    }

    /// Make a staged store the active store of this database.
    ///
    /// The staged directory is renamed to its permanent name, the pointer is
    /// replaced through `REFSTORE.lock`, and the handle switches to the new
    /// backend. The previous store directory is removed afterwards; failing
    /// to remove it is logged and otherwise ignored.
    pub fn publish(&mut self, format: RefStorageFormat, staged: TempDir) -> Result<()> {
        let store = new_store_name(format);
        let final_path = self.dir.join(STORES_DIR).join(&store);
        let staged_path = staged.keep();

        if let Err(e) = fs::rename(&staged_path, &final_path) {
            let _ = fs::remove_dir_all(&staged_path);
            return Err(e.into());
        }
        let backend = match open_backend(format, &final_path) {
            Ok(backend) => backend,
            Err(e) => {
                let _ = fs::remove_dir_all(&final_path);
                return Err(e);
            }
        };

        let pointer = StorePointer { format, store };
        if let Err(e) = write_pointer(&self.dir, &pointer) {
            let _ = fs::remove_dir_all(&final_path);
            return Err(e);
        }

        let old_path = self.store_path();
        let old_format = self.pointer.format;
        self.pointer = pointer;
        self.backend = backend;
        info!(dir = %self.dir.display(), from = %old_format, to = %format, "published ref store");

        if let Err(e) = fs::remove_dir_all(&old_path) {
            warn!(path = %old_path.display(), error = %e, "failed to remove retired ref store");
        }
        Ok(())
    }
}

fn new_store_name(format: RefStorageFormat) -> String {
    format!("{}-{}", format.name(), Uuid::now_v7())
}

fn read_pointer(dir: &Path) -> Result<StorePointer> {
    let path = dir.join(POINTER_FILE);
    let content = match fs::read_to_string(&path) {
        Ok(content) => content,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(RefError::NotFound {
                name: path.display().to_string(),
            })
        }
        Err(e) => return Err(e.into()),
    };
    let pointer: StorePointer = serde_json::from_str(&content)
        .map_err(|e| RefError::corrupt(POINTER_FILE, e.to_string()))?;
    if pointer.store.is_empty() || pointer.store.contains(['/', '\\']) || pointer.store.starts_with('.') {
        return Err(RefError::corrupt(
            POINTER_FILE,
            format!("bad store directory {:?}", pointer.store),
        ));
    }
    Ok(pointer)
}

fn write_pointer(dir: &Path, pointer: &StorePointer) -> Result<()> {
    let json =
        serde_json::to_string_pretty(pointer).map_err(|e| RefError::Serialization(e.to_string()))?;
    let mut lock = LockFile::acquire(&dir.join(POINTER_FILE), POINTER_FILE)?;
    lock.write_all(format!("{json}\n").as_bytes())?;
    lock.commit()
}
