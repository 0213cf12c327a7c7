//! Exclusive `.lock` files committed by rename.
//!
//! Taking a lock creates `<target>.lock` with `O_EXCL`; the new content is
//! written into the lock file and [`LockFile::commit`] renames it over the
//! target. A lock that is dropped without being committed removes itself, so
//! every early return leaves the target untouched.

use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::error::{RefError, Result};

#[derive(Debug)]
pub struct LockFile {
    target: PathBuf,
    lock_path: PathBuf,
    file: Option<File>,
}

impl LockFile {
    /// Lock `target`, creating parent directories as needed.
    ///
    /// `name` is only used for error reporting.
    pub fn acquire(target: &Path, name: &str) -> Result<Self> {
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        let lock_path = lock_path_for(target);
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&lock_path)
            .map_err(|e| match e.kind() {
                io::ErrorKind::AlreadyExists => RefError::conflict(
                    name,
                    format!("unable to lock {}: already locked", target.display()),
                ),
                _ => RefError::Io(e),
            })?;
        Ok(Self {
            target: target.to_path_buf(),
            lock_path,
            file: Some(file),
        })
    }

    pub fn target(&self) -> &Path {
        &self.target
    }

    /// Replace the pending content of the lock.
    pub fn write_all(&mut self, bytes: &[u8]) -> Result<()> {
        let file = self
            .file
            .as_mut()
            .ok_or_else(|| RefError::Io(io::Error::other("lock already closed")))?;
        file.set_len(0)?;
        file.write_all(bytes)?;
        file.sync_all()?;
        Ok(())
    }

    /// Atomically move the lock's content over the target.
    pub fn commit(mut self) -> Result<()> {
        drop(self.file.take());
        fs::rename(&self.lock_path, &self.target)?;
        self.lock_path = PathBuf::new();
        Ok(())
    }

    /// Release the lock and remove the target itself.
    pub fn commit_delete(mut self) -> Result<()> {
        match fs::remove_file(&self.target) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        drop(self.file.take());
        fs::remove_file(&self.lock_path)?;
        self.lock_path = PathBuf::new();
        Ok(())
    }
}

impl Drop for LockFile {
    fn drop(&mut self) {
        drop(self.file.take());
        if !self.lock_path.as_os_str().is_empty() {
            let _ = fs::remove_file(&self.lock_path);
        }
    }
}

fn lock_path_for(target: &Path) -> PathBuf {
    let mut name: OsString = target.as_os_str().to_owned();
    name.push(".lock");
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commit_replaces_target() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("a/b/HEAD");
        let mut lock = LockFile::acquire(&target, "HEAD").unwrap();
        lock.write_all(b"first").unwrap();
        lock.write_all(b"second").unwrap();
        lock.commit().unwrap();
        assert_eq!(fs::read(&target).unwrap(), b"second");
        assert!(!dir.path().join("a/b/HEAD.lock").exists());
    }

    #[test]
    fn second_lock_conflicts() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("ref");
        let _held = LockFile::acquire(&target, "ref").unwrap();
        let err = LockFile::acquire(&target, "ref").unwrap_err();
        assert!(matches!(err, RefError::Conflict { .. }));
    }

    #[test]
    fn dropped_lock_leaves_target_alone() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("ref");
        fs::write(&target, b"original").unwrap();
        {
            let mut lock = LockFile::acquire(&target, "ref").unwrap();
            lock.write_all(b"changed").unwrap();
        }
        assert_eq!(fs::read(&target).unwrap(), b"original");
        assert!(!dir.path().join("ref.lock").exists());
    }

    #[test]
    fn commit_delete_removes_target() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("ref");
        fs::write(&target, b"x").unwrap();
        LockFile::acquire(&target, "ref").unwrap().commit_delete().unwrap();
        assert!(!target.exists());
        assert!(!dir.path().join("ref.lock").exists());
    }
}
