//! The `table` backend: every record of a store in one sorted file.
//!
//! On-disk format of `<store>/refs.table`:
//! ```text
//! [4 bytes: magic "RDBT"]
//! [4 bytes: format version (little-endian u32)]
//! repeated, sorted by name:
//!   [4 bytes: payload length (little-endian u32)]
//!   [4 bytes: CRC32 of payload (little-endian u32)]
//!   [N bytes: payload (bincode-serialized RefRecord)]
//! ```
//!
//! Batches rewrite the whole table under `refs.table.lock`, so readers see
//! either the old or the new table.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::backend::{
    check_df_conflicts, check_expected, require_empty, validate_batch, RefIter, StorageBackend,
};
use crate::error::{RefError, Result};
use crate::format::RefStorageFormat;
use crate::lock::LockFile;
use crate::names::check_refname_format;
use crate::types::{LogAction, RefRecord, RefUpdate, WriteMode};

pub const TABLE_FILE: &str = "refs.table";

const MAGIC: &[u8; 4] = b"RDBT";
const VERSION: u32 = 1;

/// Magic plus version.
const FILE_HEADER_SIZE: usize = 8;
/// Frame header: 4 bytes length + 4 bytes CRC.
const FRAME_HEADER_SIZE: usize = 8;

/// Single-file storage backend.
#[derive(Debug)]
pub struct TableBackend {
    root: PathBuf,
}

impl TableBackend {
    /// Open an existing store whose table has a valid header.
    pub fn open(root: &Path) -> Result<Self> {
        if !root.is_dir() {
            return Err(RefError::NotFound {
                name: root.display().to_string(),
            });
        }
        let backend = Self {
            root: root.to_path_buf(),
        };
        match fs::read(backend.table_path()) {
            Ok(data) => {
                check_header(&data)?;
                Ok(backend)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(RefError::UnsupportedFormat {
                path: root.display().to_string(),
                reason: format!("no {TABLE_FILE}"),
            }),
            Err(e) => Err(e.into()),
        }
    }

    /// Create a store holding an empty table.
    pub fn create(root: &Path) -> Result<Self> {
        fs::create_dir_all(root)?;
        let backend = Self {
            root: root.to_path_buf(),
        };
        let mut lock = LockFile::acquire(&backend.table_path(), TABLE_FILE)?;
        lock.write_all(&encode_table(std::iter::empty::<&RefRecord>())?)?;
        lock.commit()?;
        Ok(backend)
    }

    fn table_path(&self) -> PathBuf {
        self.root.join(TABLE_FILE)
    }

    fn read_frames(&self) -> Result<TableIter> {
        let data = fs::read(self.table_path())?;
        check_header(&data)?;
        Ok(TableIter {
            data,
            offset: FILE_HEADER_SIZE,
            done: false,
        })
    }
}

impl StorageBackend for TableBackend {
    fn format_id(&self) -> RefStorageFormat {
        RefStorageFormat::Table
    }

    fn path(&self) -> &Path {
        &self.root
    }

    fn enumerate(&self) -> Result<RefIter<'_>> {
        Ok(Box::new(self.read_frames()?))
    }

    fn lookup(&self, name: &str) -> Result<RefRecord> {
        check_refname_format(name)?;
        for record in self.read_frames()? {
            match record {
                Ok(record) if record.name == name => return Ok(record),
                Ok(_) => {}
                Err(e) => warn!(error = %e, "skipping unreadable table record"),
            }
        }
        Err(RefError::NotFound {
            name: name.to_string(),
        })
    }

    fn write_batch(&self, updates: Vec<RefUpdate>, mode: WriteMode) -> Result<()> {
        validate_batch(&updates)?;

        let mut lock = LockFile::acquire(&self.table_path(), TABLE_FILE)?;
        if mode == WriteMode::Initial {
            require_empty(self)?;
        }

        let mut records = BTreeMap::new();
        for record in self.read_frames()? {
            let record = record?;
            records.insert(record.name.clone(), record);
        }

        let existing: BTreeSet<String> = records.keys().cloned().collect();
        check_df_conflicts(&existing, &updates)?;
        for update in &updates {
            check_expected(update, records.get(&update.name).map(|r| &r.target))?;
        }

        let count = updates.len();
        for update in updates {
            let Some(target) = update.new else {
                records.remove(&update.name);
                continue;
            };
            let previous = records.remove(&update.name).map(|r| r.log).unwrap_or_default();
            let log = match update.log {
                LogAction::Keep => previous,
                LogAction::Append(entry) => {
                    let mut log = previous;
                    log.push(entry);
                    log
                }
                LogAction::Replace(entries) => entries,
            };
            records.insert(
                update.name.clone(),
                RefRecord {
                    name: update.name,
                    target,
                    log,
                },
            );
        }

        lock.write_all(&encode_table(records.values())?)?;
        lock.commit()?;

        debug!(store = %self.root.display(), count, ?mode, "table batch committed");
        Ok(())
    }
}

/// Lazy decoder over the frames of a table file held in memory.
struct TableIter {
    data: Vec<u8>,
    offset: usize,
    done: bool,
}

impl Iterator for TableIter {
    type Item = Result<RefRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done || self.offset >= self.data.len() {
            return None;
        }
        let start = self.offset;
        let location = format!("{TABLE_FILE}@{start}");

        if start + FRAME_HEADER_SIZE > self.data.len() {
            self.done = true;
            return Some(Err(RefError::corrupt(location, "truncated frame header")));
        }
        let header = &self.data[start..start + FRAME_HEADER_SIZE];
        let length = u32::from_le_bytes([header[0], header[1], header[2], header[3]]) as usize;
        let expected_crc = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);

        let payload_start = start + FRAME_HEADER_SIZE;
        if length == 0 || payload_start + length > self.data.len() {
            // Without a usable length there is no way to find the next frame.
            self.done = true;
            return Some(Err(RefError::corrupt(location, format!("invalid frame length {length}"))));
        }
        self.offset = payload_start + length;

        let payload = &self.data[payload_start..payload_start + length];
        let actual_crc = crc32fast::hash(payload);
        if actual_crc != expected_crc {
            return Some(Err(RefError::corrupt(
                location,
                format!("CRC mismatch: expected {expected_crc:#010x}, got {actual_crc:#010x}"),
            )));
        }
        Some(
            bincode::deserialize::<RefRecord>(payload)
                .map_err(|e| RefError::corrupt(location, e.to_string())),
        )
    }
}

fn check_header(data: &[u8]) -> Result<()> {
    if data.len() < FILE_HEADER_SIZE || &data[..4] != MAGIC {
        return Err(RefError::corrupt(TABLE_FILE, "bad magic"));
    }
    let version = u32::from_le_bytes([data[4], data[5], data[6], data[7]]);
    if version != VERSION {
        return Err(RefError::corrupt(TABLE_FILE, format!("unsupported version {version}")));
    }
    Ok(())
}

fn encode_table<'a>(records: impl Iterator<Item = &'a RefRecord>) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(FILE_HEADER_SIZE);
    out.extend_from_slice(MAGIC);
    out.extend_from_slice(&VERSION.to_le_bytes());
    for record in records {
        let payload =
            bincode::serialize(record).map_err(|e| RefError::Serialization(e.to_string()))?;
        out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        out.extend_from_slice(&crc32fast::hash(&payload).to_le_bytes());
        out.extend_from_slice(&payload);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Expected, RefTarget, ReflogEntry};
    use refdb_types::{ObjectId, Signature};

    fn oid(seed: &str) -> ObjectId {
        ObjectId::from_bytes(seed.as_bytes())
    }

    fn backend() -> (tempfile::TempDir, TableBackend) {
        let dir = tempfile::tempdir().unwrap();
        let backend = TableBackend::create(dir.path()).unwrap();
        (dir, backend)
    }

    fn names(backend: &TableBackend) -> Vec<String> {
        backend.enumerate().unwrap().map(|r| r.unwrap().name).collect()
    }

    #[test]
    fn empty_table_enumerates_nothing() {
        let (dir, backend) = backend();
        assert!(names(&backend).is_empty());
        assert_eq!(fs::read(dir.path().join(TABLE_FILE)).unwrap().len(), FILE_HEADER_SIZE);
        TableBackend::open(dir.path()).unwrap();
    }

    #[test]
    fn records_are_kept_sorted() {
        let (_dir, backend) = backend();
        backend
            .write_batch(
                vec![
                    RefUpdate::create("refs/tags/v1", RefTarget::Direct(oid("t"))),
                    RefUpdate::create("HEAD", RefTarget::Symbolic("refs/heads/main".into())),
                    RefUpdate::create("refs/heads/main", RefTarget::Direct(oid("m"))),
                ],
                WriteMode::Initial,
            )
            .unwrap();
        assert_eq!(names(&backend), vec!["HEAD", "refs/heads/main", "refs/tags/v1"]);
    }

    #[test]
    fn log_actions_apply() {
        let (_dir, backend) = backend();
        let sig = Signature::new("T", "t@x", 1, 0);
        let first = ReflogEntry::new(ObjectId::null(), oid("a"), sig.clone(), "one");
        let second = ReflogEntry::new(oid("a"), oid("b"), sig, "two");

        backend
            .write_batch(
                vec![RefUpdate::create("refs/heads/a", RefTarget::Direct(oid("a")))
                    .with_log(LogAction::Append(first.clone()))],
                WriteMode::Normal,
            )
            .unwrap();
        backend
            .write_batch(
                vec![RefUpdate::set("refs/heads/a", RefTarget::Direct(oid("b")))
                    .with_log(LogAction::Append(second.clone()))],
                WriteMode::Normal,
            )
            .unwrap();
        assert_eq!(backend.lookup("refs/heads/a").unwrap().log, vec![first, second.clone()]);

        backend
            .write_batch(
                vec![RefUpdate::set("refs/heads/a", RefTarget::Direct(oid("c")))],
                WriteMode::Normal,
            )
            .unwrap();
        assert_eq!(backend.lookup("refs/heads/a").unwrap().log.len(), 2);
    }

    #[test]
    fn failed_batch_leaves_table_unchanged() {
        let (dir, backend) = backend();
        backend
            .write_batch(vec![RefUpdate::create("refs/heads/a", RefTarget::Direct(oid("a")))], WriteMode::Normal)
            .unwrap();
        let before = fs::read(dir.path().join(TABLE_FILE)).unwrap();

        let err = backend
            .write_batch(
                vec![
                    RefUpdate::delete("refs/heads/a"),
                    RefUpdate::create("refs/heads/b", RefTarget::Direct(oid("b")))
                        .expecting(Expected::Value(RefTarget::Unborn)),
                ],
                WriteMode::Normal,
            )
            .unwrap_err();
        assert!(matches!(err, RefError::Conflict { .. }));
        assert_eq!(fs::read(dir.path().join(TABLE_FILE)).unwrap(), before);
        assert!(!dir.path().join("refs.table.lock").exists());
    }

    #[test]
    fn nested_names_conflict() {
        let (_dir, backend) = backend();
        backend
            .write_batch(vec![RefUpdate::create("refs/heads/a", RefTarget::Direct(oid("a")))], WriteMode::Normal)
            .unwrap();
        let err = backend
            .write_batch(vec![RefUpdate::create("refs/heads/a/b", RefTarget::Direct(oid("b")))], WriteMode::Normal)
            .unwrap_err();
        assert!(matches!(err, RefError::Conflict { .. }));
    }

    #[test]
    fn crc_mismatch_is_reported_and_skipped() {
        let (dir, backend) = backend();
        backend
            .write_batch(
                vec![
                    RefUpdate::create("refs/heads/a", RefTarget::Direct(oid("a"))),
                    RefUpdate::create("refs/heads/b", RefTarget::Direct(oid("b"))),
                ],
                WriteMode::Normal,
            )
            .unwrap();

        let path = dir.path().join(TABLE_FILE);
        let mut data = fs::read(&path).unwrap();
        // Flip a byte inside the first payload.
        data[FILE_HEADER_SIZE + FRAME_HEADER_SIZE + 2] ^= 0xff;
        fs::write(&path, data).unwrap();

        let results: Vec<_> = backend.enumerate().unwrap().collect();
        assert_eq!(results.len(), 2);
        assert!(matches!(results[0], Err(RefError::Corrupt { .. })));
        assert_eq!(results[1].as_ref().unwrap().name, "refs/heads/b");
    }

    #[test]
    fn open_rejects_other_layouts() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(TableBackend::open(dir.path()), Err(RefError::UnsupportedFormat { .. })));
        fs::write(dir.path().join(TABLE_FILE), b"nope").unwrap();
        assert!(matches!(TableBackend::open(dir.path()), Err(RefError::Corrupt { .. })));
    }
}
