//! The `files` backend: one file per ref plus a compacted `packed-refs` table.
//!
//! Store layout:
//!
//! ```text
//! <store>/HEAD                 root refs, one file each
//! <store>/refs/heads/main      loose refs: "<hex>\n" or "ref: <name>\n"
//! <store>/packed-refs          "<hex> <name>\n" lines, sorted by name
//! <store>/logs/<name>          "<old> <new> <signature>\t<message>\n" per entry
//! ```
//!
//! A loose ref shadows a packed ref of the same name. Unborn refs are stored
//! as the null id. Reflog messages escape `\` and newlines so that a log
//! survives a round trip through the other backend unchanged.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use walkdir::WalkDir;

use refdb_types::{ObjectId, Signature};

use crate::backend::{
    check_df_conflicts, check_expected, require_empty, validate_batch, RefIter, StorageBackend,
};
use crate::error::{RefError, Result};
use crate::format::RefStorageFormat;
use crate::lock::LockFile;
use crate::names::{check_refname_format, is_root_ref_syntax};
use crate::types::{LogAction, RefRecord, RefTarget, RefUpdate, ReflogEntry, WriteMode};

const PACKED_REFS: &str = "packed-refs";
const PACKED_HEADER: &str = "# pack-refs with: sorted\n";
const REFS_DIR: &str = "refs";
const LOGS_DIR: &str = "logs";

/// File-per-ref storage backend.
#[derive(Debug)]
pub struct FilesBackend {
    root: PathBuf,
}

impl FilesBackend {
    /// Open an existing store. The store must contain a `refs/` directory.
    pub fn open(root: &Path) -> Result<Self> {
        if !root.is_dir() {
            return Err(RefError::NotFound {
                name: root.display().to_string(),
            });
        }
        if !root.join(REFS_DIR).is_dir() {
            return Err(RefError::UnsupportedFormat {
                path: root.display().to_string(),
                reason: "no refs/ directory".into(),
            });
        }
        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    /// Create an empty store at `root`.
    pub fn create(root: &Path) -> Result<Self> {
        fs::create_dir_all(root.join(REFS_DIR))?;
        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    fn ref_path(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    fn log_path(&self, name: &str) -> PathBuf {
        self.root.join(LOGS_DIR).join(name)
    }

    fn packed_path(&self) -> PathBuf {
        self.root.join(PACKED_REFS)
    }

    fn read_packed(&self) -> Result<BTreeMap<String, ObjectId>> {
        let content = match fs::read_to_string(self.packed_path()) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(e) => return Err(e.into()),
        };
        decode_packed(&content)
    }

    /// Names of all loose refs, root refs included.
    fn loose_names(&self) -> Result<BTreeSet<String>> {
        let mut names = BTreeSet::new();

        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            if let Some(name) = entry.file_name().to_str() {
                if is_root_ref_syntax(name) {
                    names.insert(name.to_string());
                }
            }
        }

        let refs_dir = self.root.join(REFS_DIR);
        for entry in WalkDir::new(&refs_dir).min_depth(1) {
            let entry = entry.map_err(|e| RefError::Io(io::Error::other(e.to_string())))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let Ok(relative) = entry.path().strip_prefix(&self.root) else {
                continue;
            };
            let parts: Option<Vec<&str>> = relative.components().map(|c| c.as_os_str().to_str()).collect();
            let Some(parts) = parts else {
                warn!(path = %entry.path().display(), "skipping loose ref with non UTF-8 name");
                continue;
            };
            let name = parts.join("/");
            if name.ends_with(".lock") {
                continue;
            }
            names.insert(name);
        }
        Ok(names)
    }

    fn all_names(&self) -> Result<BTreeSet<String>> {
        let mut names = self.loose_names()?;
        names.extend(self.read_packed()?.into_keys());
        Ok(names)
    }

    fn read_loose(&self, name: &str) -> Result<Option<RefTarget>> {
        let path = self.ref_path(name);
        if path.is_dir() {
            return Ok(None);
        }
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let content =
            String::from_utf8(bytes).map_err(|_| RefError::corrupt(name, "ref file is not UTF-8"))?;
        decode_loose(name, &content).map(Some)
    }

    fn read_current(&self, name: &str, packed: &BTreeMap<String, ObjectId>) -> Result<Option<RefTarget>> {
        match self.read_loose(name)? {
            Some(target) => Ok(Some(target)),
            None => Ok(packed.get(name).map(|id| RefTarget::Direct(*id))),
        }
    }

    fn read_log(&self, name: &str) -> Result<Vec<ReflogEntry>> {
        let content = match fs::read_to_string(self.log_path(name)) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) if e.kind() == io::ErrorKind::IsADirectory => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        content
            .lines()
            .filter(|line| !line.is_empty())
            .map(|line| decode_log_line(name, line))
            .collect()
    }

    fn load_record(
        &self,
        name: &str,
        packed: &BTreeMap<String, ObjectId>,
    ) -> Result<Option<RefRecord>> {
        let Some(target) = self.read_current(name, packed)? else {
            return Ok(None);
        };
        let log = self.read_log(name)?;
        Ok(Some(RefRecord {
            name: name.to_string(),
            target,
            log,
        }))
    }

    /// Remove now-empty directories above `path`, stopping at `stop`.
    fn prune_empty_parents(path: &Path, stop: &Path) {
        let mut dir = path.parent();
        while let Some(current) = dir {
            if current == stop || !current.starts_with(stop) {
                break;
            }
            if fs::remove_dir(current).is_err() {
                break;
            }
            dir = current.parent();
        }
    }
}

impl StorageBackend for FilesBackend {
    fn format_id(&self) -> RefStorageFormat {
        RefStorageFormat::Files
    }

    fn path(&self) -> &Path {
        &self.root
    }

    fn enumerate(&self) -> Result<RefIter<'_>> {
        let packed = self.read_packed()?;
        let mut names = self.loose_names()?;
        names.extend(packed.keys().cloned());

        Ok(Box::new(names.into_iter().filter_map(move |name| {
            self.load_record(&name, &packed).transpose()
        })))
    }

    fn lookup(&self, name: &str) -> Result<RefRecord> {
        check_refname_format(name)?;
        let packed = self.read_packed()?;
        self.load_record(name, &packed)?.ok_or_else(|| RefError::NotFound {
            name: name.to_string(),
        })
    }

    fn write_batch(&self, updates: Vec<RefUpdate>, mode: WriteMode) -> Result<()> {
        validate_batch(&updates)?;
        if mode == WriteMode::Initial {
            require_empty(self)?;
        }
        check_df_conflicts(&self.all_names()?, &updates)?;

        // Direct refs of an initial batch go straight into packed-refs.
        let packed_only = |update: &RefUpdate| {
            mode == WriteMode::Initial && matches!(update.new, Some(RefTarget::Direct(_)))
        };

        let mut ref_locks = Vec::with_capacity(updates.len());
        for update in &updates {
            if packed_only(update) {
                ref_locks.push(None);
                continue;
            }
            let path = self.ref_path(&update.name);
            if path.is_dir() {
                fs::remove_dir(&path).map_err(|_| {
                    RefError::conflict(&update.name, "a directory is in the way of this ref")
                })?;
            }
            ref_locks.push(Some(LockFile::acquire(&path, &update.name)?));
        }

        let packed = self.read_packed()?;
        for update in &updates {
            let current = self.read_current(&update.name, &packed)?;
            check_expected(update, current.as_ref())?;
        }

        let mut new_packed = packed.clone();
        for update in &updates {
            match &update.new {
                None => {
                    new_packed.remove(&update.name);
                }
                Some(RefTarget::Direct(id)) if packed_only(update) => {
                    new_packed.insert(update.name.clone(), *id);
                }
                Some(_) => {}
            }
        }
        let packed_lock = if new_packed != packed {
            let mut lock = LockFile::acquire(&self.packed_path(), PACKED_REFS)?;
            lock.write_all(encode_packed(&new_packed).as_bytes())?;
            Some(lock)
        } else {
            None
        };

        let mut pending = Vec::new();
        for (update, lock) in updates.iter().zip(ref_locks) {
            let Some(mut lock) = lock else { continue };
            match &update.new {
                Some(target) => {
                    lock.write_all(encode_loose(target).as_bytes())?;
                    pending.push((lock, true));
                }
                None => pending.push((lock, false)),
            }
        }

        for update in &updates {
            let path = self.log_path(&update.name);
            let entries = match (&update.new, &update.log) {
                (None, _) => None,
                (Some(_), LogAction::Keep) => continue,
                (Some(_), LogAction::Append(entry)) => {
                    let mut entries = self.read_log(&update.name)?;
                    entries.push(entry.clone());
                    Some(entries)
                }
                (Some(_), LogAction::Replace(entries)) if entries.is_empty() => None,
                (Some(_), LogAction::Replace(entries)) => Some(entries.clone()),
            };
            match entries {
                Some(entries) => {
                    let mut lock = LockFile::acquire(&path, &update.name)?;
                    lock.write_all(encode_log(&entries).as_bytes())?;
                    pending.push((lock, true));
                }
                None if path.is_file() => {
                    pending.push((LockFile::acquire(&path, &update.name)?, false));
                }
                None => {}
            }
        }

        // Everything is staged; publish packed-refs first so that deleting a
        // loose ref never uncovers a stale packed value.
        if let Some(lock) = packed_lock {
            lock.commit()?;
        }
        for (lock, write) in pending {
            let target = lock.target().to_path_buf();
            if write {
                lock.commit()?;
            } else {
                lock.commit_delete()?;
                let stop = if target.starts_with(self.root.join(LOGS_DIR)) {
                    self.root.join(LOGS_DIR)
                } else {
                    self.root.join(REFS_DIR)
                };
                Self::prune_empty_parents(&target, &stop);
            }
        }

        debug!(store = %self.root.display(), count = updates.len(), ?mode, "files batch committed");
        Ok(())
    }
}

fn decode_loose(name: &str, content: &str) -> Result<RefTarget> {
    let body = content.strip_suffix('\n').unwrap_or(content);
    if let Some(target) = body.strip_prefix("ref: ") {
        if target.is_empty() || target.contains(char::is_whitespace) {
            return Err(RefError::corrupt(name, format!("bad symbolic target {target:?}")));
        }
        return Ok(RefTarget::Symbolic(target.to_string()));
    }
    let id = ObjectId::from_hex(body)
        .map_err(|e| RefError::corrupt(name, format!("bad ref content: {e}")))?;
    Ok(if id.is_null() {
        RefTarget::Unborn
    } else {
        RefTarget::Direct(id)
    })
}

fn encode_loose(target: &RefTarget) -> String {
    match target {
        RefTarget::Direct(id) => format!("{id}\n"),
        RefTarget::Symbolic(name) => format!("ref: {name}\n"),
        RefTarget::Unborn => format!("{}\n", ObjectId::null()),
    }
}

fn decode_packed(content: &str) -> Result<BTreeMap<String, ObjectId>> {
    let mut refs = BTreeMap::new();
    for (index, line) in content.lines().enumerate() {
        if line.is_empty() || line.starts_with('#') || line.starts_with('^') {
            continue;
        }
        let corrupt = |reason: String| RefError::corrupt(format!("{PACKED_REFS}:{}", index + 1), reason);
        let (hex, name) = line
            .split_once(' ')
            .ok_or_else(|| corrupt("missing separator".into()))?;
        let id = ObjectId::from_hex(hex).map_err(|e| corrupt(e.to_string()))?;
        refs.insert(name.to_string(), id);
    }
    Ok(refs)
}

fn encode_packed(refs: &BTreeMap<String, ObjectId>) -> String {
    let mut out = String::from(PACKED_HEADER);
    for (name, id) in refs {
        out.push_str(&format!("{id} {name}\n"));
    }
    out
}

fn escape_message(message: &str) -> String {
    let mut out = String::with_capacity(message.len());
    for c in message.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c => out.push(c),
        }
    }
    out
}

fn unescape_message(message: &str) -> String {
    let mut out = String::with_capacity(message.len());
    let mut chars = message.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('t') => out.push('\t'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

fn encode_log(entries: &[ReflogEntry]) -> String {
    let mut out = String::new();
    for entry in entries {
        out.push_str(&format!(
            "{} {} {}\t{}\n",
            entry.old,
            entry.new,
            entry.committer,
            escape_message(&entry.message)
        ));
    }
    out
}

fn decode_log_line(name: &str, line: &str) -> Result<ReflogEntry> {
    let corrupt = |reason: &str| RefError::corrupt(format!("{LOGS_DIR}/{name}"), reason.to_string());
    let (head, message) = line.split_once('\t').unwrap_or((line, ""));
    let mut parts = head.splitn(3, ' ');
    let old = parts.next().and_then(|h| ObjectId::from_hex(h).ok());
    let new = parts.next().and_then(|h| ObjectId::from_hex(h).ok());
    let committer = parts.next().and_then(|s| s.parse::<Signature>().ok());
    match (old, new, committer) {
        (Some(old), Some(new), Some(committer)) => Ok(ReflogEntry {
            old,
            new,
            committer,
            message: unescape_message(message),
        }),
        _ => Err(corrupt("malformed reflog line")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Expected;

    fn oid(seed: &str) -> ObjectId {
        ObjectId::from_bytes(seed.as_bytes())
    }

    fn entry(seconds: i64, message: &str) -> ReflogEntry {
        ReflogEntry::new(
            ObjectId::null(),
            oid("x"),
            Signature::new("Test", "test@example.com", seconds, 0),
            message,
        )
    }

    fn backend() -> (tempfile::TempDir, FilesBackend) {
        let dir = tempfile::tempdir().unwrap();
        let backend = FilesBackend::create(dir.path()).unwrap();
        (dir, backend)
    }

    fn names(backend: &FilesBackend) -> Vec<String> {
        backend.enumerate().unwrap().map(|r| r.unwrap().name).collect()
    }

    #[test]
    fn create_and_lookup_loose_refs() {
        let (dir, backend) = backend();
        backend
            .write_batch(
                vec![
                    RefUpdate::create("refs/heads/main", RefTarget::Direct(oid("a"))),
                    RefUpdate::create("HEAD", RefTarget::Symbolic("refs/heads/main".into())),
                ],
                WriteMode::Normal,
            )
            .unwrap();

        assert_eq!(
            fs::read_to_string(dir.path().join("HEAD")).unwrap(),
            "ref: refs/heads/main\n"
        );
        let main = backend.lookup("refs/heads/main").unwrap();
        assert_eq!(main.target, RefTarget::Direct(oid("a")));
        assert!(backend.lookup("refs/heads/nope").unwrap_err().is_not_found());
    }

    #[test]
    fn enumerate_is_sorted_and_merges_packed() {
        let (_dir, backend) = backend();
        backend
            .write_batch(
                vec![
                    RefUpdate::create("refs/heads/b", RefTarget::Direct(oid("b"))),
                    RefUpdate::create("refs/tags/v1", RefTarget::Direct(oid("t"))),
                ],
                WriteMode::Initial,
            )
            .unwrap();
        backend
            .write_batch(
                vec![
                    RefUpdate::create("refs/heads/a-b", RefTarget::Direct(oid("ab"))),
                    RefUpdate::create("refs/heads/a/c", RefTarget::Direct(oid("ac"))),
                ],
                WriteMode::Normal,
            )
            .unwrap();

        assert_eq!(
            names(&backend),
            vec!["refs/heads/a-b", "refs/heads/a/c", "refs/heads/b", "refs/tags/v1"]
        );
    }

    #[test]
    fn initial_mode_packs_direct_refs() {
        let (dir, backend) = backend();
        backend
            .write_batch(
                vec![
                    RefUpdate::create("refs/heads/main", RefTarget::Direct(oid("m"))),
                    RefUpdate::create("HEAD", RefTarget::Symbolic("refs/heads/main".into())),
                ],
                WriteMode::Initial,
            )
            .unwrap();
        let packed = fs::read_to_string(dir.path().join(PACKED_REFS)).unwrap();
        assert!(packed.starts_with(PACKED_HEADER));
        assert!(packed.contains("refs/heads/main"));
        assert!(!dir.path().join("refs/heads/main").exists());
        assert!(dir.path().join("HEAD").is_file());
    }

    #[test]
    fn initial_mode_requires_empty_store() {
        let (_dir, backend) = backend();
        backend
            .write_batch(vec![RefUpdate::create("refs/heads/a", RefTarget::Direct(oid("a")))], WriteMode::Normal)
            .unwrap();
        let err = backend
            .write_batch(vec![RefUpdate::create("refs/heads/b", RefTarget::Direct(oid("b")))], WriteMode::Initial)
            .unwrap_err();
        assert!(matches!(err, RefError::Conflict { .. }));
    }

    #[test]
    fn failed_precondition_changes_nothing() {
        let (dir, backend) = backend();
        backend
            .write_batch(vec![RefUpdate::create("refs/heads/a", RefTarget::Direct(oid("a")))], WriteMode::Normal)
            .unwrap();

        let err = backend
            .write_batch(
                vec![
                    RefUpdate::create("refs/heads/new", RefTarget::Direct(oid("n"))),
                    RefUpdate::set("refs/heads/a", RefTarget::Direct(oid("z")))
                        .expecting(Expected::Value(RefTarget::Direct(oid("wrong")))),
                ],
                WriteMode::Normal,
            )
            .unwrap_err();
        assert!(matches!(err, RefError::Conflict { .. }));

        assert_eq!(names(&backend), vec!["refs/heads/a"]);
        assert_eq!(backend.lookup("refs/heads/a").unwrap().target, RefTarget::Direct(oid("a")));
        assert!(!dir.path().join("refs/heads/new.lock").exists());
        assert!(!dir.path().join("refs/heads/a.lock").exists());
    }

    #[test]
    fn delete_removes_packed_and_loose_values_and_logs() {
        let (dir, backend) = backend();
        backend
            .write_batch(
                vec![RefUpdate::create("refs/heads/topic/x", RefTarget::Direct(oid("p")))
                    .with_log(LogAction::Replace(vec![entry(1, "created")]))],
                WriteMode::Initial,
            )
            .unwrap();
        backend
            .write_batch(vec![RefUpdate::set("refs/heads/topic/x", RefTarget::Direct(oid("q")))], WriteMode::Normal)
            .unwrap();
        backend
            .write_batch(vec![RefUpdate::delete("refs/heads/topic/x")], WriteMode::Normal)
            .unwrap();

        assert!(names(&backend).is_empty());
        assert!(!dir.path().join("refs/heads/topic").exists());
        assert!(!dir.path().join("logs/refs/heads/topic").exists());

        // The freed directory name can now hold a ref of its own.
        backend
            .write_batch(vec![RefUpdate::create("refs/heads/topic", RefTarget::Direct(oid("t")))], WriteMode::Normal)
            .unwrap();
        assert_eq!(names(&backend), vec!["refs/heads/topic"]);
    }

    #[test]
    fn logs_append_and_replace() {
        let (_dir, backend) = backend();
        backend
            .write_batch(
                vec![RefUpdate::create("refs/heads/main", RefTarget::Direct(oid("a")))
                    .with_log(LogAction::Append(entry(10, "branch: created")))],
                WriteMode::Normal,
            )
            .unwrap();
        backend
            .write_batch(
                vec![RefUpdate::set("refs/heads/main", RefTarget::Direct(oid("b")))
                    .with_log(LogAction::Append(entry(20, "commit: two\nlines \\ here")))],
                WriteMode::Normal,
            )
            .unwrap();

        let record = backend.lookup("refs/heads/main").unwrap();
        assert_eq!(record.log.len(), 2);
        assert_eq!(record.log[1].message, "commit: two\nlines \\ here");
        assert_eq!(record.log[1].committer.seconds, 20);

        backend
            .write_batch(
                vec![RefUpdate::set("refs/heads/main", RefTarget::Direct(oid("b")))
                    .with_log(LogAction::Replace(Vec::new()))],
                WriteMode::Normal,
            )
            .unwrap();
        assert!(backend.lookup("refs/heads/main").unwrap().log.is_empty());
    }

    #[test]
    fn corrupt_loose_ref_is_reported_and_iteration_continues() {
        let (dir, backend) = backend();
        backend
            .write_batch(
                vec![
                    RefUpdate::create("refs/heads/a", RefTarget::Direct(oid("a"))),
                    RefUpdate::create("refs/heads/c", RefTarget::Direct(oid("c"))),
                ],
                WriteMode::Normal,
            )
            .unwrap();
        fs::write(dir.path().join("refs/heads/b"), "garbage\n").unwrap();

        let results: Vec<_> = backend.enumerate().unwrap().collect();
        assert_eq!(results.len(), 3);
        assert!(results[0].is_ok());
        assert!(matches!(results[1], Err(RefError::Corrupt { .. })));
        assert!(results[2].is_ok());
    }

    #[test]
    fn unborn_round_trips() {
        let (_dir, backend) = backend();
        backend
            .write_batch(vec![RefUpdate::create("HEAD", RefTarget::Unborn)], WriteMode::Normal)
            .unwrap();
        assert_eq!(backend.lookup("HEAD").unwrap().target, RefTarget::Unborn);
    }

    #[test]
    fn held_lock_conflicts() {
        let (dir, backend) = backend();
        fs::create_dir_all(dir.path().join("refs/heads")).unwrap();
        fs::write(dir.path().join("refs/heads/main.lock"), "").unwrap();
        let err = backend
            .write_batch(vec![RefUpdate::create("refs/heads/main", RefTarget::Direct(oid("a")))], WriteMode::Normal)
            .unwrap_err();
        assert!(matches!(err, RefError::Conflict { .. }));
        assert!(names(&backend).is_empty());
    }

    #[test]
    fn open_rejects_missing_refs_dir() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(FilesBackend::open(dir.path()), Err(RefError::UnsupportedFormat { .. })));
        assert!(matches!(
            FilesBackend::open(&dir.path().join("missing")),
            Err(RefError::NotFound { .. })
        ));
    }

    #[test]
    fn message_escaping_round_trips() {
        for message in [
            "plain",
            "two\nlines",
            "back\\slash",
            "trailing\\",
            "\\n literal",
            "ends with cr\r",
            "tab\there",
        ] {
            assert_eq!(unescape_message(&escape_message(message)), message);
        }
    }
}
