//! Per-codebase file hash snapshots and change detection.
//!
//! A snapshot maps forward-slash relative paths to sha256 digests of the
//! file bytes. Saves are atomic: serialise to a temp file in the same
//! directory, fsync, rename over the target. One in-process mutex per
//! canonical root serialises writers.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock};
use tracing::warn;

use crate::core::collection;
use crate::core::error::{Error, Result};
use crate::core::walker::FileWalker;

pub const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct SnapshotFile {
    version: u32,
    root: String,
    /// BTreeMap keeps the serialised form sorted by path.
    files: BTreeMap<String, String>,
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct ChangeSet {
    pub added: Vec<String>,
    pub modified: Vec<String>,
    pub removed: Vec<String>,
    /// Fresh path->digest map; persist it only after downstream work
    /// succeeded.
    pub new_snapshot: HashMap<String, String>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.modified.is_empty() && self.removed.is_empty()
    }

    pub fn total(&self) -> usize {
        self.added.len() + self.modified.len() + self.removed.len()
    }
}

fn root_locks() -> &'static Mutex<HashMap<String, Arc<Mutex<()>>>> {
    static LOCKS: OnceLock<Mutex<HashMap<String, Arc<Mutex<()>>>>> = OnceLock::new();
    LOCKS.get_or_init(|| Mutex::new(HashMap::new()))
}

fn lock_for_root(canonical: &Path) -> Arc<Mutex<()>> {
    let key = canonical.to_string_lossy().to_string();
    let mut locks = root_locks().lock().unwrap_or_else(|e| e.into_inner());
    locks.entry(key).or_default().clone()
}

pub struct SnapshotStore {
    dir: PathBuf,
}

impl SnapshotStore {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    fn snapshot_path(&self, canonical: &Path) -> PathBuf {
        self.dir
            .join(format!("snapshot_{}.json", collection::root_hash(canonical)))
    }

    /// Load the snapshot for `canonical`; empty map on first use.
    pub fn load(&self, canonical: &Path) -> Result<HashMap<String, String>> {
        let path = self.snapshot_path(canonical);
        if !path.exists() {
            return Ok(HashMap::new());
        }
        let content = fs::read_to_string(&path)?;
        let snapshot: SnapshotFile = serde_json::from_str(&content)
            .map_err(|e| Error::Snapshot(format!("corrupt snapshot {}: {}", path.display(), e)))?;
        Ok(snapshot.files.into_iter().collect())
    }

    /// Atomically replace the snapshot for `canonical`.
    pub fn save(&self, canonical: &Path, files: &HashMap<String, String>) -> Result<()> {
        let lock = lock_for_root(canonical);
        let _guard = lock.lock().unwrap_or_else(|e| e.into_inner());

        fs::create_dir_all(&self.dir)?;
        let path = self.snapshot_path(canonical);
        let tmp = path.with_extension("json.tmp");

        let snapshot = SnapshotFile {
            version: SNAPSHOT_VERSION,
            root: canonical.to_string_lossy().to_string(),
            files: files.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
        };
        let payload = serde_json::to_vec_pretty(&snapshot)?;

        {
            let mut file = File::create(&tmp)?;
            file.write_all(&payload)?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    /// Remove the snapshot file; missing is not an error.
    pub fn delete(&self, canonical: &Path) -> Result<()> {
        let lock = lock_for_root(canonical);
        let _guard = lock.lock().unwrap_or_else(|e| e.into_inner());

        let path = self.snapshot_path(canonical);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    pub fn exists(&self, canonical: &Path) -> bool {
        self.snapshot_path(canonical).exists()
    }
}

pub fn hash_file_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

pub struct ChangeDetector;

impl ChangeDetector {
    /// Diff the current file set under `canonical` against `prior`.
    /// Output lists are sorted lexicographically by relative path.
    pub fn diff(
        canonical: &Path,
        allowed_extensions: Option<&[String]>,
        ignore_patterns: Option<&[String]>,
        prior: &HashMap<String, String>,
    ) -> Result<ChangeSet> {
        let walker = FileWalker::new(canonical, allowed_extensions, ignore_patterns)?;
        let files = walker.walk();

        let hashed: Vec<(String, String)> = files
            .par_iter()
            .filter_map(|file| match fs::read(&file.absolute) {
                Ok(bytes) => Some((file.relative.clone(), hash_file_bytes(&bytes))),
                Err(e) => {
                    warn!(path = %file.relative, error = %e, "skipping unreadable file in diff");
                    None
                }
            })
            .collect();

        let new_snapshot: HashMap<String, String> = hashed.into_iter().collect();

        let mut added = Vec::new();
        let mut modified = Vec::new();
        for (path, digest) in &new_snapshot {
            match prior.get(path) {
                None => added.push(path.clone()),
                Some(old) if old != digest => modified.push(path.clone()),
                Some(_) => {}
            }
        }
        let mut removed: Vec<String> = prior
            .keys()
            .filter(|path| !new_snapshot.contains_key(*path))
            .cloned()
            .collect();

        added.sort();
        modified.sort();
        removed.sort();

        Ok(ChangeSet {
            added,
            modified,
            removed,
            new_snapshot,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, content).unwrap();
    }

    #[test]
    fn first_diff_reports_everything_added() {
        let codebase = TempDir::new().unwrap();
        write(codebase.path(), "a.rs", "fn a() {}");
        write(codebase.path(), "b.py", "def b(): pass");
        let canonical = codebase.path().canonicalize().unwrap();

        let changes = ChangeDetector::diff(&canonical, None, None, &HashMap::new()).unwrap();
        assert_eq!(changes.added, vec!["a.rs", "b.py"]);
        assert!(changes.modified.is_empty());
        assert!(changes.removed.is_empty());
        assert_eq!(changes.new_snapshot.len(), 2);
    }

    #[test]
    fn rerun_on_saved_snapshot_is_clean() {
        let codebase = TempDir::new().unwrap();
        write(codebase.path(), "a.rs", "fn a() {}");
        let canonical = codebase.path().canonicalize().unwrap();

        let first = ChangeDetector::diff(&canonical, None, None, &HashMap::new()).unwrap();
        let second = ChangeDetector::diff(&canonical, None, None, &first.new_snapshot).unwrap();
        assert!(second.is_empty());
    }

    #[test]
    fn modify_and_remove_are_detected() {
        let codebase = TempDir::new().unwrap();
        write(codebase.path(), "a.rs", "fn a() {}");
        write(codebase.path(), "b.rs", "fn b() {}");
        let canonical = codebase.path().canonicalize().unwrap();

        let first = ChangeDetector::diff(&canonical, None, None, &HashMap::new()).unwrap();

        write(codebase.path(), "a.rs", "fn a() { /* changed */ }");
        fs::remove_file(codebase.path().join("b.rs")).unwrap();
        write(codebase.path(), "c.rs", "fn c() {}");

        let second = ChangeDetector::diff(&canonical, None, None, &first.new_snapshot).unwrap();
        assert_eq!(second.added, vec!["c.rs"]);
        assert_eq!(second.modified, vec!["a.rs"]);
        assert_eq!(second.removed, vec!["b.rs"]);
    }

    #[test]
    fn snapshot_store_round_trip() {
        let store_dir = TempDir::new().unwrap();
        let codebase = TempDir::new().unwrap();
        let canonical = codebase.path().canonicalize().unwrap();
        let store = SnapshotStore::new(store_dir.path().to_path_buf());

        assert!(store.load(&canonical).unwrap().is_empty());
        assert!(!store.exists(&canonical));

        let mut files = HashMap::new();
        files.insert("src/lib.rs".to_string(), "abc123".to_string());
        store.save(&canonical, &files).unwrap();

        assert!(store.exists(&canonical));
        assert_eq!(store.load(&canonical).unwrap(), files);

        store.delete(&canonical).unwrap();
        assert!(!store.exists(&canonical));
        // Deleting a missing snapshot is fine.
        store.delete(&canonical).unwrap();
    }

    #[test]
    fn snapshot_file_layout_is_versioned_json() {
        let store_dir = TempDir::new().unwrap();
        let codebase = TempDir::new().unwrap();
        let canonical = codebase.path().canonicalize().unwrap();
        let store = SnapshotStore::new(store_dir.path().to_path_buf());

        let mut files = HashMap::new();
        files.insert("a.rs".to_string(), "deadbeef".to_string());
        store.save(&canonical, &files).unwrap();

        let entries: Vec<_> = fs::read_dir(store_dir.path())
            .unwrap()
            .map(|e| e.unwrap().path())
            .collect();
        assert_eq!(entries.len(), 1, "no temp file may survive a save");

        let raw: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&entries[0]).unwrap()).unwrap();
        assert_eq!(raw["version"], 1);
        assert_eq!(raw["files"]["a.rs"], "deadbeef");
        assert!(raw["root"].as_str().unwrap().contains(
            canonical.file_name().unwrap().to_str().unwrap()
        ));
    }

    #[test]
    fn save_overwrites_previous_snapshot() {
        let store_dir = TempDir::new().unwrap();
        let codebase = TempDir::new().unwrap();
        let canonical = codebase.path().canonicalize().unwrap();
        let store = SnapshotStore::new(store_dir.path().to_path_buf());

        let mut v1 = HashMap::new();
        v1.insert("a.rs".to_string(), "one".to_string());
        store.save(&canonical, &v1).unwrap();

        let mut v2 = HashMap::new();
        v2.insert("a.rs".to_string(), "two".to_string());
        store.save(&canonical, &v2).unwrap();

        assert_eq!(store.load(&canonical).unwrap()["a.rs"], "two");
    }
}
