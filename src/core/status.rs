//! Per-codebase lifecycle registry.
//!
//! In-memory state is the source of truth for every status read in the
//! running process; disk only hydrates at startup and durably records
//! transitions. Writers update memory first and persist asynchronously,
//! so a `status()` call issued right after `set_indexed` returns the new
//! state no matter how far the disk write has got.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use tracing::warn;

use crate::core::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexedStatus {
    Completed,
    LimitReached,
}

impl IndexedStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            IndexedStatus::Completed => "completed",
            IndexedStatus::LimitReached => "limit_reached",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum CodebaseEntry {
    Indexing {
        progress: f32,
    },
    Indexed {
        indexed_files: u64,
        total_chunks: u64,
        status: IndexedStatus,
    },
    IndexFailed {
        error_message: String,
        last_attempted_percentage: f32,
    },
}

impl CodebaseEntry {
    pub fn is_indexing(&self) -> bool {
        matches!(self, CodebaseEntry::Indexing { .. })
    }

    pub fn is_indexed(&self) -> bool {
        matches!(self, CodebaseEntry::Indexed { .. })
    }
}

#[derive(Clone)]
pub struct StatusRegistry {
    entries: Arc<RwLock<HashMap<String, CodebaseEntry>>>,
    path: PathBuf,
}

impl StatusRegistry {
    /// Open the registry, hydrating from `path` when it exists. A corrupt
    /// or missing file starts empty; the registry never fails to open.
    pub fn open(path: PathBuf) -> Self {
        let entries = match fs::read_to_string(&path) {
            Ok(content) => match serde_json::from_str::<HashMap<String, CodebaseEntry>>(&content) {
                Ok(map) => map,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "corrupt status registry, starting empty");
                    HashMap::new()
                }
            },
            Err(_) => HashMap::new(),
        };

        Self {
            entries: Arc::new(RwLock::new(entries)),
            path,
        }
    }

    /// Pure in-memory read; never touches disk or network.
    pub fn get(&self, root: &str) -> Option<CodebaseEntry> {
        self.entries
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(root)
            .cloned()
    }

    pub fn list(&self) -> Vec<(String, CodebaseEntry)> {
        let mut entries: Vec<(String, CodebaseEntry)> = self
            .entries
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        entries.sort_by(|(a, _), (b, _)| a.cmp(b));
        entries
    }

    pub fn indexed_count(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .filter(|entry| entry.is_indexed())
            .count()
    }

    pub fn set_indexing(&self, root: &str, progress: f32) {
        self.set(
            root,
            CodebaseEntry::Indexing {
                progress: progress.clamp(0.0, 100.0),
            },
        );
    }

    pub fn set_indexed(
        &self,
        root: &str,
        indexed_files: u64,
        total_chunks: u64,
        status: IndexedStatus,
    ) {
        self.set(
            root,
            CodebaseEntry::Indexed {
                indexed_files,
                total_chunks,
                status,
            },
        );
    }

    pub fn set_failed(&self, root: &str, error_message: String, last_attempted_percentage: f32) {
        self.set(
            root,
            CodebaseEntry::IndexFailed {
                error_message,
                last_attempted_percentage: last_attempted_percentage.clamp(0.0, 100.0),
            },
        );
    }

    pub fn remove(&self, root: &str) {
        {
            let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
            entries.remove(root);
        }
        self.persist_async();
    }

    fn set(&self, root: &str, entry: CodebaseEntry) {
        // Memory first: any status read after this line sees the new state,
        // independent of the disk write below.
        {
            let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
            entries.insert(root.to_string(), entry);
        }
        self.persist_async();
    }

    /// Fire-and-forget durable write. Memory stays authoritative even if
    /// the write fails; failures only log.
    fn persist_async(&self) {
        let snapshot: HashMap<String, CodebaseEntry> = self
            .entries
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone();
        let path = self.path.clone();

        let write = move || {
            if let Err(e) = persist_to_disk(&path, &snapshot) {
                warn!(path = %path.display(), error = %e, "failed to persist status registry");
            }
        };

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn_blocking(write);
            }
            // No runtime (sync tests, teardown paths): write inline.
            Err(_) => write(),
        }
    }
}

fn persist_to_disk(path: &PathBuf, entries: &HashMap<String, CodebaseEntry>) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("json.tmp");
    let payload = serde_json::to_vec_pretty(entries)?;
    {
        let mut file = File::create(&tmp)?;
        file.write_all(&payload)?;
        file.sync_all()?;
    }
    fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn registry(dir: &TempDir) -> StatusRegistry {
        StatusRegistry::open(dir.path().join("registry.json"))
    }

    #[test]
    fn starts_empty_and_tracks_transitions() {
        let dir = TempDir::new().unwrap();
        let reg = registry(&dir);

        assert!(reg.get("/repo").is_none());

        reg.set_indexing("/repo", 0.0);
        assert!(reg.get("/repo").unwrap().is_indexing());

        reg.set_indexing("/repo", 42.0);
        assert_eq!(
            reg.get("/repo").unwrap(),
            CodebaseEntry::Indexing { progress: 42.0 }
        );

        reg.set_indexed("/repo", 10, 55, IndexedStatus::Completed);
        assert_eq!(
            reg.get("/repo").unwrap(),
            CodebaseEntry::Indexed {
                indexed_files: 10,
                total_chunks: 55,
                status: IndexedStatus::Completed,
            }
        );

        reg.remove("/repo");
        assert!(reg.get("/repo").is_none());
    }

    #[test]
    fn set_indexed_is_immediately_visible_across_threads() {
        let dir = TempDir::new().unwrap();
        let reg = registry(&dir);
        reg.set_indexing("/repo", 99.0);

        reg.set_indexed("/repo", 3, 7, IndexedStatus::Completed);

        let reader = reg.clone();
        let handle = std::thread::spawn(move || reader.get("/repo"));
        let observed = handle.join().unwrap().unwrap();
        assert!(observed.is_indexed());
    }

    #[test]
    fn progress_is_clamped() {
        let dir = TempDir::new().unwrap();
        let reg = registry(&dir);
        reg.set_indexing("/repo", 150.0);
        assert_eq!(
            reg.get("/repo").unwrap(),
            CodebaseEntry::Indexing { progress: 100.0 }
        );
    }

    #[test]
    fn failed_state_records_message_and_percentage() {
        let dir = TempDir::new().unwrap();
        let reg = registry(&dir);
        reg.set_failed("/repo", "boom".to_string(), 37.5);
        assert_eq!(
            reg.get("/repo").unwrap(),
            CodebaseEntry::IndexFailed {
                error_message: "boom".to_string(),
                last_attempted_percentage: 37.5,
            }
        );
    }

    #[test]
    fn hydrates_from_previous_run() {
        let dir = TempDir::new().unwrap();
        {
            let reg = registry(&dir);
            reg.set_indexed("/repo", 2, 9, IndexedStatus::LimitReached);
            // Outside a tokio runtime the write is synchronous, so the file
            // is durable once set_indexed returns.
        }
        let reg = registry(&dir);
        assert_eq!(
            reg.get("/repo").unwrap(),
            CodebaseEntry::Indexed {
                indexed_files: 2,
                total_chunks: 9,
                status: IndexedStatus::LimitReached,
            }
        );
    }

    #[test]
    fn memory_is_authoritative_when_disk_is_unwritable() {
        let dir = TempDir::new().unwrap();
        // Point the registry file into a path blocked by a regular file.
        let blocked = dir.path().join("blocked");
        fs::write(&blocked, "not a directory").unwrap();
        let reg = StatusRegistry::open(blocked.join("registry.json"));

        reg.set_indexed("/repo", 1, 1, IndexedStatus::Completed);
        assert!(reg.get("/repo").unwrap().is_indexed());
    }

    #[test]
    fn indexed_count_ignores_other_states() {
        let dir = TempDir::new().unwrap();
        let reg = registry(&dir);
        reg.set_indexed("/a", 1, 1, IndexedStatus::Completed);
        reg.set_indexing("/b", 10.0);
        reg.set_failed("/c", "x".to_string(), 0.0);
        assert_eq!(reg.indexed_count(), 1);
    }
}
