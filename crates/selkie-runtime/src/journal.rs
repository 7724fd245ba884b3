//! Task journal
//!
//! TigerStyle: Append-only, newline-delimited JSON, replay on recovery.
//!
//! The journal records every enqueue and completion, plus arbitrary named
//! marks (the pipeline stores promotion watermarks this way). After a crash,
//! [`replay`](TaskJournal::replay) returns the entries in order; the queue
//! re-enqueues whatever was enqueued but never completed. Stage idempotence
//! makes the resulting at-least-once execution safe.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use selkie_core::{Error, Result};

use crate::task::TaskSpec;

/// One journal record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JournalEntry {
    /// A task was admitted to the queue
    Enqueued { spec: TaskSpec },
    /// A task finished successfully
    Completed { fingerprint: String },
    /// A task failed terminally and was dropped
    Abandoned { fingerprint: String, error: String },
    /// Named progress mark, e.g. a session promotion watermark
    Mark { key: String, value: String },
}

/// Durable journal of queue activity
pub trait TaskJournal: Send + Sync {
    /// Append one entry
    fn append(&self, entry: &JournalEntry) -> Result<()>;

    /// Read every entry in append order
    fn replay(&self) -> Result<Vec<JournalEntry>>;
}

/// File-backed journal writing newline-delimited JSON entries
pub struct FileTaskJournal {
    path: PathBuf,
    file: Mutex<std::fs::File>,
}

impl FileTaskJournal {
    /// Open (or create) a journal file at the provided path
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| Error::store_unavailable(format!("journal mkdir: {}", e)))?;
        }

        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .read(true)
            .open(&path)
            .map_err(|e| Error::store_unavailable(format!("journal open: {}", e)))?;

        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    /// Path of the journal file
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TaskJournal for FileTaskJournal {
    fn append(&self, entry: &JournalEntry) -> Result<()> {
        let mut line = serde_json::to_vec(entry)?;
        line.push(b'\n');

        let mut guard = self.file.lock().expect("journal lock poisoned");
        guard
            .write_all(&line)
            .and_then(|_| guard.flush())
            .map_err(|e| Error::store_unavailable(format!("journal append: {}", e)))
    }

    fn replay(&self) -> Result<Vec<JournalEntry>> {
        let data = std::fs::read(&self.path)
            .map_err(|e| Error::store_unavailable(format!("journal read: {}", e)))?;

        let mut entries = Vec::new();
        for chunk in data.split(|byte| *byte == b'\n').filter(|c| !c.is_empty()) {
            let entry: JournalEntry = serde_json::from_slice(chunk)?;
            entries.push(entry);
        }
        Ok(entries)
    }
}

/// In-memory journal for tests
#[derive(Debug, Default)]
pub struct MemoryTaskJournal {
    entries: Mutex<Vec<JournalEntry>>,
}

impl MemoryTaskJournal {
    /// Create an empty journal
    pub fn new() -> Self {
        Self::default()
    }
}

impl TaskJournal for MemoryTaskJournal {
    fn append(&self, entry: &JournalEntry) -> Result<()> {
        self.entries
            .lock()
            .expect("journal lock poisoned")
            .push(entry.clone());
        Ok(())
    }

    fn replay(&self) -> Result<Vec<JournalEntry>> {
        Ok(self.entries.lock().expect("journal lock poisoned").clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_file_journal_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let journal = FileTaskJournal::open(dir.path().join("tasks.log")).unwrap();

        let spec = TaskSpec::new("promote_session", json!({"session": "s1"}));
        journal
            .append(&JournalEntry::Enqueued { spec: spec.clone() })
            .unwrap();
        journal
            .append(&JournalEntry::Completed {
                fingerprint: spec.fingerprint.clone(),
            })
            .unwrap();

        let entries = journal.replay().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0], JournalEntry::Enqueued { spec: spec.clone() });
        assert_eq!(
            entries[1],
            JournalEntry::Completed {
                fingerprint: spec.fingerprint
            }
        );
    }

    #[test]
    fn test_file_journal_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tasks.log");

        {
            let journal = FileTaskJournal::open(&path).unwrap();
            journal
                .append(&JournalEntry::Mark {
                    key: "watermark:s1".into(),
                    value: "01ARZ3NDEKTSV4RRFFQ69G5FAV".into(),
                })
                .unwrap();
        }

        let journal = FileTaskJournal::open(&path).unwrap();
        let entries = journal.replay().unwrap();
        assert_eq!(entries.len(), 1);
        assert!(matches!(entries[0], JournalEntry::Mark { .. }));
    }

    #[test]
    fn test_memory_journal() {
        let journal = MemoryTaskJournal::new();
        journal
            .append(&JournalEntry::Completed {
                fingerprint: "f1".into(),
            })
            .unwrap();
        assert_eq!(journal.replay().unwrap().len(), 1);
    }
}
