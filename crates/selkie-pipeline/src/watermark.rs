//! Promotion watermarks
//!
//! TigerStyle: Monotonic by construction, durable through the journal.
//!
//! For each session the watermark is the highest message id whose promotion
//! is known complete. `advance` refuses regressions, so a retried promotion
//! that observes stale state becomes a no-op. Every advance is journaled as
//! a mark entry and recovered on restart, which keeps the watermark
//! non-decreasing across crashes.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;

use tracing::debug;

use selkie_core::{MemoryId, Result};
use selkie_runtime::{JournalEntry, TaskJournal};

/// Journal mark prefix for watermark entries
const WATERMARK_MARK_PREFIX: &str = "watermark:";

/// Per-session promotion watermarks
pub struct WatermarkStore {
    marks: Mutex<HashMap<String, MemoryId>>,
    journal: Option<Arc<dyn TaskJournal>>,
}

impl WatermarkStore {
    /// Create an empty store with no durability
    pub fn new() -> Self {
        Self {
            marks: Mutex::new(HashMap::new()),
            journal: None,
        }
    }

    /// Attach a journal; advances are recorded and recoverable
    pub fn with_journal(mut self, journal: Arc<dyn TaskJournal>) -> Self {
        self.journal = Some(journal);
        self
    }

    /// Restore watermarks from the journal
    ///
    /// Marks replay in order; regressions in the log are ignored, so the
    /// recovered watermark is the maximum ever recorded.
    pub fn recover(&self) -> Result<usize> {
        let Some(ref journal) = self.journal else {
            return Ok(0);
        };

        let mut recovered = 0;
        for entry in journal.replay()? {
            if let JournalEntry::Mark { key, value } = entry {
                let Some(session_key) = key.strip_prefix(WATERMARK_MARK_PREFIX) else {
                    continue;
                };
                let Ok(id) = value.parse::<MemoryId>() else {
                    continue;
                };
                let mut marks = self.marks.lock().expect("watermark lock poisoned");
                let slot = marks.entry(session_key.to_string()).or_insert(MemoryId::zero());
                if id > *slot {
                    *slot = id;
                    recovered += 1;
                }
            }
        }
        Ok(recovered)
    }

    /// The watermark for a session key; zero when none was ever recorded
    pub fn get(&self, session_key: &str) -> MemoryId {
        self.marks
            .lock()
            .expect("watermark lock poisoned")
            .get(session_key)
            .copied()
            .unwrap_or(MemoryId::zero())
    }

    /// Advance the watermark; returns `false` on a stale (non-forward) id
    pub fn advance(&self, session_key: &str, id: MemoryId) -> Result<bool> {
        let advanced = {
            let mut marks = self.marks.lock().expect("watermark lock poisoned");
            let slot = marks.entry(session_key.to_string()).or_insert(MemoryId::zero());
            if id <= *slot {
                false
            } else {
                *slot = id;
                true
            }
        };

        if advanced {
            debug!(session = session_key, watermark = %id, "Watermark advanced");
            if let Some(ref journal) = self.journal {
                journal.append(&JournalEntry::Mark {
                    key: format!("{}{}", WATERMARK_MARK_PREFIX, session_key),
                    value: id.to_string(),
                })?;
            }
        }
        Ok(advanced)
    }
}

impl Default for WatermarkStore {
    fn default() -> Self {
        Self::new()
    }
}
