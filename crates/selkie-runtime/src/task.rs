//! Task specifications and fingerprints
//!
//! TigerStyle: Stable names, canonical hashing, no hidden state.
//!
//! A fingerprint is a sha256 over the task name and the canonical JSON
//! rendering of its arguments. Two enqueues of the same logical work carry
//! the same fingerprint, which is what the queue's
//! at-most-one-in-flight-per-fingerprint guarantee keys on.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use selkie_core::Result;

/// A named unit of background work
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSpec {
    /// Stable task name, e.g. `promote_session`
    pub name: String,
    /// JSON arguments; schemas are versioned by the handlers
    pub args: Value,
    /// Stable hash over name and args
    pub fingerprint: String,
    /// Do not run before this delay has elapsed, in milliseconds
    #[serde(default)]
    pub delay_ms: u64,
}

impl TaskSpec {
    /// Create a task with the default fingerprint over name and args
    pub fn new(name: impl Into<String>, args: Value) -> Self {
        let name = name.into();
        assert!(!name.is_empty(), "task name must not be empty");

        let fingerprint = fingerprint_for(&name, &args);
        Self {
            name,
            args,
            fingerprint,
            delay_ms: 0,
        }
    }

    /// Create a task with an explicit fingerprint
    ///
    /// Periodic tasks use their name as fingerprint so a slow run never
    /// stacks behind itself; summarization fingerprints carry the epoch so
    /// concurrent triggers coalesce.
    pub fn with_fingerprint(
        name: impl Into<String>,
        args: Value,
        fingerprint: impl Into<String>,
    ) -> Self {
        let name = name.into();
        let fingerprint = fingerprint.into();
        assert!(!name.is_empty(), "task name must not be empty");
        assert!(!fingerprint.is_empty(), "fingerprint must not be empty");

        Self {
            name,
            args,
            fingerprint,
            delay_ms: 0,
        }
    }

    /// Delay execution by the given number of milliseconds
    pub fn with_delay_ms(mut self, delay_ms: u64) -> Self {
        self.delay_ms = delay_ms;
        self
    }
}

/// Compute the canonical fingerprint for a task
///
/// `serde_json` renders map keys in sorted order, so the rendering is
/// canonical for any argument shape built from maps, arrays, and scalars.
pub fn fingerprint_for(name: &str, args: &Value) -> String {
    let mut hasher = Sha256::new();
    hasher.update(name.as_bytes());
    hasher.update([0x1F]);
    hasher.update(args.to_string().as_bytes());
    let digest = hasher.finalize();
    format!("{:x}", digest)
}

/// Anything that accepts background work
///
/// Working memory and the query service hold a `TaskSink` so they can
/// schedule summarization and touch work without depending on the queue's
/// concrete type.
pub trait TaskSink: Send + Sync {
    /// Enqueue a task; returns `false` when it coalesced with existing work
    fn enqueue(&self, spec: TaskSpec) -> Result<bool>;
}

/// Sink that drops all tasks, for tests and disabled pipelines
#[derive(Debug, Clone, Copy, Default)]
pub struct NullTaskSink;

impl TaskSink for NullTaskSink {
    fn enqueue(&self, _spec: TaskSpec) -> Result<bool> {
        Ok(false)
    }
}
