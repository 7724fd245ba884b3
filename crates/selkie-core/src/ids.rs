//! Record identifiers
//!
//! TigerStyle: Lexicographically sortable, monotonic identifiers.
//!
//! Memory records and messages use ULID-shaped ids: 26 Crockford base32
//! characters encoding a millisecond timestamp plus randomness. String order
//! equals creation order, which the promotion watermark relies on: "messages
//! above the watermark" is a plain range scan over ids.

use std::fmt;
use std::str::FromStr;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::error::Error;

/// Identifier for a memory record or message
///
/// Ordered, hashable, and serialized as the canonical 26-character string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MemoryId(Ulid);

impl MemoryId {
    /// Wrap an existing ULID
    pub const fn from_ulid(ulid: Ulid) -> Self {
        Self(ulid)
    }

    /// The zero id, ordered before every generated id
    ///
    /// Used as the initial promotion watermark.
    pub fn zero() -> Self {
        Self(Ulid::nil())
    }

    /// Millisecond timestamp encoded in the id
    pub fn timestamp_ms(&self) -> u64 {
        self.0.timestamp_ms()
    }
}

impl fmt::Display for MemoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for MemoryId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ulid::from_str(s)
            .map(Self)
            .map_err(|e| Error::input_invalid("id", format!("not a valid ULID: {}", e)))
    }
}

/// Monotonic id generator
///
/// Ids generated within the same millisecond increment the random component,
/// so the sequence is strictly increasing even under bursts. Shared across
/// tasks behind a mutex held only for the generation itself.
pub struct MemoryIdGenerator {
    inner: Mutex<ulid::Generator>,
}

impl std::fmt::Debug for MemoryIdGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryIdGenerator").finish()
    }
}

impl Default for MemoryIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryIdGenerator {
    /// Create a new generator
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(ulid::Generator::new()),
        }
    }

    /// Generate the next id
    ///
    /// Falls back to a fresh ULID in the (astronomically unlikely) case the
    /// same-millisecond random component overflows.
    pub fn next(&self) -> MemoryId {
        let mut guard = self.inner.lock().expect("id generator lock poisoned");
        match guard.generate() {
            Ok(ulid) => MemoryId(ulid),
            Err(_) => MemoryId(Ulid::new()),
        }
    }
}
