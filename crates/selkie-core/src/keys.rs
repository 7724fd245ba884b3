//! Key and index layout
//!
//! TigerStyle: Deterministic key construction, collisions impossible.
//!
//! One scheme maps logical identity to storage keys so prefix scans stay
//! cheap:
//!
//! - working memory: `wm:{namespace}:{user_id}:{session_id}` (missing
//!   segments render as empty strings)
//! - long-term record: `ltm:{id}`
//! - secondary index fields: `topic:{t}`, `entity:{e}`, `user:{u}`,
//!   `namespace:{n}`, `session:{s}`, `type:{memory_type}`
//!
//! Segment bytes outside `[A-Za-z0-9._-]` are percent-escaped, which makes
//! key construction injective: distinct identities never collide.

use serde::{Deserialize, Serialize};

use crate::constants::KEY_SEGMENT_LENGTH_BYTES_MAX;
use crate::error::{Error, Result};
use crate::ids::MemoryId;

/// Prefix for working memory keys
pub const WORKING_MEMORY_KEY_PREFIX: &str = "wm";

/// Prefix for long-term record keys
pub const LONG_TERM_KEY_PREFIX: &str = "ltm";

/// Logical identity of one working memory entry
///
/// Keyed by `(namespace, user_id, session_id)`; namespace and user id are
/// optional and render as empty segments.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionKey {
    pub namespace: Option<String>,
    pub user_id: Option<String>,
    pub session_id: String,
}

impl SessionKey {
    /// Create a session key, validating segment lengths
    pub fn new(
        namespace: Option<String>,
        user_id: Option<String>,
        session_id: impl Into<String>,
    ) -> Result<Self> {
        let session_id = session_id.into();
        if session_id.is_empty() {
            return Err(Error::input_invalid("session_id", "must not be empty"));
        }
        for (field, value) in [
            ("namespace", namespace.as_deref()),
            ("user_id", user_id.as_deref()),
            ("session_id", Some(session_id.as_str())),
        ] {
            if let Some(value) = value {
                if value.len() > KEY_SEGMENT_LENGTH_BYTES_MAX {
                    return Err(Error::input_invalid(
                        field,
                        format!(
                            "{} bytes exceeds limit of {} bytes",
                            value.len(),
                            KEY_SEGMENT_LENGTH_BYTES_MAX
                        ),
                    ));
                }
            }
        }
        Ok(Self {
            namespace,
            user_id,
            session_id,
        })
    }

    /// Render the storage key for this session
    pub fn storage_key(&self) -> String {
        working_memory_key(
            self.namespace.as_deref(),
            self.user_id.as_deref(),
            &self.session_id,
        )
    }
}

impl std::fmt::Display for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.storage_key())
    }
}

/// Build a working memory key from its identity segments
pub fn working_memory_key(
    namespace: Option<&str>,
    user_id: Option<&str>,
    session_id: &str,
) -> String {
    format!(
        "{}:{}:{}:{}",
        WORKING_MEMORY_KEY_PREFIX,
        escape_segment(namespace.unwrap_or("")),
        escape_segment(user_id.unwrap_or("")),
        escape_segment(session_id),
    )
}

/// Build the primary key for a long-term record
pub fn long_term_key(id: MemoryId) -> String {
    format!("{}:{}", LONG_TERM_KEY_PREFIX, id)
}

fn is_safe_byte(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || matches!(byte, b'.' | b'_' | b'-')
}

/// Percent-escape a key segment
///
/// Every byte outside `[A-Za-z0-9._-]` becomes `%XX`. Escaping is total and
/// injective; `%` itself is always escaped, so no escaped segment can be
/// mistaken for another.
pub fn escape_segment(segment: &str) -> String {
    let mut out = String::with_capacity(segment.len());
    for byte in segment.bytes() {
        if is_safe_byte(byte) {
            out.push(byte as char);
        } else {
            out.push('%');
            out.push_str(&format!("{:02X}", byte));
        }
    }
    out
}

/// Invert [`escape_segment`]
pub fn unescape_segment(segment: &str) -> Result<String> {
    let bytes = segment.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = segment
                .get(i + 1..i + 3)
                .ok_or_else(|| Error::input_invalid("key", "truncated percent escape"))?;
            let byte = u8::from_str_radix(hex, 16)
                .map_err(|_| Error::input_invalid("key", format!("bad escape: %{}", hex)))?;
            out.push(byte);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out).map_err(|_| Error::input_invalid("key", "escape decodes to non-UTF-8"))
}
