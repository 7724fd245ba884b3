//! Content hashing for exact dedup
//!
//! TigerStyle: Pure function of content and identity, stable across runs.
//!
//! The hash covers normalized text plus the identity fields that scope a
//! memory. Two records with equal hash are candidates for exact dedup; the
//! long-term store short-circuits the second create.

use chrono::{SecondsFormat, TimeZone, Utc};
use sha2::{Digest, Sha256};

use selkie_core::{MemoryRecord, MemoryType};

/// Field separator inside the hash preimage
const HASH_SEPARATOR: u8 = 0x1F;

/// Compute the content+identity hash
///
/// `sha256( lowercase(trim(text)) 1F user_id 1F namespace 1F session_id 1F
/// memory_type 1F event_date_iso_or_empty )`, rendered as lowercase hex.
pub fn memory_hash(
    text: &str,
    user_id: Option<&str>,
    namespace: Option<&str>,
    session_id: Option<&str>,
    memory_type: MemoryType,
    event_date_ms: Option<u64>,
) -> String {
    let mut hasher = Sha256::new();

    hasher.update(text.trim().to_lowercase().as_bytes());
    hasher.update([HASH_SEPARATOR]);
    hasher.update(user_id.unwrap_or("").as_bytes());
    hasher.update([HASH_SEPARATOR]);
    hasher.update(namespace.unwrap_or("").as_bytes());
    hasher.update([HASH_SEPARATOR]);
    hasher.update(session_id.unwrap_or("").as_bytes());
    hasher.update([HASH_SEPARATOR]);
    hasher.update(memory_type.to_string().as_bytes());
    hasher.update([HASH_SEPARATOR]);
    hasher.update(event_date_iso(event_date_ms).as_bytes());

    format!("{:x}", hasher.finalize())
}

/// Compute the hash for a record's current fields
pub fn record_hash(record: &MemoryRecord) -> String {
    memory_hash(
        &record.text,
        record.user_id.as_deref(),
        record.namespace.as_deref(),
        record.session_id.as_deref(),
        record.memory_type,
        record.event_date,
    )
}

fn event_date_iso(event_date_ms: Option<u64>) -> String {
    match event_date_ms {
        Some(ms) => match Utc.timestamp_millis_opt(ms as i64).single() {
            Some(dt) => dt.to_rfc3339_opts(SecondsFormat::Millis, true),
            None => String::new(),
        },
        None => String::new(),
    }
}
