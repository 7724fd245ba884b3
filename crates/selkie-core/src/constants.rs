//! TigerStyle constants for Selkie
//!
//! All limits are explicit, use big-endian naming (most significant first),
//! and include units in the name.

// =============================================================================
// Memory Record Limits
// =============================================================================

/// Maximum length of a memory record's text in bytes (64 KB)
pub const MEMORY_TEXT_LENGTH_BYTES_MAX: usize = 64 * 1024;

/// Maximum number of topics attached to a single record
pub const MEMORY_TOPICS_COUNT_MAX: usize = 32;

/// Maximum number of entities attached to a single record
pub const MEMORY_ENTITIES_COUNT_MAX: usize = 64;

/// Maximum depth of a supersession chain walked during cycle checks
pub const SUPERSEDE_CHAIN_DEPTH_MAX: usize = 64;

// =============================================================================
// Key Layout Limits
// =============================================================================

/// Maximum length of a key segment (namespace, user id, session id) in bytes
pub const KEY_SEGMENT_LENGTH_BYTES_MAX: usize = 256;

/// Name of the long-term vector index
pub const VECTOR_INDEX_NAME: &str = "memory_records";

// =============================================================================
// Working Memory Limits
// =============================================================================

/// Default working memory TTL in seconds (1 hour)
pub const WORKING_MEMORY_TTL_SECS_DEFAULT: u64 = 3600;

/// Maximum number of messages held in a single working memory entry
pub const WORKING_MEMORY_MESSAGES_COUNT_MAX: usize = 10_000;

/// Default context window budget in tokens, used when the client model is unknown
pub const CONTEXT_WINDOW_TOKENS_DEFAULT: u32 = 128_000;

/// Default fraction of the context window that triggers summarization
pub const SUMMARIZATION_THRESHOLD_DEFAULT: f64 = 0.7;

// =============================================================================
// Search Limits
// =============================================================================

/// Maximum number of vector candidates fetched for one search (limit + offset cap)
pub const SEARCH_CANDIDATES_COUNT_MAX: usize = 200;

/// Default search page size
pub const SEARCH_LIMIT_DEFAULT: usize = 10;

/// Top-k neighbours consulted during semantic dedup
pub const DEDUP_NEIGHBORS_COUNT: usize = 5;

/// Default cosine distance at or below which two records are dedup candidates
pub const DEDUP_DISTANCE_THRESHOLD_DEFAULT: f64 = 0.1;

// =============================================================================
// Pipeline Limits
// =============================================================================

/// Maximum candidates processed by one extraction pass
pub const EXTRACTION_BATCH_COUNT_MAX: usize = 100;

/// Maximum texts submitted in one embedding provider call
pub const EMBED_BATCH_COUNT_MAX: usize = 32;

/// Maximum records scanned by one compaction run
pub const COMPACTION_WINDOW_RECORDS_MAX: usize = 1000;

/// Maximum wall-clock budget for one compaction run in milliseconds (30 sec)
pub const COMPACTION_RUN_MS_MAX: u64 = 30 * 1000;

/// Maximum records deleted by one forgetting batch
pub const FORGETTING_BATCH_COUNT_MAX: usize = 100;

/// Maximum length of a custom extraction prompt in bytes (8 KB)
pub const CUSTOM_PROMPT_LENGTH_BYTES_MAX: usize = 8 * 1024;

// =============================================================================
// Task Runtime Limits
// =============================================================================

/// Maximum depth of the background task queue
pub const TASK_QUEUE_DEPTH_MAX: usize = 10_000;

/// Default per-task wall-clock ceiling in milliseconds (60 sec)
pub const TASK_TIMEOUT_MS_DEFAULT: u64 = 60 * 1000;

/// Default maximum attempts per task before terminal failure
pub const TASK_ATTEMPTS_MAX_DEFAULT: u32 = 3;

/// Default number of background workers
pub const TASK_WORKERS_COUNT_DEFAULT: usize = 4;

// =============================================================================
// Provider Limits
// =============================================================================

/// Default retry attempts for provider calls
pub const PROVIDER_RETRY_ATTEMPTS_MAX: u32 = 3;

/// Initial provider retry delay in milliseconds
pub const PROVIDER_RETRY_DELAY_MS_INITIAL: u64 = 500;

/// Maximum provider retry delay in milliseconds (30 sec)
pub const PROVIDER_RETRY_DELAY_MS_MAX: u64 = 30 * 1000;

// Compile-time assertions for constant validity
const _: () = {
    assert!(MEMORY_TEXT_LENGTH_BYTES_MAX >= 1024);
    assert!(SEARCH_CANDIDATES_COUNT_MAX >= SEARCH_LIMIT_DEFAULT);
    assert!(DEDUP_NEIGHBORS_COUNT >= 1);
    assert!(EXTRACTION_BATCH_COUNT_MAX >= EMBED_BATCH_COUNT_MAX);
    assert!(PROVIDER_RETRY_DELAY_MS_MAX > PROVIDER_RETRY_DELAY_MS_INITIAL);
    assert!(TASK_QUEUE_DEPTH_MAX >= 1000);
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constants_are_reasonable() {
        assert!(DEDUP_DISTANCE_THRESHOLD_DEFAULT > 0.0);
        assert!(DEDUP_DISTANCE_THRESHOLD_DEFAULT < 1.0);
        assert!(SUMMARIZATION_THRESHOLD_DEFAULT > 0.0);
        assert!(SUMMARIZATION_THRESHOLD_DEFAULT < 1.0);
    }

    #[test]
    fn test_limits_have_units_in_names() {
        // This test documents the naming convention
        // All byte limits end in _BYTES_*
        // All time limits end in _MS_*
        // All count limits end in _COUNT_*
        let _: usize = MEMORY_TEXT_LENGTH_BYTES_MAX;
        let _: u64 = TASK_TIMEOUT_MS_DEFAULT;
        let _: usize = SEARCH_CANDIDATES_COUNT_MAX;
    }
}
