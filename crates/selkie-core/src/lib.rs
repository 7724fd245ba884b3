//! Selkie Core
//!
//! Core types, errors, configuration, and I/O abstraction for the Selkie
//! dual-tier agent memory service.
//!
//! # Overview
//!
//! Selkie stores conversational and factual memories produced by AI agents in
//! two tiers: a session-scoped, TTL-bounded **working memory** and a
//! persistent, semantically searchable **long-term memory**. A background
//! pipeline promotes content between the tiers and keeps derived state
//! (embeddings, topics, entities, dedup links) consistent with the
//! source-of-truth records.
//!
//! # TigerStyle
//!
//! This crate follows [TigerStyle](https://github.com/tigerbeetle/tigerbeetle/blob/main/docs/TIGER_STYLE.md)
//! engineering principles:
//! - Safety > Performance > Developer Experience
//! - Explicit limits with big-endian naming (e.g., `MEMORY_TEXT_LENGTH_BYTES_MAX`)
//! - Assertions on preconditions, debug assertions on postconditions
//! - No recursion (bounded iteration only)

pub mod config;
pub mod constants;
pub mod context;
pub mod error;
pub mod ids;
pub mod io;
pub mod keys;
pub mod message;
pub mod record;
pub mod strategy;
pub mod telemetry;

pub use config::{
    CompactionConfig, EmbeddingConfig, ExtractionConfig, ForgettingConfig, MemoryConfig,
    RerankWeights, StoreBackend, StoreConfig, SummarizationConfig, TaskRuntimeConfig,
    TopicModelSource,
};
pub use constants::*;
pub use context::RequestContext;
pub use error::{Error, Result};
pub use ids::{MemoryId, MemoryIdGenerator};
pub use io::{ManualClock, TimeProvider, WallClockTime};
pub use keys::{escape_segment, long_term_key, unescape_segment, working_memory_key, SessionKey};
pub use message::{MemoryMessage, MessageRole};
pub use record::{EnrichmentPatch, MemoryRecord, MemoryType};
pub use strategy::ExtractionStrategy;
pub use telemetry::{init_telemetry, TelemetryConfig, TelemetryGuard};
